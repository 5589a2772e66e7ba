use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::combat::state::StatusCondition;

use super::pokemon_type::PokemonType;

/// Move id used for Struggle, the fallback attack when every move is out of PP
pub const STRUGGLE_MOVE_ID: u32 = 165;

/// Static move definition as stored in `moves.json`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct MoveData {
    pub id: u32,
    pub name: String,
    pub accuracy: Option<u8>, // None for moves that never miss
    pub power: Option<u32>,   // None for status moves
    pub pp: u8,
    #[serde(default)]
    pub priority: i8,
    #[serde(rename = "type")]
    pub move_type: PokemonType,
    pub damage_class: MoveCategory,
    #[serde(default)]
    pub recoil_percent: Option<u8>,
    #[serde(default)]
    pub secondary_effect: Option<SecondaryEffectData>,
    #[serde(default)]
    pub description: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct SecondaryEffectData {
    pub chance: u8, // Percentage chance
    pub status: StatusCondition,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash, Copy)]
#[serde(rename_all = "snake_case")]
pub enum MoveCategory {
    Physical, Special, Status,
}

impl MoveData {
    /// Typeless (treated as Normal) physical move with 25% recoil
    pub fn struggle() -> Self {
        MoveData {
            id: STRUGGLE_MOVE_ID,
            name: "Struggle".to_string(),
            accuracy: None,
            power: Some(50),
            pp: 1,
            priority: 0,
            move_type: PokemonType::Normal,
            damage_class: MoveCategory::Physical,
            recoil_percent: Some(25),
            secondary_effect: None,
            description: "Used only if all PP are gone. Hurts the user.".to_string(),
        }
    }
}

pub type TypeChart = HashMap<PokemonType, HashMap<PokemonType, f32>>;

/// Moves and type chart shared by every battle
#[derive(Debug, Default)]
pub struct MoveRepository {
    pub moves: HashMap<u32, MoveData>,
    pub type_chart: TypeChart,
}

impl MoveRepository {
    /// Load moves and the type chart; a missing or broken file leaves that table empty
    pub fn new(moves_path: &str, type_chart_path: &str) -> Arc<Self> {
        let moves: HashMap<u32, MoveData> = load_json_table(moves_path);
        let type_chart: TypeChart = load_json_table(type_chart_path);
        info!(
            "Move repository ready: {} moves from {}, {} attacking types from {}",
            moves.len(),
            moves_path,
            type_chart.len(),
            type_chart_path
        );
        Arc::new(MoveRepository { moves, type_chart })
    }

    pub fn from_parts(moves: Vec<MoveData>, type_chart: TypeChart) -> Arc<Self> {
        let moves = moves.into_iter().map(|m| (m.id, m)).collect();
        Arc::new(MoveRepository { moves, type_chart })
    }

    pub fn get_move(&self, move_id: u32) -> Option<&MoveData> {
        self.moves.get(&move_id)
    }

    /// Multiplier of `attack_type` against all of `defender_types`; neutral for missing entries
    pub fn effectiveness(&self, attack_type: PokemonType, defender_types: &[PokemonType]) -> f32 {
        type_effectiveness(&self.type_chart, attack_type, defender_types)
    }
}

fn load_json_table<T: DeserializeOwned + Default>(path: &str) -> T {
    let file = match File::open(Path::new(path)) {
        Ok(file) => file,
        Err(e) => {
            warn!("Cannot open {}: {}", path, e);
            return T::default();
        }
    };
    serde_json::from_reader(BufReader::new(file)).unwrap_or_else(|e| {
        warn!("Cannot parse {}: {}", path, e);
        T::default()
    })
}

pub fn type_effectiveness(
    type_chart: &TypeChart,
    attack_type: PokemonType,
    defender_types: &[PokemonType],
) -> f32 {
    let Some(type_map) = type_chart.get(&attack_type) else {
        return 1.0;
    };

    defender_types
        .iter()
        .filter_map(|defender| type_map.get(defender))
        .product()
}
