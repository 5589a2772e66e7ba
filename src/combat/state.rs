use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use crate::monsters::{MoveData, PokemonType};

/// Maximum team size for a side
pub const MAX_TEAM_SIZE: usize = 6;
/// Maximum number of known moves per combatant
pub const MAX_KNOWN_MOVES: usize = 4;

/// Single source of truth for one battle
#[derive(Debug, Clone, Serialize)]
pub struct BattleGameState {
    pub battle_id: Uuid,
    pub kind: BattleKind,
    pub phase: BattlePhase, // Written only by the PhaseManager
    pub turn_number: u32,
    pub player1: Side,
    pub player2: Side,
    pub is_ended: bool,
    pub winner: Option<SideId>,
    pub end_reason: Option<EndReason>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum SideId {
    Player1,
    Player2,
}

impl SideId {
    pub const BOTH: [SideId; 2] = [SideId::Player1, SideId::Player2];

    /// Deterministic tiebreak rank, lower resolves first
    pub fn ordinal(self) -> u8 {
        match self {
            SideId::Player1 => 0,
            SideId::Player2 => 1,
        }
    }

    pub fn opponent(self) -> SideId {
        match self {
            SideId::Player1 => SideId::Player2,
            SideId::Player2 => SideId::Player1,
        }
    }
}

impl fmt::Display for SideId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SideId::Player1 => write!(f, "player1"),
            SideId::Player2 => write!(f, "player2"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BattleKind {
    Wild,
    Trainer,
    Pvp,
}

/// Who submits actions for a side
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum Controller {
    #[default]
    Human,
    Ai,
}

/// Current phase of the battle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BattlePhase {
    Intro,
    ActionSelection,
    ActionResolution,
    Capture,
    Ended,
}

impl fmt::Display for BattlePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BattlePhase::Intro => "INTRO",
            BattlePhase::ActionSelection => "ACTION_SELECTION",
            BattlePhase::ActionResolution => "ACTION_RESOLUTION",
            BattlePhase::Capture => "CAPTURE",
            BattlePhase::Ended => "ENDED",
        };
        f.write_str(name)
    }
}

/// Engine step within ACTION_RESOLUTION
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResolutionSubPhase {
    #[default]
    None,
    #[serde(rename = "ATTACKER_1")]
    Attacker1,
    #[serde(rename = "ATTACKER_2")]
    Attacker2,
    KoCheck,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash, Copy)]
#[serde(rename_all = "snake_case")]
pub enum StatusCondition {
    Burn, Freeze, Paralysis, Poison, Sleep, Toxic, // Toxic is distinct for damage calculation
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct StatSet<T> {
    pub hp: T,
    pub attack: T,
    pub defense: T,
    pub special_attack: T,
    pub special_defense: T,
    pub speed: T,
}

pub type CombatStats = StatSet<u32>;

/// A known move with PP tracking
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CombatantMove {
    #[serde(flatten)]
    pub data: MoveData,
    pub current_pp: u8,
}

impl CombatantMove {
    pub fn new(data: MoveData) -> Self {
        let current_pp = data.pp;
        CombatantMove { data, current_pp }
    }
}

/// A creature in battle with all its dynamic state
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Combatant {
    pub instance_id: String,
    pub species_id: u32,
    pub name: String, // Can be nickname
    pub level: u32,
    pub current_hp: u32,
    pub stats: CombatStats, // stats.hp is max HP
    pub types: Vec<PokemonType>,
    pub moves: Vec<CombatantMove>,
    #[serde(default)]
    pub status: Option<StatusCondition>,
    #[serde(default)]
    pub is_shiny: bool,
    #[serde(default = "default_catch_rate")]
    pub catch_rate: u8,
    #[serde(default)]
    pub is_fainted: bool, // Set once the knockout has been reported
}

fn default_catch_rate() -> u8 {
    45
}

impl Combatant {
    pub fn max_hp(&self) -> u32 {
        self.stats.hp
    }

    pub fn is_incapacitated(&self) -> bool {
        self.current_hp == 0
    }

    /// Speed used for turn ordering; paralysis halves it
    pub fn effective_speed(&self) -> u32 {
        match self.status {
            Some(StatusCondition::Paralysis) => self.stats.speed / 2,
            _ => self.stats.speed,
        }
    }

    pub fn hp_percent(&self) -> f32 {
        if self.max_hp() == 0 {
            return 0.0;
        }
        self.current_hp as f32 / self.max_hp() as f32
    }

    pub fn find_move(&self, move_id: u32) -> Option<&CombatantMove> {
        self.moves.iter().find(|m| m.data.id == move_id)
    }

    pub fn has_usable_move(&self) -> bool {
        self.moves.iter().any(|m| m.current_pp > 0)
    }

    pub fn public_view(&self) -> CombatantView {
        CombatantView {
            species_id: self.species_id,
            name: self.name.clone(),
            level: self.level,
            current_hp: self.current_hp,
            max_hp: self.max_hp(),
            current_hp_percent: self.hp_percent(),
            types: self.types.clone(),
            status: self.status,
            is_shiny: self.is_shiny,
            is_fainted: self.is_incapacitated(),
        }
    }
}

/// Public view of a combatant, safe to show to the opponent
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CombatantView {
    pub species_id: u32,
    pub name: String,
    pub level: u32,
    pub current_hp: u32,
    pub max_hp: u32, // Needed for HP bar rendering
    pub current_hp_percent: f32,
    pub types: Vec<PokemonType>,
    pub status: Option<StatusCondition>,
    pub is_shiny: bool,
    pub is_fainted: bool,
}

/// One of the two participants in a battle
#[derive(Debug, Clone, Serialize)]
pub struct Side {
    pub identity: String,
    pub display_name: String,
    pub controller: Controller,
    pub team: Vec<Combatant>,
    pub active_index: usize,
    pub inventory: BTreeMap<String, u32>, // Item ID -> count
    pub must_switch: bool, // Set when the active combatant fainted and a reserve can come in
    pub escape_attempts: u8,
}

impl Side {
    pub fn active(&self) -> &Combatant {
        &self.team[self.active_index]
    }

    pub fn active_mut(&mut self) -> &mut Combatant {
        &mut self.team[self.active_index]
    }

    pub fn is_ai(&self) -> bool {
        self.controller == Controller::Ai
    }

    /// Team indices of living combatants other than the active one
    pub fn healthy_reserves(&self) -> impl Iterator<Item = usize> + '_ {
        self.team
            .iter()
            .enumerate()
            .filter(move |(index, combatant)| *index != self.active_index && !combatant.is_incapacitated())
            .map(|(index, _)| index)
    }

    pub fn has_healthy_reserve(&self) -> bool {
        self.healthy_reserves().next().is_some()
    }

    pub fn is_defeated(&self) -> bool {
        self.team.iter().all(Combatant::is_incapacitated)
    }

    pub fn item_count(&self, item_id: &str) -> u32 {
        self.inventory.get(item_id).copied().unwrap_or(0)
    }

    /// Removes one item; false when none is left
    pub fn consume_item(&mut self, item_id: &str) -> bool {
        match self.inventory.get_mut(item_id) {
            Some(count) if *count > 0 => {
                *count -= 1;
                true
            }
            _ => false,
        }
    }
}

impl BattleGameState {
    pub fn side(&self, id: SideId) -> &Side {
        match id {
            SideId::Player1 => &self.player1,
            SideId::Player2 => &self.player2,
        }
    }

    pub fn side_mut(&mut self, id: SideId) -> &mut Side {
        match id {
            SideId::Player1 => &mut self.player1,
            SideId::Player2 => &mut self.player2,
        }
    }

    /// Map a submitting identity to its side
    pub fn side_id_for(&self, identity: &str) -> Option<SideId> {
        SideId::BOTH
            .into_iter()
            .find(|id| self.side(*id).identity == identity)
    }

    pub fn ai_sides(&self) -> Vec<SideId> {
        SideId::BOTH
            .into_iter()
            .filter(|id| self.side(*id).is_ai())
            .collect()
    }

    pub fn sides_needing_switch(&self) -> Vec<SideId> {
        SideId::BOTH
            .into_iter()
            .filter(|id| self.side(*id).must_switch)
            .collect()
    }
}

/// How the battle ended
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum EndReason {
    Knockout,
    DoubleKnockout,
    Captured { by: SideId },
    Fled { side: SideId },
    Forfeit { side: SideId },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct BattleOutcome {
    pub winner: Option<SideId>,
    pub reason: EndReason,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monsters::MoveCategory;

    fn tackle() -> CombatantMove {
        CombatantMove::new(MoveData {
            id: 33,
            name: "Tackle".to_string(),
            accuracy: Some(100),
            power: Some(40),
            pp: 35,
            priority: 0,
            move_type: PokemonType::Normal,
            damage_class: MoveCategory::Physical,
            recoil_percent: None,
            secondary_effect: None,
            description: String::new(),
        })
    }

    fn combatant(name: &str, hp: u32) -> Combatant {
        Combatant {
            instance_id: name.to_string(),
            species_id: 1,
            name: name.to_string(),
            level: 5,
            current_hp: hp,
            stats: StatSet { hp: 20, attack: 10, defense: 10, special_attack: 10, special_defense: 10, speed: 12 },
            types: vec![PokemonType::Normal],
            moves: vec![tackle()],
            status: None,
            is_shiny: false,
            catch_rate: 45,
            is_fainted: false,
        }
    }

    #[test]
    fn paralysis_halves_effective_speed() {
        let mut c = combatant("a", 20);
        assert_eq!(c.effective_speed(), 12);
        c.status = Some(StatusCondition::Paralysis);
        assert_eq!(c.effective_speed(), 6);
    }

    #[test]
    fn reserves_skip_active_and_fainted() {
        let side = Side {
            identity: "p".to_string(),
            display_name: "P".to_string(),
            controller: Controller::Human,
            team: vec![combatant("a", 20), combatant("b", 0), combatant("c", 3)],
            active_index: 0,
            inventory: BTreeMap::new(),
            must_switch: false,
            escape_attempts: 0,
        };
        assert_eq!(side.healthy_reserves().collect::<Vec<_>>(), vec![2]);
        assert!(!side.is_defeated());
    }

    #[test]
    fn consume_item_stops_at_zero() {
        let mut side = Side {
            identity: "p".to_string(),
            display_name: "P".to_string(),
            controller: Controller::Human,
            team: vec![combatant("a", 20)],
            active_index: 0,
            inventory: BTreeMap::from([("potion".to_string(), 1)]),
            must_switch: false,
            escape_attempts: 0,
        };
        assert!(side.consume_item("potion"));
        assert!(!side.consume_item("potion"));
        assert_eq!(side.item_count("potion"), 0);
    }

    #[test]
    fn sub_phase_serializes_with_attacker_numbers() {
        assert_eq!(serde_json::to_string(&ResolutionSubPhase::Attacker1).unwrap(), "\"ATTACKER_1\"");
        assert_eq!(serde_json::to_string(&ResolutionSubPhase::KoCheck).unwrap(), "\"KO_CHECK\"");
        assert_eq!(serde_json::to_string(&BattlePhase::ActionSelection).unwrap(), "\"ACTION_SELECTION\"");
    }
}
