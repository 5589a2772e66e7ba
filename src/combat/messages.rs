use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::error::ErrorKind;
use crate::monsters::PokemonType;

use super::action::ActionKind;
use super::engine::SubmitAck;
use super::events::BattleEventEnvelope;
use super::state::{BattleKind, CombatStats, Controller, StatusCondition};

/// Body of `POST /battles`
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct StartBattleRequest {
    pub kind: BattleKind,
    pub player1: SideRequest,
    pub player2: SideRequest,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub seed: Option<u64>, // Fixed RNG seed for replays
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SideRequest {
    pub identity: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub controller: Controller,
    pub team: Vec<CombatantRequest>,
    #[serde(default)]
    pub inventory: BTreeMap<String, u32>,
}

/// Combatant snapshot as sent by callers; moves are ids into the move repository
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CombatantRequest {
    #[serde(default)]
    pub instance_id: Option<String>,
    pub species_id: u32,
    pub name: String,
    pub level: u32,
    #[serde(default)]
    pub current_hp: Option<u32>, // Defaults to max HP
    pub stats: CombatStats,
    pub types: Vec<PokemonType>,
    pub moves: Vec<u32>,
    #[serde(default)]
    pub status: Option<StatusCondition>,
    #[serde(default)]
    pub is_shiny: bool,
    #[serde(default)]
    pub catch_rate: Option<u8>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct StartBattleResponse {
    pub battle_id: Uuid,
    pub initial_event: BattleEventEnvelope,
}

/// Body of `POST /battles/{battle_id}/actions`
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SubmitActionRequest {
    pub side_identity: String,
    pub action: ActionKind,
}

#[derive(Serialize, Debug, Clone)]
pub struct SubmitActionResponse {
    pub battle_id: Uuid,
    #[serde(flatten)]
    pub ack: SubmitAck,
}

#[derive(Serialize, Debug, Clone)]
pub struct ErrorResponse {
    pub kind: ErrorKind,
    pub message: String,
}
