//! Collaborators called by the engine: persistence and progression.
//!
//! Both are fire-and-forget. Implementations must return quickly; anything slow
//! belongs on a worker (see `redis_manager::RedisHooks`).

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use super::state::{BattleKind, BattleOutcome, Combatant};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HookError {
    #[error("collaborator unavailable: {0}")]
    Unavailable(String),
    #[error("collaborator queue is full")]
    Backpressure,
    #[error("failed to encode payload: {0}")]
    Encode(String),
}

/// Post-battle state handed to the persistence collaborator
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SaveRequest {
    pub battle_id: Uuid,
    pub kind: BattleKind,
    pub outcome: BattleOutcome,
    pub turns: u32,
    pub player1_identity: String,
    pub player1_team: Vec<Combatant>,
    pub player2_identity: String,
    pub player2_team: Vec<Combatant>,
    pub captured: Option<Combatant>,
}

/// "Combatant sighted" report sent when a wild encounter starts
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SightingReport {
    pub identity: String,
    pub species_id: u32,
    pub name: String,
    pub level: u32,
    pub is_shiny: bool,
    pub location: Option<String>,
}

pub trait PersistenceHook: Send + Sync {
    fn save_battle_result(&self, request: SaveRequest) -> Result<(), HookError>;
}

pub trait ProgressionHook: Send + Sync {
    fn combatant_sighted(&self, report: SightingReport) -> Result<(), HookError>;
}

/// Logs collaborator calls; used when no external store is configured
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingHooks;

impl PersistenceHook for TracingHooks {
    fn save_battle_result(&self, request: SaveRequest) -> Result<(), HookError> {
        info!(
            battle_id = %request.battle_id,
            winner = ?request.outcome.winner,
            reason = ?request.outcome.reason,
            captured = request.captured.is_some(),
            "Battle result ready for persistence"
        );
        Ok(())
    }
}

impl ProgressionHook for TracingHooks {
    fn combatant_sighted(&self, report: SightingReport) -> Result<(), HookError> {
        info!(
            identity = %report.identity,
            species_id = report.species_id,
            level = report.level,
            shiny = report.is_shiny,
            "Combatant sighted"
        );
        Ok(())
    }
}
