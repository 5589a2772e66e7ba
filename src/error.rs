//! Errors returned across the public battle API.

use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::combat::action::ActionType;
use crate::combat::state::{BattlePhase, SideId};

/// Result type alias using [`BattleError`].
pub type Result<T> = std::result::Result<T, BattleError>;

/// Coarse classification used by callers (and the HTTP layer) to pick a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Invalid start parameters; no battle was created.
    Configuration,
    /// A single submission was rejected; the battle continues.
    Protocol,
    /// The referenced battle does not exist (or has already been released).
    NotFound,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum BattleError {
    #[error("invalid battle configuration: {0}")]
    InvalidConfig(String),

    #[error("battle {0} not found")]
    BattleNotFound(Uuid),

    #[error("battle has already ended")]
    BattleEnded,

    #[error("identity '{0}' is not a side in this battle")]
    UnknownSide(String),

    #[error("side {0} is controlled by the server")]
    ServerControlledSide(SideId),

    #[error("{action} is not allowed during {phase}")]
    WrongPhase { phase: BattlePhase, action: ActionType },

    #[error("waiting for {0} to replace its fainted combatant")]
    AwaitingForcedSwitch(SideId),

    #[error("{0} already submitted an action this turn")]
    DuplicateSubmission(SideId),

    #[error("{0}'s active combatant is incapacitated")]
    Incapacitated(SideId),

    #[error("illegal action: {0}")]
    IllegalAction(String),
}

impl BattleError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BattleError::InvalidConfig(_) => ErrorKind::Configuration,
            BattleError::BattleNotFound(_) => ErrorKind::NotFound,
            _ => ErrorKind::Protocol,
        }
    }
}
