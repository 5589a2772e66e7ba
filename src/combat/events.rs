use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::trace;
use uuid::Uuid;

use super::action::{ActionCategory, ActionType, BallType};
use super::state::{
    BattleKind, BattleOutcome, BattlePhase, CombatantView, ResolutionSubPhase, SideId, StatusCondition,
};

/// Discrete, ordered battle events for the presentation layer
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "event_type", content = "details", rename_all = "snake_case")]
pub enum BattleEvent {
    BattleStart {
        kind: BattleKind,
        player1: SideSummary,
        player2: SideSummary,
    },
    PhaseChanged {
        from: Option<BattlePhase>,
        to: BattlePhase,
    },
    SubPhaseChanged {
        from: ResolutionSubPhase,
        to: ResolutionSubPhase,
    },
    ActionQueued {
        side: SideId,
        action_type: ActionType,
        category: ActionCategory,
    },
    MoveUsed {
        side: SideId,
        combatant_name: String,
        move_id: u32,
        move_name: String,
        remaining_pp: u8,
    },
    MoveMissed {
        side: SideId,
        combatant_name: String,
        move_name: String,
    },
    DamageDealt {
        target_side: SideId,
        combatant_name: String,
        damage: u32,
        hp_before: u32,
        hp_after: u32,
        max_hp: u32,
        effectiveness: f32,
        critical: bool,
        is_recoil: bool,
    },
    StatusApplied {
        target_side: SideId,
        combatant_name: String,
        status: StatusCondition,
    },
    ActionSkipped {
        side: SideId,
        combatant_name: String,
        reason: String,
    },
    ActionFailed {
        side: SideId,
        action_type: ActionType,
        reason: String,
    },
    SwitchIn {
        side: SideId,
        from_index: usize,
        to_index: usize,
        is_forced: bool,
        combatant: CombatantView,
    },
    ItemUsed {
        side: SideId,
        item_id: String,
        item_name: String,
        combatant_name: String,
        hp_before: u32,
        hp_after: u32,
        cured_status: Option<StatusCondition>,
    },
    CaptureAttempt {
        side: SideId,
        ball_type: BallType,
        target_name: String,
        probability: f64,
        shakes: u8,
        success: bool,
    },
    RunAttempt {
        side: SideId,
        success: bool,
        message: String,
    },
    PokemonFainted {
        side: SideId,
        combatant_name: String,
    },
    KoMessage {
        side: SideId,
        message: String,
    },
    WinnerAnnounce {
        winner: SideId,
        display_name: String,
    },
    ForcedSwitchRequired {
        side: SideId,
        available: Vec<usize>,
    },
    ResolutionComplete {
        turn_number: u32,
    },
    BattleEnd {
        outcome: BattleOutcome,
        winner_identity: Option<String>,
    },
}

impl BattleEvent {
    pub fn name(&self) -> &'static str {
        match self {
            BattleEvent::BattleStart { .. } => "battle_start",
            BattleEvent::PhaseChanged { .. } => "phase_changed",
            BattleEvent::SubPhaseChanged { .. } => "sub_phase_changed",
            BattleEvent::ActionQueued { .. } => "action_queued",
            BattleEvent::MoveUsed { .. } => "move_used",
            BattleEvent::MoveMissed { .. } => "move_missed",
            BattleEvent::DamageDealt { .. } => "damage_dealt",
            BattleEvent::StatusApplied { .. } => "status_applied",
            BattleEvent::ActionSkipped { .. } => "action_skipped",
            BattleEvent::ActionFailed { .. } => "action_failed",
            BattleEvent::SwitchIn { .. } => "switch_in",
            BattleEvent::ItemUsed { .. } => "item_used",
            BattleEvent::CaptureAttempt { .. } => "capture_attempt",
            BattleEvent::RunAttempt { .. } => "run_attempt",
            BattleEvent::PokemonFainted { .. } => "pokemon_fainted",
            BattleEvent::KoMessage { .. } => "ko_message",
            BattleEvent::WinnerAnnounce { .. } => "winner_announce",
            BattleEvent::ForcedSwitchRequired { .. } => "forced_switch_required",
            BattleEvent::ResolutionComplete { .. } => "resolution_complete",
            BattleEvent::BattleEnd { .. } => "battle_end",
        }
    }
}

/// Public side info sent with battle_start
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SideSummary {
    pub identity: String,
    pub display_name: String,
    pub team_size: usize,
    pub active: CombatantView,
}

/// Event plus the context a renderer needs to place it on a timeline
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct BattleEventEnvelope {
    pub battle_id: Uuid,
    pub sequence: u64,
    pub timestamp_ms: i64,
    pub turn_number: u32,
    pub phase: BattlePhase,
    pub sub_phase: ResolutionSubPhase,
    pub event: BattleEvent,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SinkError {
    #[error("event channel closed")]
    Closed,
    #[error("event delivery failed: {0}")]
    Delivery(String),
}

/// Destination for battle events; must not block
pub trait EventSink: Send + Sync {
    fn deliver(&self, envelope: &BattleEventEnvelope) -> Result<(), SinkError>;
}

/// Fan-out to every WebSocket subscriber
#[derive(Debug, Clone)]
pub struct BroadcastEventSink {
    sender: broadcast::Sender<BattleEventEnvelope>,
}

impl BroadcastEventSink {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        BroadcastEventSink { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BattleEventEnvelope> {
        self.sender.subscribe()
    }
}

impl EventSink for BroadcastEventSink {
    fn deliver(&self, envelope: &BattleEventEnvelope) -> Result<(), SinkError> {
        if self.sender.send(envelope.clone()).is_err() {
            // Nobody is listening, which is fine
            trace!(
                battle_id = %envelope.battle_id,
                event = envelope.event.name(),
                "No subscribers for battle event"
            );
        }
        Ok(())
    }
}

/// Sink that drops everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn deliver(&self, _envelope: &BattleEventEnvelope) -> Result<(), SinkError> {
        Ok(())
    }
}
