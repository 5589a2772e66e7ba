pub mod action;
pub mod action_queue;
pub mod ai;
pub mod capture;
pub mod effects;
pub mod engine;
pub mod events;
pub mod hooks;
pub mod items;
pub mod ko;
pub mod manager;
pub mod messages;
pub mod phase;
pub mod state;
pub mod timers;
pub mod turn_order;
pub mod utils;

// Re-export key types
pub use action::{ActionKind, ActionType, BallType, BattleAction, QueuedAction};
pub use engine::{BattleEngine, BattleModules, BattleSetup, Collaborators, SideSetup, SubmitAck};
pub use events::{BattleEvent, BattleEventEnvelope, BroadcastEventSink, EventSink};
pub use hooks::{PersistenceHook, ProgressionHook, TracingHooks};
pub use manager::BattleManager;
pub use state::{
    BattleGameState, BattleKind, BattleOutcome, BattlePhase, Combatant, CombatantMove, Controller,
    EndReason, ResolutionSubPhase, SideId, StatusCondition,
};
