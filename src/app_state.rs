use crate::combat::events::BroadcastEventSink;
use crate::combat::manager::BattleManager;
use crate::config::Config;
use crate::monsters::MoveRepository;
use std::sync::Arc;

// Shared application state
pub struct AppState {
    pub config: Config,
    pub battle_manager: Arc<BattleManager>,
    pub move_repository: Arc<MoveRepository>,
    pub events: BroadcastEventSink, // Same sink the engines publish to
}

impl AppState {
    pub fn new(
        config: Config,
        battle_manager: Arc<BattleManager>,
        move_repository: Arc<MoveRepository>,
        events: BroadcastEventSink,
    ) -> Arc<Self> {
        Arc::new(AppState {
            config,
            battle_manager,
            move_repository,
            events,
        })
    }
}
