use crate::combat::action::BattleAction;
use crate::combat::engine::{BattleDiagnostics, BattleEngine, BattleModules, BattleSetup, Collaborators, SubmitAck};
use crate::combat::events::BattleEventEnvelope;
use crate::config::BattleTiming;
use crate::error::{BattleError, Result};

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

type BattleHandle = Arc<Mutex<BattleEngine>>;
type BattleRegistry = Arc<DashMap<Uuid, BattleHandle>>;

/// Manages active battle instances
pub struct BattleManager {
    // Maps battle ID to its engine; each battle is serialized by its own mutex
    battles: BattleRegistry,
    modules: BattleModules,
    collaborators: Collaborators,
    timing: BattleTiming,
}

impl BattleManager {
    pub fn new(modules: BattleModules, collaborators: Collaborators, timing: BattleTiming) -> Self {
        BattleManager {
            battles: Arc::new(DashMap::new()),
            modules,
            collaborators,
            timing,
        }
    }

    /// Start a battle and return its id with the initial `battle_start` event
    pub async fn start_battle(&self, setup: BattleSetup) -> Result<(Uuid, BattleEventEnvelope)> {
        let engine = BattleEngine::start(
            setup,
            self.modules.clone(),
            self.collaborators.clone(),
            self.timing.clone(),
        )?;
        let battle_id = engine.battle_id();
        let initial_event = engine
            .event_log()
            .first()
            .cloned()
            .ok_or_else(|| BattleError::InvalidConfig("battle produced no start event".to_string()))?;

        let handle = Arc::new(Mutex::new(engine));
        self.battles.insert(battle_id, handle.clone());

        let mut engine = handle.lock().await;
        schedule_timers(&self.battles, &handle, &mut engine);
        info!("Battle {} registered ({} active)", battle_id, self.battles.len());

        Ok((battle_id, initial_event))
    }

    pub async fn submit_action(&self, battle_id: Uuid, action: BattleAction) -> Result<SubmitAck> {
        let handle = self.get_battle(battle_id)?;
        let mut engine = handle.lock().await;
        let ack = engine.submit_action(action);
        schedule_timers(&self.battles, &handle, &mut engine);
        ack
    }

    pub async fn diagnostics(&self, battle_id: Uuid) -> Result<BattleDiagnostics> {
        let handle = self.get_battle(battle_id)?;
        let engine = handle.lock().await;
        Ok(engine.diagnostics())
    }

    /// Everything the battle has emitted so far, for late subscribers
    pub async fn event_log(&self, battle_id: Uuid) -> Result<Vec<BattleEventEnvelope>> {
        let handle = self.get_battle(battle_id)?;
        let engine = handle.lock().await;
        Ok(engine.event_log().to_vec())
    }

    pub fn active_battles(&self) -> Vec<Uuid> {
        self.battles.iter().map(|entry| *entry.key()).collect()
    }

    pub fn is_active(&self, battle_id: Uuid) -> bool {
        self.battles.contains_key(&battle_id)
    }

    /// Cancel every timer and drop all battles
    pub async fn shutdown(&self) {
        let handles: Vec<BattleHandle> = self.battles.iter().map(|entry| entry.value().clone()).collect();
        for handle in handles {
            handle.lock().await.cancel_timers();
        }
        let count = self.battles.len();
        self.battles.clear();
        info!("Battle manager shut down, released {} battles", count);
    }

    fn get_battle(&self, battle_id: Uuid) -> Result<BattleHandle> {
        self.battles
            .get(&battle_id)
            .map(|entry| entry.value().clone())
            .ok_or(BattleError::BattleNotFound(battle_id))
    }
}

/// Realize newly armed engine timers as tokio tasks, or release a finished battle
fn schedule_timers(registry: &BattleRegistry, handle: &BattleHandle, engine: &mut BattleEngine) {
    let battle_id = engine.battle_id();
    if engine.is_torn_down() {
        if registry.remove(&battle_id).is_some() {
            debug!("Battle {} released", battle_id);
        }
        return;
    }

    for (timer_id, delay) in engine.timers_mut().take_unscheduled() {
        let registry = registry.clone();
        let handle_for_task = handle.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let mut engine = handle_for_task.lock().await;
            engine.on_timer(timer_id);
            schedule_timers(&registry, &handle_for_task, &mut engine);
        });
        engine.timers_mut().attach(timer_id, task.abort_handle());
    }
}
