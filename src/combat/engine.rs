//! One battle's lifecycle.
//!
//! The engine is a synchronous state machine. It never sleeps: every delay is an
//! entry in its [`TimerSet`], and whoever drives the engine reports fired timers
//! back through [`BattleEngine::on_timer`]. All mutation of [`BattleGameState`]
//! happens here.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::BattleTiming;
use crate::error::{BattleError, Result};
use crate::monsters::move_manager::STRUGGLE_MOVE_ID;
use crate::monsters::{MoveCategory, MoveData, MoveRepository};

use super::action::{ActionKind, ActionType, BallType, BattleAction, QueuedAction};
use super::action_queue::{ActionQueue, QueueEntryView};
use super::ai::{OpponentAi, PublicBattleView, StandardAi};
use super::capture::{CaptureManager, StandardCaptureManager};
use super::effects::{MoveContext, MoveEffectResolver, StandardMoveResolver};
use super::events::{BattleEvent, BattleEventEnvelope, EventSink, NullEventSink, SideSummary};
use super::hooks::{PersistenceHook, ProgressionHook, SaveRequest, SightingReport, TracingHooks};
use super::items::{apply_item, item_effect, item_name};
use super::ko::{KnockoutManager, KoStep, KoStepKind, StandardKnockoutManager};
use super::phase::{PhaseHook, PhaseManager, PhaseTransition, PhaseTrigger, SelectionMode};
use super::state::{
    BattleGameState, BattleKind, BattleOutcome, BattlePhase, Combatant, Controller, EndReason,
    ResolutionSubPhase, Side, SideId, MAX_KNOWN_MOVES, MAX_TEAM_SIZE,
};
use super::timers::{ArmedTimerView, TimerId, TimerKind, TimerSet};
use super::turn_order::{SpeedPriorityCalculator, TurnOrderCalculator};

/// Everything needed to start a battle
#[derive(Debug, Clone)]
pub struct BattleSetup {
    pub battle_id: Option<Uuid>, // Generated when absent
    pub kind: BattleKind,
    pub player1: SideSetup,
    pub player2: SideSetup,
    pub location: Option<String>,
    pub rng_seed: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct SideSetup {
    pub identity: String,
    pub display_name: String,
    pub controller: Controller,
    pub team: Vec<Combatant>,
    pub inventory: BTreeMap<String, u32>,
}

/// Pluggable battle rules, chosen when the battle is built
#[derive(Clone)]
pub struct BattleModules {
    pub turn_order: Arc<dyn TurnOrderCalculator>,
    pub knockout: Arc<dyn KnockoutManager>,
    pub capture: Arc<dyn CaptureManager>,
    pub ai: Arc<dyn OpponentAi>,
    pub resolver: Arc<dyn MoveEffectResolver>,
}

impl BattleModules {
    pub fn standard(timing: &BattleTiming, repository: Option<Arc<MoveRepository>>) -> Self {
        BattleModules {
            turn_order: Arc::new(SpeedPriorityCalculator),
            knockout: Arc::new(StandardKnockoutManager::new(timing.ko)),
            capture: Arc::new(StandardCaptureManager),
            ai: Arc::new(StandardAi::new(timing.wild_flee_chance)),
            resolver: Arc::new(StandardMoveResolver::new(repository)),
        }
    }
}

/// External services the engine reports to
#[derive(Clone)]
pub struct Collaborators {
    pub events: Arc<dyn EventSink>,
    pub persistence: Arc<dyn PersistenceHook>,
    pub progression: Arc<dyn ProgressionHook>,
}

impl Default for Collaborators {
    fn default() -> Self {
        Collaborators {
            events: Arc::new(NullEventSink),
            persistence: Arc::new(TracingHooks),
            progression: Arc::new(TracingHooks),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SubmitAck {
    Queued,
    Resolving,
    CaptureResolved { success: bool },
    ForcedSwitchApplied,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CaptureRecord {
    pub turn_number: u32,
    pub side: SideId,
    pub ball_type: BallType,
    pub probability: f64,
    pub shakes: u8,
    pub success: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModuleNames {
    pub turn_order: &'static str,
    pub knockout: &'static str,
    pub capture: &'static str,
    pub ai: &'static str,
    pub resolver: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct FeatureFlags {
    pub selection_timeout: bool,
    pub wild_flee: bool,
    pub ai_sides: Vec<SideId>,
}

/// Read-only snapshot for operators
#[derive(Debug, Clone, Serialize)]
pub struct BattleDiagnostics {
    pub battle_id: Uuid,
    pub kind: BattleKind,
    pub phase: BattlePhase,
    pub sub_phase: ResolutionSubPhase,
    pub selection_mode: SelectionMode,
    pub turn_number: u32,
    pub is_ended: bool,
    pub winner: Option<SideId>,
    pub end_reason: Option<EndReason>,
    pub queue: Vec<QueueEntryView>,
    pub armed_timers: Vec<ArmedTimerView>,
    pub pending_forced_switches: Vec<SideId>,
    pub transition_count: usize,
    pub last_transition: Option<PhaseTransition>,
    pub capture_attempts: Vec<CaptureRecord>,
    pub events_emitted: usize,
    pub modules: ModuleNames,
    pub features: FeatureFlags,
}

pub struct BattleEngine {
    state: BattleGameState,
    sub_phase: ResolutionSubPhase,
    phases: PhaseManager,
    queue: ActionQueue,
    timers: TimerSet,
    modules: BattleModules,
    collaborators: Collaborators,
    timing: BattleTiming,
    rng: SmallRng,
    next_sequence: u64,
    event_log: Vec<BattleEventEnvelope>,
    resolution_order: VecDeque<QueuedAction>,
    attackers_started: u8,
    ko_steps: VecDeque<KoStep>,
    pending_outcome: Option<BattleOutcome>,
    capture_attempts: Vec<CaptureRecord>,
    captured: Option<Combatant>,
    torn_down: bool,
}

impl BattleEngine {
    /// Validate the setup and open the battle in INTRO
    pub fn start(
        setup: BattleSetup,
        modules: BattleModules,
        collaborators: Collaborators,
        timing: BattleTiming,
    ) -> Result<Self> {
        validate_setup(&setup)?;

        let BattleSetup { battle_id, kind, player1, player2, location, rng_seed } = setup;
        let battle_id = battle_id.unwrap_or_else(Uuid::new_v4);
        let rng = match rng_seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_entropy(),
        };

        let state = BattleGameState {
            battle_id,
            kind,
            phase: BattlePhase::Intro,
            turn_number: 1,
            player1: build_side(player1),
            player2: build_side(player2),
            is_ended: false,
            winner: None,
            end_reason: None,
        };

        let mut engine = BattleEngine {
            state,
            sub_phase: ResolutionSubPhase::None,
            phases: PhaseManager::new(),
            queue: ActionQueue::new(),
            timers: TimerSet::new(),
            modules,
            collaborators,
            timing,
            rng,
            next_sequence: 0,
            event_log: Vec::new(),
            resolution_order: VecDeque::new(),
            attackers_started: 0,
            ko_steps: VecDeque::new(),
            pending_outcome: None,
            capture_attempts: Vec::new(),
            captured: None,
            torn_down: false,
        };

        info!(
            "Battle {} started: {:?} {} vs {}",
            battle_id, kind, engine.state.player1.identity, engine.state.player2.identity
        );

        let start_event = BattleEvent::BattleStart {
            kind,
            player1: side_summary(&engine.state.player1),
            player2: side_summary(&engine.state.player2),
        };
        engine.emit(start_event);

        let initial = engine.phases.enter_initial(&mut engine.state);
        engine.emit(BattleEvent::PhaseChanged { from: initial.from, to: initial.to });
        engine.run_entry_hooks(BattlePhase::Intro);

        if kind == BattleKind::Wild {
            engine.report_sighting(location);
        }

        Ok(engine)
    }

    pub fn battle_id(&self) -> Uuid {
        self.state.battle_id
    }

    pub fn state(&self) -> &BattleGameState {
        &self.state
    }

    pub fn phase(&self) -> BattlePhase {
        self.state.phase
    }

    pub fn sub_phase(&self) -> ResolutionSubPhase {
        self.sub_phase
    }

    pub fn is_ended(&self) -> bool {
        self.state.is_ended
    }

    /// True once the ENDED hooks have run and the battle can be released
    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    pub fn event_log(&self) -> &[BattleEventEnvelope] {
        &self.event_log
    }

    pub fn timers_mut(&mut self) -> &mut TimerSet {
        &mut self.timers
    }

    pub fn next_due_timer(&self) -> Option<(TimerId, TimerKind)> {
        self.timers.next_due()
    }

    /// Cancel every outstanding timer without ending the battle
    pub fn cancel_timers(&mut self) {
        self.timers.cancel_all();
    }

    /// Entry point for human submissions
    pub fn submit_action(&mut self, action: BattleAction) -> Result<SubmitAck> {
        if self.state.is_ended {
            return Err(BattleError::BattleEnded);
        }
        let side = self
            .state
            .side_id_for(&action.side_identity)
            .ok_or_else(|| BattleError::UnknownSide(action.side_identity.clone()))?;
        if self.state.side(side).is_ai() {
            return Err(BattleError::ServerControlledSide(side));
        }

        let result = self.accept_action(side, action);
        if let Err(e) = &result {
            debug!("Battle {} rejected submission from {}: {}", self.state.battle_id, side, e);
        }
        result
    }

    /// Deliver a fired timer; stale ids are ignored
    pub fn on_timer(&mut self, id: TimerId) -> bool {
        let Some(kind) = self.timers.fire(id) else {
            debug!("Battle {} ignoring stale timer {}", self.state.battle_id, id);
            return false;
        };

        match kind {
            TimerKind::IntroElapsed => {
                self.transition(BattlePhase::ActionSelection, PhaseTrigger::IntroElapsed);
            }
            TimerKind::AiThink(side) => self.run_ai(side),
            TimerKind::SelectionTimeout => self.on_selection_timeout(),
            TimerKind::NextAttacker => self.advance_attacker(),
            TimerKind::KoCheck => self.run_ko_check(),
            TimerKind::KoStep => self.emit_next_ko_step(),
        }
        true
    }

    pub fn diagnostics(&self) -> BattleDiagnostics {
        BattleDiagnostics {
            battle_id: self.state.battle_id,
            kind: self.state.kind,
            phase: self.state.phase,
            sub_phase: self.sub_phase,
            selection_mode: PhaseManager::selection_mode(&self.state),
            turn_number: self.state.turn_number,
            is_ended: self.state.is_ended,
            winner: self.state.winner,
            end_reason: self.state.end_reason,
            queue: self.queue.breakdown(),
            armed_timers: self.timers.pending(),
            pending_forced_switches: self.state.sides_needing_switch(),
            transition_count: self.phases.history().len(),
            last_transition: self.phases.history().last().cloned(),
            capture_attempts: self.capture_attempts.clone(),
            events_emitted: self.event_log.len(),
            modules: ModuleNames {
                turn_order: self.modules.turn_order.name(),
                knockout: self.modules.knockout.name(),
                capture: self.modules.capture.name(),
                ai: self.modules.ai.name(),
                resolver: self.modules.resolver.name(),
            },
            features: FeatureFlags {
                selection_timeout: self.timing.selection_timeout.is_some(),
                wild_flee: self.timing.wild_flee_chance > 0.0,
                ai_sides: self.state.ai_sides(),
            },
        }
    }

    // Submission

    fn accept_action(&mut self, side: SideId, action: BattleAction) -> Result<SubmitAck> {
        PhaseManager::validate_action(&self.state, side, &action.kind)?;
        self.check_legality(side, &action.kind)?;

        match action.kind {
            ActionKind::Capture { ball_type } => {
                if self.queue.has_action(side) {
                    return Err(BattleError::DuplicateSubmission(side));
                }
                let success = self.resolve_capture(side, ball_type);
                return Ok(SubmitAck::CaptureResolved { success });
            }
            ActionKind::Switch { from_index, to_index, .. }
                if PhaseManager::selection_mode(&self.state) == SelectionMode::ForcedSwitch =>
            {
                self.apply_forced_switch(side, from_index, to_index);
                return Ok(SubmitAck::ForcedSwitchApplied);
            }
            _ => {}
        }

        let active = self.state.side(side).active();
        let priority = match &action.kind {
            ActionKind::Attack { move_id } => active.find_move(*move_id).map(|m| m.data.priority).unwrap_or(0),
            _ => 0,
        };
        let incapacitated = active.is_incapacitated();
        let action_type = action.kind.action_type();
        let queued = QueuedAction::new(side, action, priority, active.effective_speed());
        let category = queued.category;

        self.queue.add_action(queued, incapacitated)?;
        self.emit(BattleEvent::ActionQueued { side, action_type, category });

        // Checked under the same borrow that enqueued, so no third action can slip in
        if self.queue.are_all_actions_ready() {
            self.transition(BattlePhase::ActionResolution, PhaseTrigger::ActionsReady);
            return Ok(SubmitAck::Resolving);
        }
        Ok(SubmitAck::Queued)
    }

    fn check_legality(&self, side_id: SideId, kind: &ActionKind) -> Result<()> {
        let side = self.state.side(side_id);
        let active = side.active();
        match kind {
            ActionKind::Attack { move_id } if *move_id == STRUGGLE_MOVE_ID => {
                if active.has_usable_move() {
                    return Err(illegal("Struggle is only usable when every move is out of PP"));
                }
            }
            ActionKind::Attack { move_id } => match active.find_move(*move_id) {
                None => return Err(illegal(format!("{} does not know move {}", active.name, move_id))),
                Some(m) if m.current_pp == 0 => {
                    return Err(illegal(format!("{} has no PP left", m.data.name)));
                }
                Some(_) => {}
            },
            ActionKind::Switch { from_index, to_index, .. } => {
                if *from_index != side.active_index {
                    return Err(illegal(format!("combatant {} is not active", from_index)));
                }
                match side.team.get(*to_index) {
                    None => return Err(illegal(format!("no combatant at team index {}", to_index))),
                    Some(_) if to_index == from_index => {
                        return Err(illegal("combatant is already active"));
                    }
                    Some(target) if target.is_incapacitated() => {
                        return Err(illegal(format!("{} is unable to battle", target.name)));
                    }
                    Some(_) => {}
                }
            }
            ActionKind::Item { item_id } => {
                if item_effect(item_id).is_none() {
                    return Err(illegal(format!("{} cannot be used in battle", item_id)));
                }
                if side.item_count(item_id) == 0 {
                    return Err(illegal(format!("no {} left in inventory", item_id)));
                }
            }
            ActionKind::Capture { ball_type } => {
                if self.state.kind != BattleKind::Wild {
                    return Err(illegal("capture is only possible in wild battles"));
                }
                if side.item_count(ball_type.item_id()) == 0 {
                    return Err(illegal(format!("no {} left in inventory", ball_type.item_id())));
                }
            }
            ActionKind::Run => {
                if self.state.kind == BattleKind::Trainer {
                    return Err(illegal("there is no running from a trainer battle"));
                }
            }
        }
        Ok(())
    }

    fn apply_forced_switch(&mut self, side: SideId, from_index: usize, to_index: usize) {
        let battle_side = self.state.side_mut(side);
        battle_side.active_index = to_index;
        battle_side.must_switch = false;
        let combatant = battle_side.active().public_view();
        self.emit(BattleEvent::SwitchIn { side, from_index, to_index, is_forced: true, combatant });

        if self.state.sides_needing_switch().is_empty() {
            // Normal selection restarts with fresh AI and timeout timers
            self.timers.cancel_all();
            self.run_entry_hooks(BattlePhase::ActionSelection);
        }
    }

    fn resolve_capture(&mut self, side: SideId, ball_type: BallType) -> bool {
        // A capture spends the whole turn; anything already queued is reported as skipped
        let waiting_sides: Vec<SideId> = SideId::BOTH.into_iter().filter(|s| self.queue.has_action(*s)).collect();
        for waiting in waiting_sides {
            let combatant_name = self.state.side(waiting).active().name.clone();
            self.emit(BattleEvent::ActionSkipped {
                side: waiting,
                combatant_name,
                reason: "turn spent on a capture attempt".to_string(),
            });
        }
        self.queue.clear();

        self.transition(BattlePhase::Capture, PhaseTrigger::CaptureThrown);
        self.state.side_mut(side).consume_item(ball_type.item_id());

        let target = self.state.side(side.opponent()).active().clone();
        let outcome = self.modules.capture.attempt(&target, ball_type, &mut self.rng);
        self.capture_attempts.push(CaptureRecord {
            turn_number: self.state.turn_number,
            side,
            ball_type,
            probability: outcome.probability,
            shakes: outcome.shakes,
            success: outcome.success,
        });
        self.emit(BattleEvent::CaptureAttempt {
            side,
            ball_type,
            target_name: target.name.clone(),
            probability: outcome.probability,
            shakes: outcome.shakes,
            success: outcome.success,
        });

        if outcome.success {
            info!("Battle {}: {} captured {}", self.state.battle_id, side, target.name);
            self.captured = Some(target);
            self.finish_battle(
                BattleOutcome { winner: Some(side), reason: EndReason::Captured { by: side } },
                PhaseTrigger::CaptureSucceeded,
            );
        } else {
            self.state.turn_number += 1;
            self.emit(BattleEvent::ResolutionComplete { turn_number: self.state.turn_number });
            self.transition(BattlePhase::ActionSelection, PhaseTrigger::CaptureFailed);
        }
        outcome.success
    }

    // AI and timeouts

    fn schedule_ai(&mut self) {
        let forced = PhaseManager::selection_mode(&self.state) == SelectionMode::ForcedSwitch;
        let delay = match self.state.kind {
            BattleKind::Wild => self.timing.wild_ai_delay,
            BattleKind::Trainer | BattleKind::Pvp => self.timing.trainer_ai_delay,
        };
        for side in self.state.ai_sides() {
            let needs_action = if forced {
                self.state.side(side).must_switch
            } else {
                !self.queue.has_action(side)
            };
            if needs_action {
                self.timers.arm(TimerKind::AiThink(side), delay);
            }
        }
    }

    fn run_ai(&mut self, side: SideId) {
        let view = PublicBattleView::for_side(&self.state, side);
        let kind = self.modules.ai.generate_action(&view, &mut self.rng);
        self.submit_generated(side, kind);
    }

    /// Queue a server-generated action, falling back to a safe choice if it is illegal
    fn submit_generated(&mut self, side: SideId, kind: ActionKind) {
        let identity = self.state.side(side).identity.clone();
        let Err(e) = self.accept_action(side, BattleAction::new(identity.clone(), kind)) else {
            return;
        };
        warn!("Battle {}: generated action for {} rejected: {}", self.state.battle_id, side, e);

        let fallback = fallback_action(&PublicBattleView::for_side(&self.state, side));
        if let Err(e) = self.accept_action(side, BattleAction::new(identity, fallback)) {
            error!("Battle {}: fallback action for {} rejected: {}", self.state.battle_id, side, e);
        }
    }

    fn on_selection_timeout(&mut self) {
        let waiting: Vec<SideId> = match PhaseManager::selection_mode(&self.state) {
            SelectionMode::ForcedSwitch => self.state.sides_needing_switch(),
            SelectionMode::Normal => SideId::BOTH
                .into_iter()
                .filter(|side| !self.queue.has_action(*side))
                .collect(),
        };
        info!("Battle {} selection timed out, acting for {:?}", self.state.battle_id, waiting);

        for side in waiting {
            if self.state.phase != BattlePhase::ActionSelection {
                break;
            }
            let view = PublicBattleView::for_side(&self.state, side);
            let kind = self.modules.ai.generate_action(&view, &mut self.rng);
            self.submit_generated(side, kind);
        }
    }

    // Resolution

    fn begin_resolution(&mut self) {
        let queued = self.queue.drain();
        self.resolution_order = self.modules.turn_order.order(&queued).into();
        self.attackers_started = 0;
        self.pending_outcome = None;
        self.advance_attacker();
    }

    fn advance_attacker(&mut self) {
        let Some(next) = self.resolution_order.pop_front() else {
            self.run_ko_check();
            return;
        };

        self.attackers_started += 1;
        let sub_phase = if self.attackers_started == 1 {
            ResolutionSubPhase::Attacker1
        } else {
            ResolutionSubPhase::Attacker2
        };
        self.set_sub_phase(sub_phase);
        self.execute_action(next);

        let follow_up = if self.resolution_order.is_empty() {
            TimerKind::KoCheck
        } else {
            TimerKind::NextAttacker
        };
        self.timers.arm(follow_up, self.timing.attacker_delay);
    }

    fn execute_action(&mut self, queued: QueuedAction) {
        let side = queued.side;
        let actor = self.state.side(side).active();

        if actor.is_incapacitated() {
            let combatant_name = actor.name.clone();
            self.emit(BattleEvent::ActionSkipped { side, combatant_name, reason: "fainted".to_string() });
            return;
        }
        if self.pending_outcome.is_some() {
            let combatant_name = actor.name.clone();
            self.emit(BattleEvent::ActionSkipped {
                side,
                combatant_name,
                reason: "battle already decided".to_string(),
            });
            return;
        }

        match queued.action.kind {
            ActionKind::Attack { move_id } => self.execute_attack(side, move_id),
            ActionKind::Switch { from_index, to_index, is_forced } => {
                self.execute_switch(side, from_index, to_index, is_forced)
            }
            ActionKind::Item { item_id } => self.execute_item(side, &item_id),
            ActionKind::Run => self.execute_run(side),
            ActionKind::Capture { .. } => self.emit(BattleEvent::ActionFailed {
                side,
                action_type: ActionType::Capture,
                reason: "capture does not go through the queue".to_string(),
            }),
        }
    }

    fn execute_attack(&mut self, side: SideId, move_id: u32) {
        let target_side = side.opponent();

        let attacker = self.state.side_mut(side).active_mut();
        let attacker_name = attacker.name.clone();
        let usable = if move_id == STRUGGLE_MOVE_ID {
            Some((MoveData::struggle(), 0))
        } else {
            attacker
                .moves
                .iter_mut()
                .find(|m| m.data.id == move_id && m.current_pp > 0)
                .map(|known| {
                    known.current_pp -= 1;
                    (known.data.clone(), known.current_pp)
                })
        };
        let Some((move_data, remaining_pp)) = usable else {
            self.emit(BattleEvent::ActionFailed {
                side,
                action_type: ActionType::Attack,
                reason: format!("move {} is no longer usable", move_id),
            });
            return;
        };

        self.emit(BattleEvent::MoveUsed {
            side,
            combatant_name: attacker_name.clone(),
            move_id,
            move_name: move_data.name.clone(),
            remaining_pp,
        });

        let result = {
            let ctx = MoveContext {
                attacker: self.state.side(side).active(),
                defender: self.state.side(target_side).active(),
                move_data: &move_data,
            };
            self.modules.resolver.resolve(&ctx, &mut self.rng)
        };

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Battle {}: {} failed to resolve {}: {}", self.state.battle_id, side, move_data.name, e);
                self.emit(BattleEvent::ActionFailed { side, action_type: ActionType::Attack, reason: e.to_string() });
                return;
            }
        };

        if !outcome.hit {
            self.emit(BattleEvent::MoveMissed { side, combatant_name: attacker_name, move_name: move_data.name });
            return;
        }

        if move_data.damage_class != MoveCategory::Status {
            self.apply_damage(target_side, outcome.damage, outcome.effectiveness, outcome.critical, false);
        }

        if let Some(status) = outcome.inflicted_status {
            let target = self.state.side_mut(target_side).active_mut();
            if !target.is_incapacitated() && target.status.is_none() {
                target.status = Some(status);
                let combatant_name = target.name.clone();
                self.emit(BattleEvent::StatusApplied { target_side, combatant_name, status });
            }
        }

        if outcome.recoil > 0 {
            self.apply_damage(side, outcome.recoil, 1.0, false, true);
        }
    }

    fn apply_damage(&mut self, target_side: SideId, damage: u32, effectiveness: f32, critical: bool, is_recoil: bool) {
        let target = self.state.side_mut(target_side).active_mut();
        let hp_before = target.current_hp;
        target.current_hp = hp_before.saturating_sub(damage);
        let event = BattleEvent::DamageDealt {
            target_side,
            combatant_name: target.name.clone(),
            damage: hp_before - target.current_hp,
            hp_before,
            hp_after: target.current_hp,
            max_hp: target.max_hp(),
            effectiveness,
            critical,
            is_recoil,
        };
        self.emit(event);
    }

    fn execute_switch(&mut self, side: SideId, from_index: usize, to_index: usize, is_forced: bool) {
        let battle_side = self.state.side_mut(side);
        let target_ok = battle_side
            .team
            .get(to_index)
            .map(|c| !c.is_incapacitated())
            .unwrap_or(false);
        if !target_ok || battle_side.active_index != from_index {
            self.emit(BattleEvent::ActionFailed {
                side,
                action_type: ActionType::Switch,
                reason: format!("cannot switch to team index {}", to_index),
            });
            return;
        }

        battle_side.active_index = to_index;
        let combatant = battle_side.active().public_view();
        self.emit(BattleEvent::SwitchIn { side, from_index, to_index, is_forced, combatant });
    }

    fn execute_item(&mut self, side: SideId, item_id: &str) {
        let Some(effect) = item_effect(item_id) else {
            self.emit(BattleEvent::ActionFailed {
                side,
                action_type: ActionType::Item,
                reason: format!("{} cannot be used in battle", item_id),
            });
            return;
        };

        let battle_side = self.state.side_mut(side);
        if !battle_side.consume_item(item_id) {
            self.emit(BattleEvent::ActionFailed {
                side,
                action_type: ActionType::Item,
                reason: format!("no {} left in inventory", item_id),
            });
            return;
        }

        let target = battle_side.active_mut();
        let hp_before = target.current_hp;
        let cured_status = apply_item(effect, target);
        let event = BattleEvent::ItemUsed {
            side,
            item_id: item_id.to_string(),
            item_name: item_name(item_id),
            combatant_name: target.name.clone(),
            hp_before,
            hp_after: target.current_hp,
            cured_status,
        };
        self.emit(event);
    }

    fn execute_run(&mut self, side: SideId) {
        let runner = self.state.side(side);
        let opponent = self.state.side(side.opponent());
        let runner_name = runner.active().name.clone();
        let opponent_name = opponent.active().name.clone();

        let (success, message, outcome) = match (self.state.kind, runner.controller) {
            (BattleKind::Wild, Controller::Ai) => (
                true,
                format!("The wild {} fled!", runner_name),
                BattleOutcome { winner: None, reason: EndReason::Fled { side } },
            ),
            (BattleKind::Wild, Controller::Human) => {
                let attempts = runner.escape_attempts.saturating_add(1);
                let odds = escape_odds(runner.active().effective_speed(), opponent.active().effective_speed(), attempts);
                self.state.side_mut(side).escape_attempts = attempts;
                let success = self.rng.gen_range(0..256u32) < odds;
                let message = if success {
                    format!("Got away safely from the wild {}!", opponent_name)
                } else {
                    "Can't escape!".to_string()
                };
                (success, message, BattleOutcome { winner: None, reason: EndReason::Fled { side } })
            }
            (BattleKind::Pvp, _) => (
                true,
                format!("{} forfeited the battle!", runner.display_name),
                BattleOutcome { winner: Some(side.opponent()), reason: EndReason::Forfeit { side } },
            ),
            (BattleKind::Trainer, _) => {
                self.emit(BattleEvent::ActionFailed {
                    side,
                    action_type: ActionType::Run,
                    reason: "there is no running from a trainer battle".to_string(),
                });
                return;
            }
        };

        self.emit(BattleEvent::RunAttempt { side, success, message });
        if success {
            self.pending_outcome = Some(outcome);
        }
    }

    // Knockouts

    fn run_ko_check(&mut self) {
        self.set_sub_phase(ResolutionSubPhase::KoCheck);

        let mut steps = VecDeque::new();
        for side_id in SideId::BOTH {
            let sequence = self.modules.knockout.check_and_process_ko(
                side_id,
                self.state.side(side_id),
                self.state.side(side_id.opponent()),
            );
            if let Some(sequence) = sequence {
                self.state.side_mut(side_id).team[sequence.team_index].is_fainted = true;
                steps.extend(sequence.steps);
            }
        }

        if self.pending_outcome.is_none() {
            self.pending_outcome = self.modules.knockout.check_battle_end(&self.state);
        }

        self.ko_steps = steps;
        match self.ko_steps.front() {
            Some(step) => {
                let delay = step.delay;
                self.timers.arm(TimerKind::KoStep, delay);
            }
            None => self.finish_turn(),
        }
    }

    fn emit_next_ko_step(&mut self) {
        if let Some(step) = self.ko_steps.pop_front() {
            let event = match step.kind {
                KoStepKind::Faint => BattleEvent::PokemonFainted { side: step.side, combatant_name: step.combatant_name },
                KoStepKind::Message { text } => BattleEvent::KoMessage { side: step.side, message: text },
                KoStepKind::WinnerAnnounce { winner } => BattleEvent::WinnerAnnounce {
                    winner,
                    display_name: self.state.side(winner).display_name.clone(),
                },
            };
            self.emit(event);
        }

        match self.ko_steps.front() {
            Some(next) => {
                let delay = next.delay;
                self.timers.arm(TimerKind::KoStep, delay);
            }
            None => self.finish_turn(),
        }
    }

    fn finish_turn(&mut self) {
        self.set_sub_phase(ResolutionSubPhase::None);
        self.state.turn_number += 1;
        self.emit(BattleEvent::ResolutionComplete { turn_number: self.state.turn_number });

        if let Some(outcome) = self.pending_outcome.take() {
            self.finish_battle(outcome, PhaseTrigger::BattleDecided);
            return;
        }

        for side_id in SideId::BOTH {
            let side = self.state.side_mut(side_id);
            if side.active().is_incapacitated() && side.has_healthy_reserve() {
                side.must_switch = true;
                let available = side.healthy_reserves().collect();
                self.emit(BattleEvent::ForcedSwitchRequired { side: side_id, available });
            }
        }
        self.transition(BattlePhase::ActionSelection, PhaseTrigger::TurnResolved);
    }

    fn finish_battle(&mut self, outcome: BattleOutcome, trigger: PhaseTrigger) {
        self.state.winner = outcome.winner;
        self.state.end_reason = Some(outcome.reason);
        self.transition(BattlePhase::Ended, trigger);
    }

    fn teardown(&mut self) {
        self.timers.cancel_all();
        self.queue.clear();
        self.resolution_order.clear();
        self.ko_steps.clear();
        self.state.is_ended = true;

        let outcome = BattleOutcome {
            winner: self.state.winner,
            reason: self.state.end_reason.unwrap_or(EndReason::Knockout),
        };
        let winner_identity = outcome.winner.map(|side| self.state.side(side).identity.clone());
        self.emit(BattleEvent::BattleEnd { outcome, winner_identity });

        let request = SaveRequest {
            battle_id: self.state.battle_id,
            kind: self.state.kind,
            outcome,
            turns: self.state.turn_number,
            player1_identity: self.state.player1.identity.clone(),
            player1_team: self.state.player1.team.clone(),
            player2_identity: self.state.player2.identity.clone(),
            player2_team: self.state.player2.team.clone(),
            captured: self.captured.clone(),
        };
        if let Err(e) = self.collaborators.persistence.save_battle_result(request) {
            warn!("Battle {}: persistence hook failed: {}", self.state.battle_id, e);
        }

        self.torn_down = true;
        info!(
            "Battle {} ended after {} turns: winner {:?}, reason {:?}",
            self.state.battle_id, self.state.turn_number, outcome.winner, outcome.reason
        );
    }

    // Plumbing

    fn transition(&mut self, next: BattlePhase, trigger: PhaseTrigger) -> bool {
        match self.phases.set_phase(&mut self.state, next, trigger) {
            Ok(transition) => {
                self.timers.cancel_all();
                self.emit(BattleEvent::PhaseChanged { from: transition.from, to: transition.to });
                self.run_entry_hooks(next);
                true
            }
            Err(e) => {
                error!("Battle {}: {}", self.state.battle_id, e);
                false
            }
        }
    }

    fn run_entry_hooks(&mut self, phase: BattlePhase) {
        for hook in PhaseManager::entry_hooks(phase) {
            match hook {
                PhaseHook::ArmIntroTimer => {
                    self.timers.arm(TimerKind::IntroElapsed, self.timing.intro_delay);
                }
                PhaseHook::ClearQueue => self.queue.clear(),
                PhaseHook::ScheduleAi => self.schedule_ai(),
                PhaseHook::ArmSelectionTimeout => {
                    if let Some(timeout) = self.timing.selection_timeout {
                        self.timers.arm(TimerKind::SelectionTimeout, timeout);
                    }
                }
                PhaseHook::BeginResolution => self.begin_resolution(),
                PhaseHook::Teardown => self.teardown(),
            }
        }
    }

    fn set_sub_phase(&mut self, next: ResolutionSubPhase) {
        if self.sub_phase == next {
            return;
        }
        let from = self.sub_phase;
        self.sub_phase = next;
        self.emit(BattleEvent::SubPhaseChanged { from, to: next });
    }

    fn emit(&mut self, event: BattleEvent) {
        let envelope = BattleEventEnvelope {
            battle_id: self.state.battle_id,
            sequence: self.next_sequence,
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
            turn_number: self.state.turn_number,
            phase: self.state.phase,
            sub_phase: self.sub_phase,
            event,
        };
        self.next_sequence += 1;

        if let Err(e) = self.collaborators.events.deliver(&envelope) {
            warn!("Battle {}: event delivery failed: {}", self.state.battle_id, e);
        }
        self.event_log.push(envelope);
    }

    fn report_sighting(&self, location: Option<String>) {
        let wild = self.state.player2.active();
        let report = SightingReport {
            identity: self.state.player1.identity.clone(),
            species_id: wild.species_id,
            name: wild.name.clone(),
            level: wild.level,
            is_shiny: wild.is_shiny,
            location,
        };
        if let Err(e) = self.collaborators.progression.combatant_sighted(report) {
            warn!("Battle {}: progression hook failed: {}", self.state.battle_id, e);
        }
    }
}

fn illegal(reason: impl Into<String>) -> BattleError {
    BattleError::IllegalAction(reason.into())
}

fn build_side(setup: SideSetup) -> Side {
    let active_index = setup
        .team
        .iter()
        .position(|c| !c.is_incapacitated())
        .unwrap_or(0);
    let mut team = setup.team;
    for combatant in &mut team {
        combatant.is_fainted = combatant.is_incapacitated();
    }
    Side {
        identity: setup.identity,
        display_name: setup.display_name,
        controller: setup.controller,
        team,
        active_index,
        inventory: setup.inventory,
        must_switch: false,
        escape_attempts: 0,
    }
}

fn side_summary(side: &Side) -> SideSummary {
    SideSummary {
        identity: side.identity.clone(),
        display_name: side.display_name.clone(),
        team_size: side.team.len(),
        active: side.active().public_view(),
    }
}

/// Safe action when a generated one is rejected
fn fallback_action(view: &PublicBattleView) -> ActionKind {
    if view.must_switch {
        if let Some((to_index, _)) = view.own_reserves.first() {
            return ActionKind::Switch { from_index: view.own_active_index, to_index: *to_index, is_forced: true };
        }
    }
    let move_id = view
        .own_active
        .moves
        .iter()
        .find(|m| m.current_pp > 0)
        .map(|m| m.data.id)
        .unwrap_or(STRUGGLE_MOVE_ID);
    ActionKind::Attack { move_id }
}

/// Escape odds out of 256 for a wild battle run attempt
fn escape_odds(runner_speed: u32, wild_speed: u32, attempts: u8) -> u32 {
    if wild_speed == 0 || runner_speed >= wild_speed {
        return 256;
    }
    let odds = (runner_speed as u64 * 128 / wild_speed as u64 + 30 * attempts as u64) % 256;
    odds as u32
}

fn validate_setup(setup: &BattleSetup) -> Result<()> {
    let config_error = |reason: String| Err(BattleError::InvalidConfig(reason));

    for (label, side) in [("player1", &setup.player1), ("player2", &setup.player2)] {
        if side.identity.trim().is_empty() {
            return config_error(format!("{} has an empty identity", label));
        }
        if side.team.is_empty() || side.team.len() > MAX_TEAM_SIZE {
            return config_error(format!(
                "{} team must have 1 to {} combatants, got {}",
                label,
                MAX_TEAM_SIZE,
                side.team.len()
            ));
        }
        for combatant in &side.team {
            if combatant.moves.is_empty() || combatant.moves.len() > MAX_KNOWN_MOVES {
                return config_error(format!(
                    "{} of {} must know 1 to {} moves",
                    combatant.name, label, MAX_KNOWN_MOVES
                ));
            }
            if combatant.current_hp > combatant.max_hp() {
                return config_error(format!(
                    "{} of {} has {} HP above its maximum {}",
                    combatant.name,
                    label,
                    combatant.current_hp,
                    combatant.max_hp()
                ));
            }
        }
        if side.team.iter().all(Combatant::is_incapacitated) {
            return config_error(format!("{} has no combatant able to battle", label));
        }
    }

    if setup.player1.identity == setup.player2.identity {
        return config_error("both sides share the same identity".to_string());
    }

    let (c1, c2) = (setup.player1.controller, setup.player2.controller);
    match setup.kind {
        BattleKind::Wild => {
            if c1 != Controller::Human || c2 != Controller::Ai {
                return config_error("wild battles need a human player1 and an AI player2".to_string());
            }
            if setup.player2.team.len() != 1 {
                return config_error("a wild encounter has exactly one combatant".to_string());
            }
        }
        BattleKind::Trainer => {
            if c1 != Controller::Human || c2 != Controller::Ai {
                return config_error("trainer battles need a human player1 and an AI player2".to_string());
            }
        }
        BattleKind::Pvp => {
            if c1 != Controller::Human || c2 != Controller::Human {
                return config_error("pvp battles need two human sides".to_string());
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combat::test_support::{combatant, side_setup};

    fn setup(kind: BattleKind) -> BattleSetup {
        let controller2 = if kind == BattleKind::Pvp { Controller::Human } else { Controller::Ai };
        BattleSetup {
            battle_id: None,
            kind,
            player1: side_setup("ash", Controller::Human, vec![combatant("pikachu", 20, 90)]),
            player2: side_setup("wild", controller2, vec![combatant("rattata", 20, 72)]),
            location: Some("route_1".to_string()),
            rng_seed: Some(42),
        }
    }

    fn start(setup: BattleSetup) -> Result<BattleEngine> {
        BattleEngine::start(setup, BattleModules::standard(&BattleTiming::instant(), None), Collaborators::default(), BattleTiming::instant())
    }

    #[test]
    fn start_emits_battle_start_then_intro() {
        let engine = start(setup(BattleKind::Wild)).unwrap();
        let names: Vec<_> = engine.event_log().iter().map(|e| e.event.name()).collect();
        assert_eq!(names, vec!["battle_start", "phase_changed"]);
        assert_eq!(engine.phase(), BattlePhase::Intro);
        assert_eq!(engine.state().turn_number, 1);
        assert!(engine.diagnostics().armed_timers.iter().any(|t| t.kind == TimerKind::IntroElapsed));
    }

    #[test]
    fn invalid_setups_fail_fast() {
        let mut same_identity = setup(BattleKind::Pvp);
        same_identity.player2.identity = "ash".to_string();
        assert!(matches!(start(same_identity), Err(BattleError::InvalidConfig(_))));

        let mut all_fainted = setup(BattleKind::Pvp);
        all_fainted.player1.team[0].current_hp = 0;
        assert!(matches!(start(all_fainted), Err(BattleError::InvalidConfig(_))));

        let mut human_wild = setup(BattleKind::Wild);
        human_wild.player2.controller = Controller::Human;
        assert!(matches!(start(human_wild), Err(BattleError::InvalidConfig(_))));

        let mut overhealed = setup(BattleKind::Pvp);
        overhealed.player1.team[0].current_hp = 999;
        assert!(matches!(start(overhealed), Err(BattleError::InvalidConfig(_))));

        let mut no_moves = setup(BattleKind::Trainer);
        no_moves.player2.team[0].moves.clear();
        assert!(matches!(start(no_moves), Err(BattleError::InvalidConfig(_))));
    }

    #[test]
    fn lead_is_first_living_combatant() {
        let mut with_fainted_lead = setup(BattleKind::Pvp);
        with_fainted_lead.player1.team.insert(0, combatant("fainted", 0, 10));
        let engine = start(with_fainted_lead).unwrap();
        assert_eq!(engine.state().player1.active_index, 1);
        assert!(engine.state().player1.team[0].is_fainted);
    }

    #[test]
    fn submissions_during_intro_are_rejected() {
        let mut engine = start(setup(BattleKind::Pvp)).unwrap();
        let err = engine
            .submit_action(BattleAction::new("ash", ActionKind::Attack { move_id: 33 }))
            .unwrap_err();
        assert_eq!(err, BattleError::WrongPhase { phase: BattlePhase::Intro, action: ActionType::Attack });
    }

    #[test]
    fn unknown_and_ai_identities_are_rejected() {
        let mut engine = start(setup(BattleKind::Wild)).unwrap();
        assert_eq!(
            engine.submit_action(BattleAction::new("gary", ActionKind::Run)),
            Err(BattleError::UnknownSide("gary".to_string()))
        );
        assert_eq!(
            engine.submit_action(BattleAction::new("wild", ActionKind::Run)),
            Err(BattleError::ServerControlledSide(SideId::Player2))
        );
    }

    #[test]
    fn stale_timer_is_ignored() {
        let mut engine = start(setup(BattleKind::Pvp)).unwrap();
        let (intro, _) = engine.next_due_timer().unwrap();
        assert!(engine.timers_mut().is_armed(TimerKind::IntroElapsed));
        assert!(engine.on_timer(intro));
        assert!(!engine.timers_mut().is_armed(TimerKind::IntroElapsed));
        assert!(!engine.on_timer(intro));
        assert_eq!(engine.phase(), BattlePhase::ActionSelection);
    }

    #[test]
    fn escape_odds_follow_speed_and_attempts() {
        assert_eq!(escape_odds(100, 50, 1), 256);
        assert_eq!(escape_odds(50, 100, 1), 64 + 30);
        assert_eq!(escape_odds(50, 100, 2), 64 + 60);
        assert_eq!(escape_odds(1, 0, 1), 256);
    }

    #[test]
    fn escape_odds_handle_huge_speeds() {
        assert_eq!(escape_odds(40_000_000, 50_000_000, 1), (102 + 30) % 256);
        assert!(escape_odds(u32::MAX - 1, u32::MAX, u8::MAX) < 256);
    }

    #[test]
    fn run_with_huge_speeds_finishes_the_turn() {
        let mut setup = setup(BattleKind::Wild);
        setup.player1.team[0].stats.speed = 40_000_000;
        setup.player2.team[0].stats.speed = 50_000_000;
        let mut engine = start(setup).unwrap();
        let (intro, _) = engine.next_due_timer().unwrap();
        engine.on_timer(intro);

        engine.submit_action(BattleAction::new("ash", ActionKind::Run)).unwrap();
        while let Some((id, _)) = engine.next_due_timer() {
            engine.on_timer(id);
        }
        assert!(engine
            .event_log()
            .iter()
            .any(|e| matches!(e.event, BattleEvent::RunAttempt { side: SideId::Player1, .. })));
        assert_ne!(engine.phase(), BattlePhase::ActionResolution);
    }
}
