//! Phase state machine.
//!
//! The manager is the only writer of [`BattleGameState::phase`]. Side effects of
//! entering a phase are declared in [`PhaseManager::entry_hooks`] and executed by
//! the engine right after a successful transition.

use serde::Serialize;
use thiserror::Error;

use crate::error::{BattleError, Result};

use super::action::{ActionKind, ActionType};
use super::state::{BattleGameState, BattlePhase, SideId};

/// Why a transition was requested
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PhaseTrigger {
    BattleStarted,
    IntroElapsed,
    ActionsReady,
    CaptureThrown,
    CaptureFailed,
    CaptureSucceeded,
    TurnResolved,
    BattleDecided,
}

/// Side effect run when a phase is entered
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PhaseHook {
    ArmIntroTimer,
    ClearQueue,
    ScheduleAi,
    ArmSelectionTimeout,
    BeginResolution,
    Teardown,
}

/// Which action types ACTION_SELECTION accepts
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMode {
    Normal,
    ForcedSwitch,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PhaseTransition {
    pub from: Option<BattlePhase>, // None for the initial entry
    pub to: BattlePhase,
    pub trigger: PhaseTrigger,
    pub turn_number: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PhaseError {
    #[error("illegal phase transition {from} -> {to}")]
    IllegalTransition { from: BattlePhase, to: BattlePhase },
}

const INTRO_HOOKS: &[PhaseHook] = &[PhaseHook::ArmIntroTimer];
const SELECTION_HOOKS: &[PhaseHook] = &[
    PhaseHook::ClearQueue,
    PhaseHook::ScheduleAi,
    PhaseHook::ArmSelectionTimeout,
];
const RESOLUTION_HOOKS: &[PhaseHook] = &[PhaseHook::BeginResolution];
const ENDED_HOOKS: &[PhaseHook] = &[PhaseHook::Teardown];

#[derive(Debug, Default, Clone)]
pub struct PhaseManager {
    history: Vec<PhaseTransition>,
}

impl PhaseManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_legal(from: BattlePhase, to: BattlePhase) -> bool {
        use BattlePhase::*;
        matches!(
            (from, to),
            (Intro, ActionSelection)
                | (ActionSelection, ActionResolution)
                | (ActionSelection, Capture)
                | (ActionResolution, ActionSelection)
                | (ActionResolution, Ended)
                | (Capture, ActionSelection)
                | (Capture, Ended)
        )
    }

    /// Record the phase a freshly built state starts in
    pub fn enter_initial(&mut self, state: &mut BattleGameState) -> PhaseTransition {
        state.phase = BattlePhase::Intro;
        let transition = PhaseTransition {
            from: None,
            to: BattlePhase::Intro,
            trigger: PhaseTrigger::BattleStarted,
            turn_number: state.turn_number,
        };
        self.history.push(transition.clone());
        transition
    }

    /// Move to `next`; fails without touching the state when the edge is illegal
    pub fn set_phase(
        &mut self,
        state: &mut BattleGameState,
        next: BattlePhase,
        trigger: PhaseTrigger,
    ) -> std::result::Result<PhaseTransition, PhaseError> {
        let from = state.phase;
        if !Self::is_legal(from, next) {
            return Err(PhaseError::IllegalTransition { from, to: next });
        }
        state.phase = next;
        let transition = PhaseTransition {
            from: Some(from),
            to: next,
            trigger,
            turn_number: state.turn_number,
        };
        self.history.push(transition.clone());
        Ok(transition)
    }

    pub fn entry_hooks(phase: BattlePhase) -> &'static [PhaseHook] {
        match phase {
            BattlePhase::Intro => INTRO_HOOKS,
            BattlePhase::ActionSelection => SELECTION_HOOKS,
            BattlePhase::ActionResolution => RESOLUTION_HOOKS,
            BattlePhase::Capture => &[],
            BattlePhase::Ended => ENDED_HOOKS,
        }
    }

    pub fn can_submit_action(state: &BattleGameState) -> bool {
        state.phase == BattlePhase::ActionSelection
    }

    pub fn selection_mode(state: &BattleGameState) -> SelectionMode {
        if state.player1.must_switch || state.player2.must_switch {
            SelectionMode::ForcedSwitch
        } else {
            SelectionMode::Normal
        }
    }

    /// Legality table over phase, selection mode and action type
    pub fn is_allowed(phase: BattlePhase, mode: SelectionMode, action: ActionType) -> bool {
        match (phase, mode) {
            (BattlePhase::ActionSelection, SelectionMode::Normal) => true,
            (BattlePhase::ActionSelection, SelectionMode::ForcedSwitch) => action == ActionType::Switch,
            _ => false,
        }
    }

    pub fn validate_action(state: &BattleGameState, side: SideId, action: &ActionKind) -> Result<()> {
        let action_type = action.action_type();
        if !Self::can_submit_action(state) {
            return Err(BattleError::WrongPhase { phase: state.phase, action: action_type });
        }

        let mode = Self::selection_mode(state);
        if !Self::is_allowed(state.phase, mode, action_type) {
            return Err(BattleError::IllegalAction(format!(
                "{} is not allowed while a fainted combatant is being replaced",
                action_type
            )));
        }

        let is_forced = matches!(action, ActionKind::Switch { is_forced: true, .. });
        match mode {
            SelectionMode::ForcedSwitch if !state.side(side).must_switch => {
                Err(BattleError::AwaitingForcedSwitch(side.opponent()))
            }
            SelectionMode::Normal if is_forced => Err(BattleError::IllegalAction(
                "switch is flagged as forced but no forced switch is pending".to_string(),
            )),
            _ => Ok(()),
        }
    }

    pub fn history(&self) -> &[PhaseTransition] {
        &self.history
    }
}
