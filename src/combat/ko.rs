use serde::Serialize;
use std::time::Duration;

use super::state::{BattleGameState, BattleOutcome, EndReason, Side, SideId};

/// Pacing of the knockout sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KoTiming {
    pub faint_delay: Duration,
    pub message_delay: Duration,
    pub winner_delay: Duration,
}

impl Default for KoTiming {
    fn default() -> Self {
        KoTiming {
            faint_delay: Duration::from_millis(500),
            message_delay: Duration::from_millis(1000),
            winner_delay: Duration::from_millis(1500),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum KoStepKind {
    Faint,
    Message { text: String },
    WinnerAnnounce { winner: SideId },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KoStep {
    pub delay: Duration, // Wait before emitting this step
    pub side: SideId,    // Side whose combatant fainted
    pub combatant_name: String,
    pub kind: KoStepKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnockoutSequence {
    pub side: SideId,
    pub team_index: usize,
    pub steps: Vec<KoStep>,
}

pub trait KnockoutManager: Send + Sync {
    fn name(&self) -> &'static str;

    /// Steps for the active combatant of `side` if it is down and not yet reported
    fn check_and_process_ko(&self, side_id: SideId, side: &Side, opponent: &Side) -> Option<KnockoutSequence>;

    fn check_battle_end(&self, state: &BattleGameState) -> Option<BattleOutcome>;
}

#[derive(Debug, Default, Clone)]
pub struct StandardKnockoutManager {
    timing: KoTiming,
}

impl StandardKnockoutManager {
    pub fn new(timing: KoTiming) -> Self {
        StandardKnockoutManager { timing }
    }
}

impl KnockoutManager for StandardKnockoutManager {
    fn name(&self) -> &'static str {
        "standard_ko"
    }

    fn check_and_process_ko(&self, side_id: SideId, side: &Side, opponent: &Side) -> Option<KnockoutSequence> {
        let combatant = side.active();
        if !combatant.is_incapacitated() || combatant.is_fainted {
            return None;
        }

        let name = combatant.name.clone();
        let mut steps = vec![
            KoStep {
                delay: self.timing.faint_delay,
                side: side_id,
                combatant_name: name.clone(),
                kind: KoStepKind::Faint,
            },
            KoStep {
                delay: self.timing.message_delay,
                side: side_id,
                combatant_name: name.clone(),
                kind: KoStepKind::Message { text: format!("{} fainted!", name) },
            },
        ];

        if !side.has_healthy_reserve() && !opponent.active().is_incapacitated() {
            steps.push(KoStep {
                delay: self.timing.winner_delay,
                side: side_id,
                combatant_name: name,
                kind: KoStepKind::WinnerAnnounce { winner: side_id.opponent() },
            });
        }

        Some(KnockoutSequence { side: side_id, team_index: side.active_index, steps })
    }

    fn check_battle_end(&self, state: &BattleGameState) -> Option<BattleOutcome> {
        match (state.player1.is_defeated(), state.player2.is_defeated()) {
            (true, true) => Some(BattleOutcome { winner: None, reason: EndReason::DoubleKnockout }),
            (true, false) => Some(BattleOutcome { winner: Some(SideId::Player2), reason: EndReason::Knockout }),
            (false, true) => Some(BattleOutcome { winner: Some(SideId::Player1), reason: EndReason::Knockout }),
            (false, false) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combat::state::BattleKind;
    use crate::combat::test_support::{side, state_with};

    #[test]
    fn healthy_combatant_has_no_sequence() {
        let ko = StandardKnockoutManager::default();
        let a = side("a", 1);
        let b = side("b", 1);
        assert!(ko.check_and_process_ko(SideId::Player1, &a, &b).is_none());
    }

    #[test]
    fn last_combatant_down_announces_winner() {
        let ko = StandardKnockoutManager::default();
        let a = side("a", 1);
        let mut b = side("b", 1);
        b.team[0].current_hp = 0;

        let sequence = ko.check_and_process_ko(SideId::Player2, &b, &a).unwrap();
        let kinds: Vec<_> = sequence.steps.iter().map(|s| s.kind.clone()).collect();
        assert_eq!(kinds[0], KoStepKind::Faint);
        assert!(matches!(kinds[1], KoStepKind::Message { .. }));
        assert_eq!(kinds[2], KoStepKind::WinnerAnnounce { winner: SideId::Player1 });
    }

    #[test]
    fn reserve_left_means_no_winner_step() {
        let ko = StandardKnockoutManager::default();
        let a = side("a", 1);
        let mut b = side("b", 2);
        b.team[0].current_hp = 0;
        let sequence = ko.check_and_process_ko(SideId::Player2, &b, &a).unwrap();
        assert_eq!(sequence.steps.len(), 2);
    }

    #[test]
    fn reported_knockout_is_not_repeated() {
        let ko = StandardKnockoutManager::default();
        let a = side("a", 1);
        let mut b = side("b", 1);
        b.team[0].current_hp = 0;
        b.team[0].is_fainted = true;
        assert!(ko.check_and_process_ko(SideId::Player2, &b, &a).is_none());
    }

    #[test]
    fn battle_end_detects_single_and_double_wipe() {
        let ko = StandardKnockoutManager::default();
        let mut state = state_with(BattleKind::Pvp, side("a", 1), side("b", 1));
        assert!(ko.check_battle_end(&state).is_none());

        state.player2.team[0].current_hp = 0;
        assert_eq!(
            ko.check_battle_end(&state),
            Some(BattleOutcome { winner: Some(SideId::Player1), reason: EndReason::Knockout })
        );

        state.player1.team[0].current_hp = 0;
        assert_eq!(
            ko.check_battle_end(&state),
            Some(BattleOutcome { winner: None, reason: EndReason::DoubleKnockout })
        );
    }
}
