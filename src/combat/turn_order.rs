//! Speed/priority ordering of queued actions.

use std::cmp::Ordering;

use super::action::QueuedAction;

pub trait TurnOrderCalculator: Send + Sync {
    fn name(&self) -> &'static str;

    /// Execution order for the queued actions, first entry resolves first
    fn order(&self, actions: &[QueuedAction]) -> Vec<QueuedAction>;
}

/// Category, then move priority, then speed, then side ordinal
#[derive(Debug, Default, Clone, Copy)]
pub struct SpeedPriorityCalculator;

impl TurnOrderCalculator for SpeedPriorityCalculator {
    fn name(&self) -> &'static str {
        "speed_priority"
    }

    fn order(&self, actions: &[QueuedAction]) -> Vec<QueuedAction> {
        let mut ordered = actions.to_vec();
        ordered.sort_by(compare_actions);
        ordered
    }
}

/// Total order used by [`SpeedPriorityCalculator`]
pub fn compare_actions(a: &QueuedAction, b: &QueuedAction) -> Ordering {
    b.category
        .rank()
        .cmp(&a.category.rank())
        .then_with(|| b.priority.cmp(&a.priority))
        .then_with(|| b.speed.cmp(&a.speed))
        .then_with(|| a.side.ordinal().cmp(&b.side.ordinal()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combat::action::{ActionKind, BattleAction, BallType};
    use crate::combat::state::SideId;
    use proptest::prelude::*;

    fn queued(side: SideId, kind: ActionKind, priority: i8, speed: u32) -> QueuedAction {
        QueuedAction::new(side, BattleAction::new(side.to_string(), kind), priority, speed)
    }

    fn order(a: QueuedAction, b: QueuedAction) -> Vec<SideId> {
        SpeedPriorityCalculator.order(&[a, b]).iter().map(|q| q.side).collect()
    }

    #[test]
    fn switch_beats_faster_attack() {
        let attack = queued(SideId::Player1, ActionKind::Attack { move_id: 33 }, 0, 200);
        let switch = queued(SideId::Player2, ActionKind::Switch { from_index: 0, to_index: 1, is_forced: false }, 0, 10);
        assert_eq!(order(attack, switch), vec![SideId::Player2, SideId::Player1]);
    }

    #[test]
    fn item_beats_attack_and_loses_to_capture() {
        let item = queued(SideId::Player2, ActionKind::Item { item_id: "potion".to_string() }, 0, 1);
        let attack = queued(SideId::Player1, ActionKind::Attack { move_id: 33 }, 5, 999);
        assert_eq!(order(attack, item.clone()), vec![SideId::Player2, SideId::Player1]);

        let capture = queued(SideId::Player1, ActionKind::Capture { ball_type: BallType::PokeBall }, 0, 1);
        assert_eq!(order(item, capture), vec![SideId::Player1, SideId::Player2]);
    }

    #[test]
    fn quick_move_beats_speed() {
        let quick = queued(SideId::Player2, ActionKind::Attack { move_id: 98 }, 1, 10);
        let slow = queued(SideId::Player1, ActionKind::Attack { move_id: 33 }, 0, 100);
        assert_eq!(order(slow, quick), vec![SideId::Player2, SideId::Player1]);
    }

    #[test]
    fn speed_tie_goes_to_player1() {
        let p2 = queued(SideId::Player2, ActionKind::Attack { move_id: 33 }, 0, 50);
        let p1 = queued(SideId::Player1, ActionKind::Attack { move_id: 33 }, 0, 50);
        assert_eq!(order(p2, p1), vec![SideId::Player1, SideId::Player2]);
    }

    fn arb_kind() -> impl Strategy<Value = ActionKind> {
        prop_oneof![
            (1u32..200).prop_map(|move_id| ActionKind::Attack { move_id }),
            (0usize..6).prop_map(|to_index| ActionKind::Switch { from_index: 0, to_index, is_forced: false }),
            Just(ActionKind::Item { item_id: "potion".to_string() }),
            Just(ActionKind::Capture { ball_type: BallType::GreatBall }),
            Just(ActionKind::Run),
        ]
    }

    proptest! {
        #[test]
        fn ordering_is_total_and_input_order_independent(
            k1 in arb_kind(), k2 in arb_kind(),
            p1 in -7i8..=5, p2 in -7i8..=5,
            s1 in 0u32..300, s2 in 0u32..300,
        ) {
            let a = queued(SideId::Player1, k1, p1, s1);
            let b = queued(SideId::Player2, k2, p2, s2);

            let forward = order(a.clone(), b.clone());
            let backward = order(b.clone(), a.clone());
            prop_assert_eq!(&forward, &backward);
            prop_assert_eq!(forward.clone(), order(a.clone(), b.clone()));
            prop_assert_ne!(compare_actions(&a, &b), Ordering::Equal);

            let first = if forward[0] == SideId::Player1 { &a } else { &b };
            let second = if forward[0] == SideId::Player1 { &b } else { &a };
            prop_assert!(first.category.rank() >= second.category.rank());
            if first.category == second.category {
                prop_assert!(first.priority >= second.priority);
                if first.priority == second.priority {
                    prop_assert!(first.speed >= second.speed);
                }
            }
        }
    }
}
