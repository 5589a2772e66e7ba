use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;

use crate::monsters::move_manager::STRUGGLE_MOVE_ID;

use super::action::ActionKind;
use super::state::{BattleGameState, BattleKind, Combatant, CombatantView, SideId};

/// What a side is allowed to see when choosing an action
#[derive(Debug, Clone, Serialize)]
pub struct PublicBattleView {
    pub side: SideId,
    pub kind: BattleKind,
    pub turn_number: u32,
    pub must_switch: bool,
    pub own_active_index: usize,
    pub own_active: Combatant,
    pub own_reserves: Vec<(usize, CombatantView)>, // Healthy reserves with their team index
    pub opponent_active: CombatantView,
}

impl PublicBattleView {
    pub fn for_side(state: &BattleGameState, side_id: SideId) -> Self {
        let side = state.side(side_id);
        let opponent = state.side(side_id.opponent());
        PublicBattleView {
            side: side_id,
            kind: state.kind,
            turn_number: state.turn_number,
            must_switch: side.must_switch,
            own_active_index: side.active_index,
            own_active: side.active().clone(),
            own_reserves: side
                .healthy_reserves()
                .map(|index| (index, side.team[index].public_view()))
                .collect(),
            opponent_active: opponent.active().public_view(),
        }
    }

    /// Wild creatures are always player2 in a wild battle
    pub fn is_wild_creature(&self) -> bool {
        self.kind == BattleKind::Wild && self.side == SideId::Player2
    }
}

pub trait OpponentAi: Send + Sync {
    fn name(&self) -> &'static str;

    fn generate_action(&self, view: &PublicBattleView, rng: &mut SmallRng) -> ActionKind;
}

#[derive(Debug, Clone)]
pub struct StandardAi {
    pub wild_flee_chance: f64,
}

impl Default for StandardAi {
    fn default() -> Self {
        StandardAi { wild_flee_chance: 0.05 }
    }
}

impl StandardAi {
    pub fn new(wild_flee_chance: f64) -> Self {
        StandardAi { wild_flee_chance: wild_flee_chance.clamp(0.0, 1.0) }
    }

    fn best_scoring_move(view: &PublicBattleView) -> Option<u32> {
        let attacker = &view.own_active;
        attacker
            .moves
            .iter()
            .filter(|m| m.current_pp > 0)
            .map(|m| {
                let power = m.data.power.unwrap_or(0) as f32;
                let accuracy = m.data.accuracy.unwrap_or(100) as f32 / 100.0;
                let stab = if attacker.types.contains(&m.data.move_type) { 1.5 } else { 1.0 };
                (m.data.id, power * accuracy * stab)
            })
            .fold(None, |best: Option<(u32, f32)>, (id, score)| match best {
                Some((_, best_score)) if best_score >= score => best,
                _ => Some((id, score)),
            })
            .map(|(id, _)| id)
    }

    fn random_move(view: &PublicBattleView, rng: &mut SmallRng) -> Option<u32> {
        let usable: Vec<u32> = view
            .own_active
            .moves
            .iter()
            .filter(|m| m.current_pp > 0)
            .map(|m| m.data.id)
            .collect();
        usable.choose(rng).copied()
    }
}

impl OpponentAi for StandardAi {
    fn name(&self) -> &'static str {
        "standard_ai"
    }

    fn generate_action(&self, view: &PublicBattleView, rng: &mut SmallRng) -> ActionKind {
        if view.must_switch {
            if let Some((to_index, _)) = view.own_reserves.first() {
                return ActionKind::Switch {
                    from_index: view.own_active_index,
                    to_index: *to_index,
                    is_forced: true,
                };
            }
        }

        if view.is_wild_creature() && self.wild_flee_chance > 0.0 && rng.gen_bool(self.wild_flee_chance) {
            return ActionKind::Run;
        }

        let chosen = if view.is_wild_creature() {
            Self::random_move(view, rng)
        } else {
            Self::best_scoring_move(view)
        };

        ActionKind::Attack { move_id: chosen.unwrap_or(STRUGGLE_MOVE_ID) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combat::test_support::{move_with, side, state_with};
    use crate::monsters::PokemonType;
    use rand::SeedableRng;

    fn view_for(kind: BattleKind, side_id: SideId, state_fn: impl FnOnce(&mut BattleGameState)) -> PublicBattleView {
        let mut state = state_with(kind, side("a", 2), side("b", 2));
        state_fn(&mut state);
        PublicBattleView::for_side(&state, side_id)
    }

    #[test]
    fn trainer_picks_best_expected_damage() {
        let view = view_for(BattleKind::Trainer, SideId::Player2, |state| {
            let active = state.player2.active_mut();
            active.types = vec![PokemonType::Fire];
            active.moves = vec![
                move_with(1, 80, Some(100), PokemonType::Normal),
                move_with(2, 70, Some(100), PokemonType::Fire),
                move_with(3, 120, Some(50), PokemonType::Normal),
            ];
        });
        let mut rng = SmallRng::seed_from_u64(3);
        assert_eq!(StandardAi::new(0.0).generate_action(&view, &mut rng), ActionKind::Attack { move_id: 2 });
    }

    #[test]
    fn no_pp_falls_back_to_struggle() {
        let view = view_for(BattleKind::Trainer, SideId::Player2, |state| {
            for m in &mut state.player2.active_mut().moves {
                m.current_pp = 0;
            }
        });
        let mut rng = SmallRng::seed_from_u64(3);
        assert_eq!(
            StandardAi::default().generate_action(&view, &mut rng),
            ActionKind::Attack { move_id: STRUGGLE_MOVE_ID }
        );
    }

    #[test]
    fn forced_switch_picks_first_healthy_reserve() {
        let view = view_for(BattleKind::Trainer, SideId::Player2, |state| {
            state.player2.team[0].current_hp = 0;
            state.player2.must_switch = true;
        });
        let mut rng = SmallRng::seed_from_u64(3);
        assert_eq!(
            StandardAi::default().generate_action(&view, &mut rng),
            ActionKind::Switch { from_index: 0, to_index: 1, is_forced: true }
        );
    }

    #[test]
    fn wild_creature_always_flees_at_full_chance() {
        let view = view_for(BattleKind::Wild, SideId::Player2, |_| {});
        let mut rng = SmallRng::seed_from_u64(3);
        assert_eq!(StandardAi::new(1.0).generate_action(&view, &mut rng), ActionKind::Run);
    }

    #[test]
    fn wild_player_side_never_flees() {
        let view = view_for(BattleKind::Wild, SideId::Player1, |_| {});
        let mut rng = SmallRng::seed_from_u64(3);
        assert!(matches!(
            StandardAi::new(1.0).generate_action(&view, &mut rng),
            ActionKind::Attack { .. }
        ));
    }

    #[test]
    fn view_hides_opponent_moves() {
        let view = view_for(BattleKind::Pvp, SideId::Player1, |_| {});
        let json = serde_json::to_value(&view.opponent_active).unwrap();
        assert!(json.get("moves").is_none());
        assert_eq!(view.own_reserves.len(), 1);
    }
}
