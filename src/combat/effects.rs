//! Injected move effect computation.

use std::sync::Arc;

use rand::rngs::SmallRng;
use rand::Rng;
use serde::Serialize;
use thiserror::Error;

use crate::monsters::{MoveCategory, MoveData, MoveRepository};

use super::state::{Combatant, StatusCondition};

pub struct MoveContext<'a> {
    pub attacker: &'a Combatant,
    pub defender: &'a Combatant,
    pub move_data: &'a MoveData,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct MoveOutcome {
    pub hit: bool,
    pub damage: u32,
    pub effectiveness: f32,
    pub critical: bool,
    pub recoil: u32,
    pub inflicted_status: Option<StatusCondition>,
}

impl MoveOutcome {
    pub fn missed() -> Self {
        MoveOutcome {
            hit: false,
            damage: 0,
            effectiveness: 1.0,
            critical: false,
            recoil: 0,
            inflicted_status: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ResolutionError {
    #[error("{combatant} has a zero {stat} stat")]
    ZeroStat { combatant: String, stat: &'static str },

    #[error("move {move_id} has accuracy {accuracy} above 100")]
    InvalidAccuracy { move_id: u32, accuracy: u8 },

    #[error("{0}")]
    Other(String),
}

pub trait MoveEffectResolver: Send + Sync {
    fn name(&self) -> &'static str;

    fn resolve(&self, ctx: &MoveContext<'_>, rng: &mut SmallRng) -> Result<MoveOutcome, ResolutionError>;
}

/// Classic damage formula with STAB, type chart, crits and a random roll
#[derive(Debug, Default, Clone)]
pub struct StandardMoveResolver {
    repository: Option<Arc<MoveRepository>>, // Source of the type chart, neutral when absent
}

impl StandardMoveResolver {
    pub fn new(repository: Option<Arc<MoveRepository>>) -> Self {
        StandardMoveResolver { repository }
    }

    fn effectiveness(&self, ctx: &MoveContext<'_>) -> f32 {
        self.repository
            .as_ref()
            .map(|repo| repo.effectiveness(ctx.move_data.move_type, &ctx.defender.types))
            .unwrap_or(1.0)
    }
}

impl MoveEffectResolver for StandardMoveResolver {
    fn name(&self) -> &'static str {
        "standard_damage"
    }

    fn resolve(&self, ctx: &MoveContext<'_>, rng: &mut SmallRng) -> Result<MoveOutcome, ResolutionError> {
        let move_data = ctx.move_data;

        if let Some(accuracy) = move_data.accuracy {
            if accuracy > 100 {
                return Err(ResolutionError::InvalidAccuracy { move_id: move_data.id, accuracy });
            }
            if rng.gen_range(1..=100u8) > accuracy {
                return Ok(MoveOutcome::missed());
            }
        }

        let (attack, defense, attack_name, defense_name) = match move_data.damage_class {
            MoveCategory::Physical => (ctx.attacker.stats.attack, ctx.defender.stats.defense, "attack", "defense"),
            MoveCategory::Special => (
                ctx.attacker.stats.special_attack,
                ctx.defender.stats.special_defense,
                "special_attack",
                "special_defense",
            ),
            MoveCategory::Status => {
                return Ok(MoveOutcome {
                    hit: true,
                    damage: 0,
                    effectiveness: 1.0,
                    critical: false,
                    recoil: 0,
                    inflicted_status: roll_secondary(move_data, ctx.defender, rng),
                })
            }
        };

        let power = move_data.power.unwrap_or(0);
        let mut outcome = MoveOutcome { hit: true, ..MoveOutcome::missed() };
        if power == 0 {
            return Ok(outcome);
        }
        if attack == 0 {
            return Err(ResolutionError::ZeroStat { combatant: ctx.attacker.name.clone(), stat: attack_name });
        }
        if defense == 0 {
            return Err(ResolutionError::ZeroStat { combatant: ctx.defender.name.clone(), stat: defense_name });
        }

        let effectiveness = self.effectiveness(ctx);
        let stab = if ctx.attacker.types.contains(&move_data.move_type) { 1.5 } else { 1.0 };
        let critical = rng.gen_bool(0.0625);
        let critical_mod = if critical { 1.5 } else { 1.0 };
        let random_factor: f32 = rng.gen_range(0.85..=1.0);

        // Damage = (((2 * Level / 5 + 2) * Power * A/D) / 50 + 2) * Modifier
        let base_damage = ((2.0 * ctx.attacker.level as f32 / 5.0 + 2.0) * power as f32 * attack as f32
            / defense as f32)
            / 50.0
            + 2.0;
        let modifier = stab * effectiveness * critical_mod * random_factor;
        let damage = if effectiveness == 0.0 {
            0
        } else {
            ((base_damage * modifier).floor() as u32).max(1)
        };

        let dealt = damage.min(ctx.defender.current_hp);
        let recoil = match move_data.recoil_percent {
            Some(percent) if dealt > 0 => (dealt * percent as u32 / 100).max(1),
            _ => 0,
        };

        outcome.damage = damage;
        outcome.effectiveness = effectiveness;
        outcome.critical = critical;
        outcome.recoil = recoil;
        if damage > 0 {
            outcome.inflicted_status = roll_secondary(move_data, ctx.defender, rng);
        }
        Ok(outcome)
    }
}

/// Secondary status lands only on a combatant without one
fn roll_secondary(move_data: &MoveData, defender: &Combatant, rng: &mut SmallRng) -> Option<StatusCondition> {
    let secondary = move_data.secondary_effect.as_ref()?;
    if defender.status.is_some() {
        return None;
    }
    (rng.gen_range(1..=100u8) <= secondary.chance).then_some(secondary.status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combat::test_support::{combatant, move_with};
    use crate::monsters::move_manager::SecondaryEffectData;
    use crate::monsters::{PokemonType, TypeChart};
    use rand::SeedableRng;
    use std::collections::HashMap;

    #[test]
    fn damage_stays_within_formula_bounds() {
        let attacker = combatant("a", 20, 10);
        let defender = combatant("b", 20, 10);
        let tackle = move_with(33, 40, Some(100), PokemonType::Water).data;
        let resolver = StandardMoveResolver::default();
        let mut rng = SmallRng::seed_from_u64(11);

        // Level 5, power 40, A = D: base = (4 * 40) / 50 + 2 = 5.2
        for _ in 0..50 {
            let ctx = MoveContext { attacker: &attacker, defender: &defender, move_data: &tackle };
            let outcome = resolver.resolve(&ctx, &mut rng).unwrap();
            assert!(outcome.hit);
            assert!((4..=7).contains(&outcome.damage), "damage {}", outcome.damage);
        }
    }

    #[test]
    fn immune_defender_takes_nothing() {
        let mut chart: TypeChart = HashMap::new();
        chart.insert(PokemonType::Normal, HashMap::from([(PokemonType::Ghost, 0.0)]));
        let repository = MoveRepository::from_parts(Vec::new(), chart);
        let resolver = StandardMoveResolver::new(Some(repository));

        let attacker = combatant("a", 20, 10);
        let mut defender = combatant("b", 20, 10);
        defender.types = vec![PokemonType::Ghost];
        let tackle = move_with(33, 40, Some(100), PokemonType::Normal).data;
        let mut rng = SmallRng::seed_from_u64(2);
        let ctx = MoveContext { attacker: &attacker, defender: &defender, move_data: &tackle };
        let outcome = resolver.resolve(&ctx, &mut rng).unwrap();
        assert_eq!(outcome.damage, 0);
        assert_eq!(outcome.effectiveness, 0.0);
    }

    #[test]
    fn zero_accuracy_always_misses() {
        let attacker = combatant("a", 20, 10);
        let defender = combatant("b", 20, 10);
        let wild_swing = move_with(1, 40, Some(0), PokemonType::Normal).data;
        let mut rng = SmallRng::seed_from_u64(5);
        let ctx = MoveContext { attacker: &attacker, defender: &defender, move_data: &wild_swing };
        assert!(!StandardMoveResolver::default().resolve(&ctx, &mut rng).unwrap().hit);
    }

    #[test]
    fn zero_defense_is_a_resolution_error() {
        let attacker = combatant("a", 20, 10);
        let mut defender = combatant("b", 20, 10);
        defender.stats.defense = 0;
        let tackle = move_with(33, 40, None, PokemonType::Normal).data;
        let mut rng = SmallRng::seed_from_u64(5);
        let ctx = MoveContext { attacker: &attacker, defender: &defender, move_data: &tackle };
        assert!(matches!(
            StandardMoveResolver::default().resolve(&ctx, &mut rng),
            Err(ResolutionError::ZeroStat { stat: "defense", .. })
        ));
    }

    #[test]
    fn struggle_recoils_and_guaranteed_secondary_applies() {
        let attacker = combatant("a", 20, 10);
        let defender = combatant("b", 20, 10);
        let struggle = MoveData::struggle();
        let mut rng = SmallRng::seed_from_u64(9);
        let ctx = MoveContext { attacker: &attacker, defender: &defender, move_data: &struggle };
        let outcome = StandardMoveResolver::default().resolve(&ctx, &mut rng).unwrap();
        assert!(outcome.recoil >= 1);

        let mut spark = move_with(2, 40, None, PokemonType::Electric).data;
        spark.secondary_effect = Some(SecondaryEffectData { chance: 100, status: StatusCondition::Paralysis });
        let ctx = MoveContext { attacker: &attacker, defender: &defender, move_data: &spark };
        let outcome = StandardMoveResolver::default().resolve(&ctx, &mut rng).unwrap();
        assert_eq!(outcome.inflicted_status, Some(StatusCondition::Paralysis));
    }
}
