use rand::rngs::SmallRng;
use rand::Rng;
use serde::Serialize;

use super::action::BallType;
use super::state::{Combatant, StatusCondition};

#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct CaptureOutcome {
    pub probability: f64,
    pub shakes: u8, // 0..=3
    pub success: bool,
}

pub trait CaptureManager: Send + Sync {
    fn name(&self) -> &'static str;

    fn attempt(&self, target: &Combatant, ball: BallType, rng: &mut SmallRng) -> CaptureOutcome;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct StandardCaptureManager;

fn ball_bonus(ball: BallType) -> f64 {
    match ball {
        BallType::PokeBall => 1.0,
        BallType::GreatBall => 1.5,
        BallType::UltraBall => 2.0,
        BallType::MasterBall => 255.0,
    }
}

fn status_bonus(status: Option<StatusCondition>) -> f64 {
    match status {
        Some(StatusCondition::Sleep) | Some(StatusCondition::Freeze) => 2.0,
        Some(_) => 1.5,
        None => 1.0,
    }
}

/// Chance in [0, 1] that `ball` captures `target`
pub fn capture_probability(target: &Combatant, ball: BallType) -> f64 {
    if ball == BallType::MasterBall {
        return 1.0;
    }
    let max = target.max_hp().max(1) as f64;
    let current = target.current_hp.min(target.max_hp()) as f64;
    let a = ((3.0 * max - 2.0 * current) * target.catch_rate as f64 * ball_bonus(ball)) / (3.0 * max)
        * status_bonus(target.status);
    (a / 255.0).clamp(0.0, 1.0)
}

impl CaptureManager for StandardCaptureManager {
    fn name(&self) -> &'static str {
        "standard_capture"
    }

    fn attempt(&self, target: &Combatant, ball: BallType, rng: &mut SmallRng) -> CaptureOutcome {
        let probability = capture_probability(target, ball);
        if probability >= 1.0 {
            return CaptureOutcome { probability, shakes: 3, success: true };
        }

        // Four checks; each passed check before the last one is a visible shake
        let per_check = probability.powf(0.25);
        let mut passed = 0u8;
        while passed < 4 && rng.gen_bool(per_check) {
            passed += 1;
        }

        CaptureOutcome {
            probability,
            shakes: passed.min(3),
            success: passed == 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combat::test_support::combatant;
    use rand::SeedableRng;

    #[test]
    fn lower_health_and_better_ball_raise_probability() {
        let mut target = combatant("wild", 20, 10);
        let full = capture_probability(&target, BallType::PokeBall);
        target.current_hp = 1;
        let weak = capture_probability(&target, BallType::PokeBall);
        let weak_ultra = capture_probability(&target, BallType::UltraBall);
        assert!(weak > full);
        assert!(weak_ultra > weak);
    }

    #[test]
    fn full_health_poke_ball_uses_formula() {
        let target = combatant("wild", 20, 10);
        // a = (60 - 40) * 45 / 60 = 15
        let expected = 15.0 / 255.0;
        assert!((capture_probability(&target, BallType::PokeBall) - expected).abs() < 1e-9);
    }

    #[test]
    fn sleeping_target_doubles_odds() {
        let mut target = combatant("wild", 20, 10);
        let base = capture_probability(&target, BallType::PokeBall);
        target.status = Some(StatusCondition::Sleep);
        assert!((capture_probability(&target, BallType::PokeBall) - base * 2.0).abs() < 1e-9);
    }

    #[test]
    fn master_ball_always_succeeds() {
        let target = combatant("wild", 20, 10);
        let mut rng = SmallRng::seed_from_u64(1);
        let outcome = StandardCaptureManager.attempt(&target, BallType::MasterBall, &mut rng);
        assert!(outcome.success);
        assert_eq!(outcome.shakes, 3);
    }

    #[test]
    fn zero_catch_rate_never_succeeds() {
        let mut target = combatant("wild", 20, 10);
        target.catch_rate = 0;
        let mut rng = SmallRng::seed_from_u64(7);
        for _ in 0..20 {
            let outcome = StandardCaptureManager.attempt(&target, BallType::UltraBall, &mut rng);
            assert!(!outcome.success);
            assert_eq!(outcome.shakes, 0);
        }
    }
}
