//! Points awarded for a correct answer.
//!
//! Answers within the first second earn the whole bonus. After that the bonus
//! decays hyperbolically: `bonus = floor(reward_bonus * m / elapsed_secs)`.

use std::time::Duration;

use crate::config::GameConfig;

/// Answers faster than this get the full bonus.
pub const FULL_BONUS_WINDOW: Duration = Duration::from_secs(1);

/// Breakdown of a correct answer's reward.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reward {
    pub points: u64,
    pub multiplier: f64,
    pub bonus: u64,
}

impl Reward {
    pub fn total(&self) -> u64 {
        self.points.saturating_add(self.bonus)
    }
}

pub fn bonus_multiplier(decay: f64, elapsed: Duration) -> f64 {
    if elapsed < FULL_BONUS_WINDOW {
        1.0
    } else {
        decay / elapsed.as_secs_f64()
    }
}

impl GameConfig {
    /// Reward for a correct answer given `elapsed` since the question started.
    pub fn reward_for(&self, elapsed: Duration) -> Reward {
        let multiplier = bonus_multiplier(self.reward_bonus_time_multiplier, elapsed);
        let bonus = (self.reward_bonus as f64 * multiplier).floor() as u64;

        Reward {
            points: self.reward_points,
            multiplier,
            bonus,
        }
    }
}
