use std::time::Duration;

use common::config::Validate;
use common::games::tictactoe::Difficulty;
use serde::{Deserialize, Serialize};

/// Artificial "thinking" pause before the AI answers, per difficulty.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct AiConfig {
    pub default_difficulty: Difficulty,
    pub easy_delay_ms: u64,
    pub medium_delay_ms: u64,
    pub hard_delay_ms: u64,
    pub impossible_delay_ms: u64,
}

impl AiConfig {
    pub fn thinking_delay(&self, difficulty: Difficulty) -> Duration {
        let ms = match difficulty {
            Difficulty::Easy => self.easy_delay_ms,
            Difficulty::Medium => self.medium_delay_ms,
            Difficulty::Hard => self.hard_delay_ms,
            Difficulty::Impossible => self.impossible_delay_ms,
        };
        Duration::from_millis(ms)
    }

    /// No pauses at all; for tests and headless play.
    pub fn instant() -> Self {
        Self {
            easy_delay_ms: 0,
            medium_delay_ms: 0,
            hard_delay_ms: 0,
            impossible_delay_ms: 0,
            ..Self::default()
        }
    }
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            default_difficulty: Difficulty::Medium,
            easy_delay_ms: 400,
            medium_delay_ms: 600,
            hard_delay_ms: 800,
            impossible_delay_ms: 1_000,
        }
    }
}

impl Validate for AiConfig {
    fn validate(&self) -> Result<(), String> {
        let limit = 10_000;
        for (name, value) in [
            ("easy_delay_ms", self.easy_delay_ms),
            ("medium_delay_ms", self.medium_delay_ms),
            ("hard_delay_ms", self.hard_delay_ms),
            ("impossible_delay_ms", self.impossible_delay_ms),
        ] {
            if value > limit {
                return Err(format!("{} must not exceed {}", name, limit));
            }
        }
        Ok(())
    }
}
