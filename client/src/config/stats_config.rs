use std::time::Duration;

use common::config::Validate;
use serde::{Deserialize, Serialize};

#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct StatsConfig {
    pub leaderboard_timeout_ms: u64,
    pub leaderboard_limit: usize,
}

impl StatsConfig {
    pub fn leaderboard_timeout(&self) -> Duration {
        Duration::from_millis(self.leaderboard_timeout_ms)
    }
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            leaderboard_timeout_ms: 5_000,
            leaderboard_limit: 10,
        }
    }
}

impl Validate for StatsConfig {
    fn validate(&self) -> Result<(), String> {
        if self.leaderboard_timeout_ms == 0 {
            return Err("leaderboard_timeout_ms must be greater than 0".to_string());
        }
        if self.leaderboard_limit == 0 || self.leaderboard_limit > 100 {
            return Err("leaderboard_limit must be between 1 and 100".to_string());
        }
        Ok(())
    }
}
