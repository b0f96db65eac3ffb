use std::time::Duration;

use common::config::Validate;
use serde::{Deserialize, Serialize};

/// Exponential backoff for re-opening a room feed. Attempt `n` (1-based)
/// waits `base_delay_ms * multiplier^(n-1)`, capped at `max_delay_ms`.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct BackoffConfig {
    pub base_delay_ms: u64,
    pub multiplier: f64,
    pub max_delay_ms: u64,
    pub max_attempts: u32,
}

impl BackoffConfig {
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let delay = self.base_delay_ms as f64 * self.multiplier.powi(exponent);
        Duration::from_millis(delay.min(self.max_delay_ms as f64) as u64)
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 500,
            multiplier: 2.0,
            max_delay_ms: 8_000,
            max_attempts: 5,
        }
    }
}

impl Validate for BackoffConfig {
    fn validate(&self) -> Result<(), String> {
        if self.base_delay_ms == 0 {
            return Err("reconnect base_delay_ms must be greater than 0".to_string());
        }
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err("reconnect multiplier must be at least 1.0".to_string());
        }
        if self.max_delay_ms < self.base_delay_ms {
            return Err("reconnect max_delay_ms must not be below base_delay_ms".to_string());
        }
        if self.max_attempts == 0 {
            return Err("reconnect max_attempts must be greater than 0".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct SyncConfig {
    pub reconnect: BackoffConfig,
    pub available_rooms_limit: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            reconnect: BackoffConfig::default(),
            available_rooms_limit: 20,
        }
    }
}

impl Validate for SyncConfig {
    fn validate(&self) -> Result<(), String> {
        self.reconnect.validate()?;
        if self.available_rooms_limit == 0 || self.available_rooms_limit > 100 {
            return Err("available_rooms_limit must be between 1 and 100".to_string());
        }
        Ok(())
    }
}
