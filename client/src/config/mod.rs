mod ai_config;
mod config;
mod stats_config;
mod sync_config;

pub use ai_config::AiConfig;
pub use config::{Config, get_config_manager};
pub use stats_config::StatsConfig;
pub use sync_config::{BackoffConfig, SyncConfig};
