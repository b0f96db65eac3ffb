use common::config::{ConfigManager, FileContentConfigProvider, Validate, YamlConfigSerializer};
use serde::{Deserialize, Serialize};

use super::{AiConfig, StatsConfig, SyncConfig};

const CONFIG_FILE_NAME: &str = "mini_games_client_config.yaml";

fn get_config_path() -> String {
    if let Ok(exe_path) = std::env::current_exe()
        && let Some(exe_dir) = exe_path.parent()
    {
        return exe_dir.join(CONFIG_FILE_NAME).to_string_lossy().into_owned();
    }
    CONFIG_FILE_NAME.to_string()
}

pub fn get_config_manager() -> ConfigManager<FileContentConfigProvider, Config, YamlConfigSerializer>
{
    ConfigManager::from_yaml_file(&get_config_path())
}

#[derive(Debug, PartialEq, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    pub sync: SyncConfig,
    pub ai: AiConfig,
    pub stats: StatsConfig,
    pub player_id: Option<String>,
}

impl Validate for Config {
    fn validate(&self) -> Result<(), String> {
        self.sync.validate()?;
        self.ai.validate()?;
        self.stats.validate()?;
        if let Some(player_id) = &self.player_id
            && player_id.trim().is_empty()
        {
            return Err("player_id must not be blank".to_string());
        }
        Ok(())
    }
}
