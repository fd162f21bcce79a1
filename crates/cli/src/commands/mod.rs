pub mod agent;
pub mod config_cmd;
pub mod doctor;

use anyhow::Context;
use flowhand_config::AgentConfig;
use std::path::Path;

/// Load the config file (or defaults when it is absent) and apply
/// environment overrides, without validating.
pub fn read_config(path: Option<&Path>) -> anyhow::Result<AgentConfig> {
    let path = path
        .map(Path::to_path_buf)
        .unwrap_or_else(AgentConfig::config_path);
    let mut config = AgentConfig::load_from(&path)
        .with_context(|| format!("loading {}", path.display()))?;
    config.apply_env(|key| std::env::var(key).ok());
    Ok(config)
}

/// [`read_config`], then validate.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<AgentConfig> {
    let config = read_config(path)?;
    config.validate()?;
    Ok(config)
}
