//! `flowhand config`: Configuration management commands.

use flowhand_config::AgentConfig;
use std::path::Path;

/// Print the resolved configuration, environment overrides applied.
pub fn show(config_path: Option<&Path>) -> anyhow::Result<()> {
    let config = super::load_config(config_path)?;
    print!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

pub fn validate(config_path: Option<&Path>) -> anyhow::Result<()> {
    println!("🔍 Validating configuration...");

    match super::load_config(config_path) {
        Ok(config) => {
            println!("   ✅ Config parsed successfully");

            let warnings = warnings(&config);
            if warnings.is_empty() {
                println!("   ✅ All checks passed");
            } else {
                println!();
                for w in &warnings {
                    println!("   ⚠️  {w}");
                }
            }

            println!();
            println!("   Workflow:   {}", display_or_unset(&config.workflow_name));
            println!("   Namespace:  {}", config.namespace);
            println!("   Workers:    {}", config.task_workers);
            println!("   API server: {}", config.kube.api_url);
            println!("   Plugins:    {}", config.plugins.len());
            for plugin in &config.plugins {
                println!("     - {} at {} ({}s)", plugin.name, plugin.address, plugin.timeout_secs);
            }
        }
        Err(e) => {
            println!("   ❌ Config error: {e:#}");
            return Err(e);
        }
    }

    Ok(())
}

/// Settings that are valid but probably not what was intended.
fn warnings(config: &AgentConfig) -> Vec<String> {
    let mut warnings = Vec::new();
    if config.workflow_name.is_empty() {
        warnings.push("No workflow name set (set FLOWHAND_WORKFLOW_NAME or pass --workflow)".into());
    }
    if config.plugins.is_empty() {
        warnings.push("No plugins configured; plugin templates will fail".into());
    }
    if config.kube.api_url.starts_with("http://") {
        warnings.push(format!("API server {} is not using TLS", config.kube.api_url));
    }
    warnings
}

fn display_or_unset(s: &str) -> &str {
    if s.is_empty() { "(unset)" } else { s }
}
