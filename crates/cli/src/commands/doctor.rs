//! `flowhand doctor`: Diagnose credentials and plugin connectivity.

use flowhand_config::AgentConfig;
use std::path::Path;
use std::time::Duration;

const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

pub async fn run(config_path: Option<&Path>) -> anyhow::Result<()> {
    println!("🩺 flowhand Doctor: Agent Diagnostics");
    println!("=====================================\n");

    let mut issues = 0;

    let config = match super::load_config(config_path) {
        Ok(config) => {
            println!("  ✅ Config valid");
            config
        }
        Err(e) => {
            println!("  ❌ Config invalid: {e:#}");
            println!("\n  ⚠️  Cannot continue without a valid config.");
            return Ok(());
        }
    };

    if config.workflow_name.is_empty() {
        println!("  ⚠️  No workflow name, set FLOWHAND_WORKFLOW_NAME");
        issues += 1;
    } else {
        println!("  ✅ Workflow: {}", config.workflow_name);
    }

    issues += check_file("API token", config.kube.token_path.as_deref());
    issues += check_file("CA bundle", config.kube.ca_path.as_deref());
    issues += check_plugins(&config).await;

    // Summary
    println!();
    if issues == 0 {
        println!("  🎉 All checks passed!");
    } else {
        println!("  ⚠️  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}

/// Report whether an optional credential file is readable. Returns the
/// number of issues found.
fn check_file(label: &str, path: Option<&Path>) -> usize {
    let Some(path) = path else {
        println!("  ➖ {label}: not configured");
        return 0;
    };
    match std::fs::metadata(path) {
        Ok(meta) if meta.is_file() => {
            println!("  ✅ {label}: {}", path.display());
            0
        }
        Ok(_) => {
            println!("  ❌ {label}: {} is not a file", path.display());
            1
        }
        Err(e) => {
            println!("  ⚠️  {label}: {} ({e})", path.display());
            1
        }
    }
}

/// Probe each plugin address. Any HTTP answer counts as reachable.
async fn check_plugins(config: &AgentConfig) -> usize {
    if config.plugins.is_empty() {
        println!("  ➖ Plugins: none configured");
        return 0;
    }

    let client = match reqwest::Client::builder().timeout(PROBE_TIMEOUT).build() {
        Ok(client) => client,
        Err(e) => {
            println!("  ❌ Cannot build HTTP client: {e}");
            return 1;
        }
    };

    let mut issues = 0;
    for plugin in &config.plugins {
        match client.get(&plugin.address).send().await {
            Ok(response) => println!(
                "  ✅ Plugin {}: {} answered {}",
                plugin.name,
                plugin.address,
                response.status().as_u16()
            ),
            Err(e) => {
                println!("  ❌ Plugin {}: {} unreachable ({e})", plugin.name, plugin.address);
                issues += 1;
            }
        }
        if let Some(token) = &plugin.token_path {
            issues += check_file(&format!("Plugin {} token", plugin.name), Some(token));
        }
    }
    issues
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_checks() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert_eq!(check_file("token", Some(file.path())), 0);
        assert_eq!(check_file("token", None), 0);
        assert_eq!(check_file("token", Some(Path::new("/nonexistent/token"))), 1);

        let dir = tempfile::tempdir().unwrap();
        assert_eq!(check_file("token", Some(dir.path())), 1);
    }
}
