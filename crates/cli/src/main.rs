//! flowhand CLI: the main entry point.
//!
//! Commands:
//! - `agent`: Run the task agent for one workflow
//! - `config`: Show or validate the resolved configuration
//! - `doctor`: Check credentials and plugin reachability

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "flowhand",
    about = "flowhand: workflow task agent for HTTP and plugin templates",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Config file (defaults to $FLOWHAND_CONFIG or /etc/flowhand/agent.toml)
    #[arg(short, long, global = true, env = "FLOWHAND_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the agent until its task set is deleted or completed
    Agent {
        /// Workflow (and task set) name
        #[arg(short, long)]
        workflow: Option<String>,

        /// Namespace of the task set
        #[arg(short, long)]
        namespace: Option<String>,

        /// Number of task workers
        #[arg(long)]
        workers: Option<usize>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Diagnose credentials and plugin connectivity
    Doctor,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the resolved configuration as TOML
    Show,
    /// Validate the configuration
    Validate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .init();
    }

    let config = cli.config.as_deref();
    match cli.command {
        Commands::Agent {
            workflow,
            namespace,
            workers,
        } => {
            commands::agent::run(
                config,
                commands::agent::Overrides {
                    workflow,
                    namespace,
                    workers,
                },
            )
            .await?
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_cmd::show(config)?,
            ConfigAction::Validate => commands::config_cmd::validate(config)?,
        },
        Commands::Doctor => commands::doctor::run(config).await?,
    }

    Ok(())
}
