//! Reflace CLI — the main entry point.
//!
//! Commands:
//! - `init`     — Write a default `reflace.toml`
//! - `config`   — Validate and print the resolved configuration
//! - `show`     — Render one task's saved trajectory
//! - `summary`  — Print a saved performance report
//! - `pricing`  — List model prices used for cost estimates

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "reflace",
    about = "Reflace — reflective LLM agent experiments",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the experiment config file
    #[arg(short, long, global = true, env = "REFLACE_CONFIG", default_value = "reflace.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Validate and print the resolved configuration
    Config,

    /// Render a task's saved trajectory
    Show {
        /// Task id to display
        task_id: String,

        /// Trajectory file (defaults to the configured experiment's)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Print a saved performance report
    Summary {
        /// Report file (defaults to the configured experiment's)
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Print the raw JSON document
        #[arg(long)]
        json: bool,
    },

    /// List model pricing
    Pricing,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .init();
    }

    match cli.command {
        Commands::Init { force } => commands::init::run(&cli.config, force).await?,
        Commands::Config => commands::config_cmd::validate(&cli.config).await?,
        Commands::Show { task_id, file } => {
            commands::show::run(&cli.config, &task_id, file).await?
        }
        Commands::Summary { file, json } => commands::summary::run(&cli.config, file, json).await?,
        Commands::Pricing => commands::pricing::run().await?,
    }

    Ok(())
}
