//! StepClaw CLI: the main entry point.
//!
//! Commands:
//! - `config`  : Validate, show, or initialise configuration
//! - `access`  : Show which tool servers a user may reach
//! - `extract` : Run action extraction over a piece of model output

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "stepclaw",
    about = "StepClaw: agent orchestration core",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file to use instead of ~/.stepclaw/config.toml
    #[arg(long, global = true, env = "STEPCLAW_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Show the tool servers a user may reach
    Access {
        /// Caller username
        #[arg(short, long)]
        user: String,

        /// Namespaced tool names to check (repeatable)
        #[arg(short, long)]
        tool: Vec<String>,
    },

    /// Extract the action from model output (reads stdin when TEXT is omitted)
    Extract {
        /// Model output text
        text: Option<String>,

        /// Available tool names, comma separated
        #[arg(short, long, value_delimiter = ',')]
        tools: Vec<String>,

        /// Treat the output as flagged complete by the model
        #[arg(long)]
        finished: bool,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Check the configuration for errors and likely mistakes
    Validate,
    /// Print the effective configuration as TOML
    Show,
    /// Print the config file path
    Path,
    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config_path = cli.config.unwrap_or_else(stepclaw_config::AppConfig::config_path);
    tracing::debug!(path = %config_path.display(), "Using config file");

    match cli.command {
        Commands::Config { action } => match action {
            ConfigAction::Validate => commands::config_cmd::validate(&config_path).await?,
            ConfigAction::Show => commands::config_cmd::show(&config_path).await?,
            ConfigAction::Path => commands::config_cmd::path(&config_path).await?,
            ConfigAction::Init { force } => commands::config_cmd::init(&config_path, force).await?,
        },
        Commands::Access { user, tool } => commands::access::run(&config_path, &user, &tool).await?,
        Commands::Extract {
            text,
            tools,
            finished,
        } => commands::extract::run(text, &tools, finished).await?,
    }

    Ok(())
}
