//! TokenScout - autonomous momentum scanner and trader
//!
//! # WARNING
//! - This bot trades with real money in live mode. Only use funds you can
//!   afford to lose.
//! - Most freshly trending tokens go to zero (rug pulls, abandonment).
//! - Paper results do NOT equal live results.

use anyhow::Result;
use clap::{Parser, Subcommand};

use tokenscout::cli::commands;
use tokenscout::config::Config;

/// TokenScout - autonomous momentum scanner and trader
#[derive(Parser)]
#[command(name = "scout")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the scan-and-trade loop
    Start {
        /// Force paper mode (no real trades)
        #[arg(long)]
        paper: bool,
    },

    /// Show open positions and balance
    Status,

    /// Show recent trade records
    History {
        /// Number of records to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Manually close a position
    Sell {
        /// Token mint address
        token: String,

        /// Skip confirmation prompt
        #[arg(long)]
        force: bool,
    },

    /// Show current configuration (secrets masked)
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("tokenscout=info".parse().unwrap()),
        )
        .with_target(true)
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;

    match cli.command {
        Commands::Start { paper } => commands::run_start(config, paper).await,
        Commands::Status => commands::run_status(config).await,
        Commands::History { limit } => commands::run_history(config, limit).await,
        Commands::Sell { token, force } => commands::run_sell(config, token, force).await,
        Commands::Config => {
            commands::run_show_config(&config);
            Ok(())
        }
    }
}
