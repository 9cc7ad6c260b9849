//! DeFiChain Fund Consolidator - sweeps a custodial wallet to a fixed destination
//!
//! # WARNING
//! - With a wallet API key configured this moves real funds without asking.
//! - Double-check `send.to_address` before enabling signing.
//! - Never run two instances against the same wallet.

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{error, info};

// Use the library crate
use dfi_consolidator::cli::commands;
use dfi_consolidator::config::Config;

/// DeFiChain Fund Consolidator
#[derive(Parser)]
#[command(name = "consolidate")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "consolidator.toml")]
    config: String,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the wallet and warn about a low fee reserve
    Check,

    /// Run one consolidation cycle
    Send,

    /// Run consolidation cycles on the configured interval
    Run,

    /// Show current configuration (secrets masked)
    Config,

    /// Check system health (Ocean, wallet, signing, notifications)
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Parse CLI arguments
    let cli = Cli::parse();

    // Initialize tracing
    init_tracing(cli.log_format)?;

    // Load configuration
    let config = match Config::load(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {:#}", e);
            std::process::exit(1);
        }
    };

    info!(
        "Wallet {} on {}, threshold {} {}",
        config.wallet.address,
        config.wallet.network,
        config.send.threshold,
        config.send.token_symbol
    );

    // Execute command
    let result = match cli.command {
        Commands::Check => commands::check(&config).await,
        Commands::Send => match commands::send(&config).await {
            Ok(true) => Ok(()),
            Ok(false) => std::process::exit(1),
            Err(e) => Err(e),
        },
        Commands::Run => commands::run(&config).await,
        Commands::Config => commands::show_config(&config),
        Commands::Health => commands::health(&config).await,
    };

    if let Err(e) = result {
        error!("Command failed: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}

fn init_tracing(format: LogFormat) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive("dfi_consolidator=info".parse()?);

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }

    Ok(())
}
