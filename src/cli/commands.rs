//! CLI command implementations

use anyhow::Result;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::consolidation::plan::is_reserve_low;
use crate::consolidation::{Collaborators, ConsolidationEngine, CycleOutcome, CycleScheduler};
use crate::ledger::{AddressValidator, OceanClient, Signer, WalletApiClient};
use crate::notify::{LogNotifier, Notifier, TelegramNotifier};

/// Collaborators wired from configuration
struct Wiring {
    engine: Arc<ConsolidationEngine>,
    ocean: Arc<OceanClient>,
    wallet_api: Arc<WalletApiClient>,
    telegram_enabled: bool,
}

fn wire(config: &Config) -> Result<Wiring> {
    let settings = config.consolidation_settings();

    let ocean = Arc::new(OceanClient::new(&config.ocean, config.wallet.network)?);
    let wallet_api = Arc::new(WalletApiClient::new(
        &config.wallet_api,
        &config.ocean,
        settings.wallet_address.clone(),
        ocean.clone(),
    ));
    let validator = Arc::new(AddressValidator::new(
        settings.wallet_address.clone(),
        settings.destination.clone(),
        config.wallet.network,
        ocean.clone(),
    ));

    let telegram = TelegramNotifier::from_config(&config.telegram);
    let telegram_enabled = telegram.is_some();
    let notifier: Arc<dyn Notifier> = match telegram {
        Some(telegram) => Arc::new(telegram),
        None => {
            warn!("Telegram not configured - operator messages go to the log only");
            Arc::new(LogNotifier)
        }
    };

    let engine = ConsolidationEngine::new(
        settings,
        Collaborators {
            balances: ocean.clone(),
            validator,
            builder: wallet_api.clone(),
            signer: wallet_api.clone(),
            notifier,
        },
    );

    Ok(Wiring {
        engine: Arc::new(engine),
        ocean,
        wallet_api,
        telegram_enabled,
    })
}

/// Run the safety check once
pub async fn check(config: &Config) -> Result<()> {
    let wiring = wire(config)?;

    if wiring.engine.perform_safety_check().await? {
        println!("Safety check passed for {}", config.wallet.address);
    } else {
        println!("Safety check FAILED for {} (see log)", config.wallet.address);
    }

    Ok(())
}

/// Run one consolidation cycle; returns whether it completed
pub async fn send(config: &Config) -> Result<bool> {
    let wiring = wire(config)?;

    if !wiring.engine.perform_safety_check().await? {
        println!("Safety check failed, not sending");
        return Ok(false);
    }

    let outcome = wiring.engine.run_cycle().await?;
    println!("Cycle outcome: {}", outcome);

    if let CycleOutcome::HandedOff { chain } = &outcome {
        for tx in chain.transactions() {
            println!("  {} {:?} {}", tx.id, tx.kind, tx.amount);
        }
    }

    Ok(outcome.completed())
}

/// Run the scheduler until Ctrl-C
pub async fn run(config: &Config) -> Result<()> {
    let wiring = wire(config)?;
    let mut scheduler = CycleScheduler::new(wiring.engine.clone(), &config.schedule);

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Ctrl-C received, stopping after the current cycle");
                let _ = shutdown_tx.send(());
            }
            Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
        }
    });

    scheduler.start(shutdown_rx).await;
    Ok(())
}

/// Print the masked configuration
pub fn show_config(config: &Config) -> Result<()> {
    println!("{}", config.masked_display());
    Ok(())
}

/// Check system health
pub async fn health(config: &Config) -> Result<()> {
    println!("\n=== SYSTEM HEALTH CHECK ===\n");

    let wiring = wire(config)?;
    let mut all_healthy = true;

    print!("Ocean API... ");
    match wiring.ocean.ping().await {
        Ok(latency) => println!("OK ({}ms)", latency.as_millis()),
        Err(e) => {
            println!("FAILED: {}", e);
            all_healthy = false;
        }
    }

    print!("Wallet... ");
    match wiring.engine.wallet_status().await {
        Ok(Some(reserve)) if is_reserve_low(reserve) => {
            println!("LOW RESERVE ({}, {} DFI)", config.wallet.address, reserve);
            all_healthy = false;
        }
        Ok(Some(reserve)) => println!("OK ({}, {} DFI)", config.wallet.address, reserve),
        Ok(None) => {
            println!("INVALID ({})", config.wallet.address);
            all_healthy = false;
        }
        Err(e) => {
            println!("FAILED: {}", e);
            all_healthy = false;
        }
    }

    print!("Destination... ");
    match config.destination() {
        Some(destination) => println!("{}", destination),
        None => println!("NOT SET (cycles are no-ops)"),
    }

    print!("Signing... ");
    if wiring.wallet_api.has_local_signing_authority() {
        println!("LOCAL (wallet API key configured)");
    } else {
        println!("HAND-OFF (no wallet API key)");
    }

    print!("Notifications... ");
    if wiring.telegram_enabled {
        println!("TELEGRAM");
    } else {
        println!("LOG ONLY");
    }

    println!();
    if all_healthy {
        println!("All systems healthy");
    } else {
        println!("Some checks FAILED");
    }

    Ok(())
}
