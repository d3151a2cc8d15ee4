//! Parallel Liquidation Client
//!
//! Liquidation bot for the Parallel lending markets.
//! Features:
//! - Periodic shortfall scans over every borrower with a debt snapshot
//! - Persistent FIFO queue of liquidatable borrowers
//! - Sequential `liquidate_borrow` submission with inclusion tracking
//! - Optional scan-only mode without a signing key

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use liquidation_chain::{Agent, LoansApi, ParachainClient};
use liquidation_core::{
    join_loops, load_config, BotConfig, Calculator, Liquidator, RunMode, Scanner, Scheduler,
    TaskStore,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Print startup banner
    print_banner();

    // Load environment variables
    dotenvy::dotenv().ok();

    init_tracing();

    // BOT_CONFIG file or BOT_PROFILE, then LIQUIDATION_* overrides
    let config = load_config().context("invalid configuration")?;
    config.log_config();

    info!("Starting Parallel Liquidation Client");

    let (scheduler, target) = initialize_components(&config).await?;

    let handles = scheduler.start(target.as_deref()).await;
    info!(loops = handles.len(), "Liquidation client running");

    tokio::select! {
        _ = join_loops(handles) => {
            error!("All scheduler loops ended");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
    }

    info!("Liquidation client stopped");
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,liquidation_core=debug,liquidation_chain=debug"));

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init();
    }
}

async fn initialize_components(config: &BotConfig) -> Result<(Scheduler, Option<String>)> {
    info!("Initializing components...");

    // Chain client
    let client = ParachainClient::connect(&config.chain.endpoint)
        .await
        .with_context(|| format!("failed to connect to {}", config.chain.endpoint))?;
    let api: Arc<dyn LoansApi> = Arc::new(client);

    // Task store
    let store = Arc::new(
        TaskStore::open(&config.store.path)
            .with_context(|| format!("failed to open task store {}", config.store.path))?,
    );
    info!(path = %config.store.path, queued = store.len(), "Task store ready");

    // Calculator and scanner
    let calculator = Calculator::new(api.clone(), config.free_assets());
    let scanner = Arc::new(Scanner::new(
        api.clone(),
        calculator.clone(),
        store.clone(),
        config.scanner_config(),
    ));

    // Liquidator (full mode only)
    let liquidator = match config.mode {
        RunMode::Full => {
            let agent = Agent::from_seed(&config.chain.seed).context("invalid agent seed")?;
            info!(agent = %agent.account_id(), "Liquidation agent loaded");
            Some(Arc::new(Liquidator::new(api, calculator, store, agent)))
        }
        RunMode::ScanOnly => {
            info!("Scan-only mode, liquidate loop disabled");
            None
        }
    };

    let scheduler = Scheduler::new(scanner, liquidator, &config.scheduler);

    info!("All components initialized");

    Ok((scheduler, config.liquidation.target.clone()))
}

/// Print startup banner.
fn print_banner() {
    println!(
        r#"
    ╔═╗┌─┐┬─┐┌─┐┬  ┬  ┌─┐┬
    ╠═╝├─┤├┬┘├─┤│  │  ├┤ │
    ╩  ┴ ┴┴└─┴ ┴┴─┘┴─┘└─┘┴─┘
    Liquidation Client v0.1.0
    "#
    );
}
