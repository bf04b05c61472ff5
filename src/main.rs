//! AdWatch Service
//!
//! Serves the ad catalog, tracks watch sessions, verifies views and pays
//! rewards out to users' bank accounts or e-wallets.
//!
//! ## Overview
//!
//! The service:
//! 1. Generates the ad catalog from configuration
//! 2. Opens the ledger store and loads persisted ledgers
//! 3. Reconciles pending payouts with the provider in the background
//! 4. Serves the REST API until shutdown
//!
//! ## Secrets
//!
//! Provider keys are read from the environment variables named in the
//! `[provider]` section, never from the config file. Without a secret key
//! the service still runs but every payout fails with a configuration error.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use adwatch::api::ApiServer;
use adwatch::config::{Config, CONFIG_PATH_ENV};
use adwatch::provider_client::ProviderCredentials;
use adwatch::AppState;

// ============================================================================
// MAIN APPLICATION ENTRY POINT
// ============================================================================

/// Main application entry point that initializes and runs the AdWatch service.
///
/// This function:
/// 1. Initializes logging and tracing
/// 2. Loads configuration from TOML file
/// 3. Reads provider secrets from the environment
/// 4. Builds the service state and starts background maintenance
/// 5. Runs the API server until shutdown
#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured logging for debugging and monitoring
    tracing_subscriber::fmt::init();

    info!("Starting AdWatch Service");

    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|arg| arg == "--help" || arg == "-h") {
        println!("AdWatch Service");
        println!();
        println!("Usage: adwatch [OPTIONS]");
        println!();
        println!("Options:");
        println!("  --config <path>   Use custom config file path");
        println!("  --help, -h        Show this help message");
        println!();
        println!("Environment variables:");
        println!("  ADWATCH_CONFIG_PATH          Path to config file (overridden by --config)");
        println!("  ADWATCH__<SECTION>__<KEY>    Override a single config value");
        println!("  FLUTTERWAVE_SECRET_KEY       Provider secret key (name configurable)");
        println!("  FLUTTERWAVE_PUBLIC_KEY       Provider public key (name configurable)");
        println!("  FLUTTERWAVE_WEBHOOK_HASH     Expected webhook verif-hash (name configurable)");
        return Ok(());
    }

    let mut config_path = None;
    for (i, arg) in args.iter().enumerate() {
        if arg == "--config" && i + 1 < args.len() {
            config_path = Some(args[i + 1].clone());
            break;
        }
    }

    if let Some(path) = config_path {
        std::env::set_var(CONFIG_PATH_ENV, &path);
        info!("Using custom config: {}", path);
    }

    // Load configuration from config file (or ADWATCH_CONFIG_PATH env var)
    let config = Config::load()?;
    info!("Configuration loaded successfully");

    let credentials = ProviderCredentials::from_env(
        &config.provider.public_key_env,
        &config.provider.secret_key_env,
    );
    let webhook_hash = config
        .provider
        .webhook_hash_env
        .as_deref()
        .and_then(|name| std::env::var(name).ok())
        .filter(|hash| !hash.trim().is_empty());

    let state = Arc::new(AppState::new(&config, credentials, webhook_hash)?);
    let ledgers = state.ledgers.load_persisted().await;
    info!("Loaded {} persisted ledgers", ledgers);

    // Start background maintenance (payout reconciliation, session pruning)
    let interval = Duration::from_millis(config.ledger.reconcile_interval_ms);
    let state_for_background = state.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            state_for_background.run_maintenance().await;
        }
    });

    let api_server = ApiServer::new(config, state);

    // Run the service (this blocks until shutdown)
    api_server.run().await?;

    Ok(())
}
