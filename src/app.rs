//! Shared service state
//!
//! Wires the catalog, watch sessions, verifier, payout initiator and ledgers
//! together from configuration. The API handlers and the background
//! maintenance loop share one [`AppState`].

use anyhow::Context;
use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info};

use crate::catalog::AdCatalog;
use crate::config::Config;
use crate::ledger::{LedgerBook, LedgerSettings};
use crate::payout::PayoutInitiator;
use crate::provider_client::ProviderCredentials;
use crate::storage::KvStore;
use crate::verifier::ViewVerifier;
use crate::viewer::ViewSessionStore;

/// Finished watch sessions older than this are dropped by [`AppState::run_maintenance`].
pub const SESSION_RETENTION_HOURS: i64 = 24;

pub struct AppState {
    pub catalog: AdCatalog,
    pub sessions: ViewSessionStore,
    pub verifier: ViewVerifier,
    pub payouts: Arc<PayoutInitiator>,
    pub ledgers: LedgerBook,
    /// Payout currency units per reward unit
    pub exchange_rate: f64,
    /// Expected `verif-hash` header on provider webhooks
    pub webhook_hash: Option<String>,
}

impl AppState {
    /// Builds the service state.
    ///
    /// # Arguments
    ///
    /// * `config` - Validated service configuration
    /// * `credentials` - Provider API keys; `None` disables payouts
    /// * `webhook_hash` - Expected webhook hash; `None` skips the check
    ///
    /// # Returns
    ///
    /// * `Ok(AppState)` - State ready to serve
    /// * `Err(anyhow::Error)` - Store unreadable or a client could not be built
    pub fn new(
        config: &Config,
        credentials: Option<ProviderCredentials>,
        webhook_hash: Option<String>,
    ) -> anyhow::Result<Self> {
        let store = match &config.ledger.storage_path {
            Some(path) => KvStore::open(path)
                .with_context(|| format!("Failed to open ledger store '{}'", path))?,
            None => {
                info!("No ledger.storage_path configured; ledger state is kept in memory");
                KvStore::in_memory()
            }
        };

        let payouts = Arc::new(PayoutInitiator::new(&config.provider, credentials)?);
        let ledgers = LedgerBook::new(
            Arc::new(store),
            payouts.clone(),
            LedgerSettings {
                exchange_rate: config.rewards.exchange_rate,
                settlement: config.ledger.settlement,
            },
        );

        let catalog = AdCatalog::generate(
            config.rewards.catalog_size,
            config.rewards.reward_rate_per_second,
        );
        info!("Generated catalog of {} ads", catalog.len());

        Ok(Self {
            catalog,
            sessions: ViewSessionStore::new(),
            verifier: ViewVerifier::from_config(&config.verifier)?,
            payouts,
            ledgers,
            exchange_rate: config.rewards.exchange_rate,
            webhook_hash,
        })
    }

    /// One pass of background upkeep: reconcile pending payouts and drop
    /// old finished sessions.
    pub async fn run_maintenance(&self) {
        if self.payouts.is_configured() {
            self.ledgers.reconcile_pending().await;
        }
        let pruned = self
            .sessions
            .prune(Utc::now(), Duration::hours(SESSION_RETENTION_HOURS))
            .await;
        if pruned > 0 {
            debug!("Pruned {} finished watch sessions", pruned);
        }
    }
}
