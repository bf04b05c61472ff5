//! Configuration Management Module
//!
//! This module handles loading and managing configuration for the AdWatch service.
//! Configuration includes API settings, reward rates, the view verifier backend,
//! the payment provider connection and ledger persistence.

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Default config file location, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/adwatch.toml";

/// Environment variable that overrides the config file location.
pub const CONFIG_PATH_ENV: &str = "ADWATCH_CONFIG_PATH";

/// Prefix for per-key environment overrides (`ADWATCH__API__PORT=8080`).
const ENV_OVERRIDE_PREFIX: &str = "ADWATCH";

// ============================================================================
// CONFIGURATION STRUCTURES
// ============================================================================

/// Main configuration structure containing all service settings.
///
/// This structure holds configuration for:
/// - API server (host, port, CORS)
/// - Reward economics (per-second rate, exchange rate, catalog size)
/// - View verifier backend selection
/// - Payment provider connection (credentials are read from the environment)
/// - Ledger persistence and payout settlement mode
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// API server configuration (host, port, CORS settings)
    pub api: ApiConfig,
    /// Reward economics
    #[serde(default)]
    pub rewards: RewardsConfig,
    /// View verifier backend
    #[serde(default)]
    pub verifier: VerifierConfig,
    /// Payment provider connection
    #[serde(default)]
    pub provider: ProviderConfig,
    /// Ledger persistence and settlement
    #[serde(default)]
    pub ledger: LedgerConfig,
}

/// API server configuration for external communication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Host address to bind the API server to
    pub host: String,
    /// Port number to bind the API server to
    pub port: u16,
    /// Allowed CORS origins for cross-origin requests
    pub cors_origins: Vec<String>,
}

/// Reward economics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardsConfig {
    /// Reward earned per second of ad duration (primary currency, USD)
    pub reward_rate_per_second: f64,
    /// Units of payout currency (NGN) per unit of reward currency
    pub exchange_rate: f64,
    /// Number of ads generated into the catalog at start-up
    pub catalog_size: usize,
}

impl Default for RewardsConfig {
    fn default() -> Self {
        Self {
            reward_rate_per_second: 2.5,
            exchange_rate: 1500.0,
            catalog_size: 100,
        }
    }
}

/// Which verifier implementation judges ad views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifierMode {
    /// Every view is valid (demo and test deployments)
    AlwaysValid,
    /// Views are scored by an external model endpoint
    Scoring,
}

/// View verifier configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifierConfig {
    /// Verifier implementation
    pub mode: VerifierMode,
    /// Scoring endpoint URL (required when `mode = "scoring"`)
    #[serde(default)]
    pub scoring_url: Option<String>,
    /// Timeout for scoring requests in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            mode: VerifierMode::AlwaysValid,
            scoring_url: None,
            timeout_ms: default_timeout_ms(),
        }
    }
}

/// Payment provider (Flutterwave v3) configuration.
///
/// Secrets never live in the file: only the names of the environment
/// variables that hold them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Provider API base URL
    pub base_url: String,
    /// Environment variable holding the provider public key
    pub public_key_env: String,
    /// Environment variable holding the provider secret key
    pub secret_key_env: String,
    /// Environment variable holding the webhook verification hash (optional)
    #[serde(default)]
    pub webhook_hash_env: Option<String>,
    /// Narration attached to every transfer
    pub narration: String,
    /// Transfer currency
    pub currency: String,
    /// Currency debited from the merchant balance
    pub debit_currency: String,
    /// Settlement callback URL passed to the provider (optional)
    #[serde(default)]
    pub callback_url: Option<String>,
    /// Timeout for provider requests in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.flutterwave.com".to_string(),
            public_key_env: "FLUTTERWAVE_PUBLIC_KEY".to_string(),
            secret_key_env: "FLUTTERWAVE_SECRET_KEY".to_string(),
            webhook_hash_env: Some("FLUTTERWAVE_WEBHOOK_HASH".to_string()),
            narration: "AdWatch Reward Payout".to_string(),
            currency: "NGN".to_string(),
            debit_currency: "NGN".to_string(),
            callback_url: None,
            timeout_ms: default_timeout_ms(),
        }
    }
}

/// When a submitted payout counts as settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementMode {
    /// The transaction is recorded `Completed` as soon as the provider accepts it
    OnAcceptance,
    /// The transaction stays `Pending` until the provider confirms settlement
    Confirmed,
}

/// Ledger persistence and settlement configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// JSON file backing the key-value store; in-memory only when absent
    #[serde(default)]
    pub storage_path: Option<String>,
    /// Settlement mode for payouts
    pub settlement: SettlementMode,
    /// Polling interval for pending transfer reconciliation in milliseconds
    pub reconcile_interval_ms: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            storage_path: None,
            settlement: SettlementMode::OnAcceptance,
            reconcile_interval_ms: 60_000,
        }
    }
}

fn default_timeout_ms() -> u64 {
    30_000
}

// ============================================================================
// CONFIGURATION LOADING AND MANAGEMENT
// ============================================================================

impl Config {
    /// Validates value ranges and cross-field requirements.
    ///
    /// # Returns
    ///
    /// - `Ok(())` - Configuration is valid
    /// - `Err(anyhow::Error)` - A value is out of range or a required field is missing
    pub fn validate(&self) -> anyhow::Result<()> {
        let rewards = &self.rewards;
        if !rewards.reward_rate_per_second.is_finite() || rewards.reward_rate_per_second <= 0.0 {
            anyhow::bail!(
                "Configuration error: rewards.reward_rate_per_second must be positive (got {})",
                rewards.reward_rate_per_second
            );
        }
        if !rewards.exchange_rate.is_finite() || rewards.exchange_rate <= 0.0 {
            anyhow::bail!(
                "Configuration error: rewards.exchange_rate must be positive (got {})",
                rewards.exchange_rate
            );
        }
        if rewards.catalog_size == 0 {
            anyhow::bail!("Configuration error: rewards.catalog_size must be at least 1");
        }

        if self.verifier.mode == VerifierMode::Scoring {
            let scoring_url = self.verifier.scoring_url.as_deref().ok_or_else(|| {
                anyhow::anyhow!("Configuration error: verifier.scoring_url is required in scoring mode")
            })?;
            url::Url::parse(scoring_url)
                .with_context(|| format!("Configuration error: invalid verifier.scoring_url '{}'", scoring_url))?;
        }

        url::Url::parse(&self.provider.base_url).with_context(|| {
            format!("Configuration error: invalid provider.base_url '{}'", self.provider.base_url)
        })?;

        if self.ledger.reconcile_interval_ms == 0 {
            anyhow::bail!("Configuration error: ledger.reconcile_interval_ms must be positive");
        }

        Ok(())
    }

    /// Parses and validates a configuration from TOML text.
    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content).context("Failed to parse configuration TOML")?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from the TOML file.
    ///
    /// This function:
    /// 1. Resolves the path from `ADWATCH_CONFIG_PATH` (default `config/adwatch.toml`)
    /// 2. If the file exists, layers `ADWATCH__SECTION__KEY` environment overrides on top
    /// 3. Validates the result
    /// 4. If it doesn't exist, returns an error asking the user to copy the template
    ///
    /// # Returns
    ///
    /// - `Ok(Config)` - Successfully loaded and validated configuration
    /// - `Err(anyhow::Error)` - File missing, unparsable, or invalid
    pub fn load() -> anyhow::Result<Self> {
        let config_path =
            std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

        if !std::path::Path::new(&config_path).exists() {
            return Err(anyhow::anyhow!(
                "Configuration file '{}' not found. Please copy the template:\n\
                cp config/adwatch.template.toml config/adwatch.toml\n\
                Then edit config/adwatch.toml with your actual values.",
                config_path
            ));
        }

        let config: Config = ::config::Config::builder()
            .add_source(::config::File::new(&config_path, ::config::FileFormat::Toml))
            .add_source(
                ::config::Environment::with_prefix(ENV_OVERRIDE_PREFIX)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()
            .with_context(|| format!("Failed to read configuration from '{}'", config_path))?
            .try_deserialize()
            .with_context(|| format!("Failed to parse configuration from '{}'", config_path))?;

        config.validate()?;
        Ok(config)
    }

    /// Creates a default configuration suitable for local development and tests.
    #[allow(clippy::should_implement_trait)]
    pub fn default() -> Self {
        Self {
            api: ApiConfig {
                host: "127.0.0.1".to_string(),
                port: 9002,
                cors_origins: vec!["http://localhost:9002".to_string()],
            },
            rewards: RewardsConfig::default(),
            verifier: VerifierConfig::default(),
            provider: ProviderConfig::default(),
            ledger: LedgerConfig::default(),
        }
    }
}
