//! Payment Provider API Client
//!
//! Async HTTP client for the Flutterwave v3 transfers API. Provides transfer
//! initiation and transfer lookup (used to reconcile pending payouts).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

// ============================================================================
// CREDENTIALS
// ============================================================================

/// Provider API keys.
#[derive(Clone)]
pub struct ProviderCredentials {
    pub public_key: String,
    pub secret_key: String,
}

impl ProviderCredentials {
    pub fn new(public_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            public_key: public_key.into(),
            secret_key: secret_key.into(),
        }
    }

    /// Reads the keys from the named environment variables.
    ///
    /// Only the secret key authenticates transfers; a missing public key is
    /// logged and left empty.
    ///
    /// # Returns
    ///
    /// * `Some(ProviderCredentials)` - The secret key is set and non-empty
    /// * `None` - The secret key is missing or empty
    pub fn from_env(public_key_env: &str, secret_key_env: &str) -> Option<Self> {
        let read = |name: &str| std::env::var(name).ok().filter(|value| !value.trim().is_empty());
        let secret_key = read(secret_key_env)?;
        let public_key = read(public_key_env).unwrap_or_else(|| {
            warn!("{} is not set", public_key_env);
            String::new()
        });
        Some(Self::new(public_key, secret_key))
    }
}

impl fmt::Debug for ProviderCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderCredentials")
            .field("public_key", &"<redacted>")
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

// ============================================================================
// WIRE STRUCTURES
// ============================================================================

/// Transfer request body for `POST /v3/transfers`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferInstruction {
    /// Provider bank code
    pub account_bank: String,
    pub account_number: String,
    pub amount: f64,
    pub narration: String,
    pub currency: String,
    /// Merchant reference, unique per transfer
    pub reference: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback_url: Option<String>,
    pub debit_currency: String,
}

/// Response envelope used by every provider endpoint.
///
/// ```json
/// { "status": "success" | "error", "message": "...", "data": { ... } | null }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResponse<T> {
    pub status: String,
    #[serde(default)]
    pub message: String,
    pub data: Option<T>,
}

impl<T> ProviderResponse<T> {
    pub fn is_success(&self) -> bool {
        self.status == "success"
    }
}

/// Transfer record as returned by the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferData {
    pub id: u64,
    #[serde(default)]
    pub reference: Option<String>,
    /// Settlement state, e.g. `NEW`, `PENDING`, `SUCCESSFUL`, `FAILED`
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(default)]
    pub complete_message: Option<String>,
}

/// Errors talking to the provider. Provider-level rejections are not errors
/// here; they come back as a non-success [`ProviderResponse`].
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Invalid provider URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("Provider request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Invalid provider response (HTTP {status}): {body}")]
    InvalidResponse { status: u16, body: String },
}

// ============================================================================
// PROVIDER CLIENT
// ============================================================================

/// HTTP client for the payment provider.
pub struct ProviderClient {
    /// Base URL of the provider API (e.g., "https://api.flutterwave.com")
    base_url: Url,
    credentials: ProviderCredentials,
    client: reqwest::Client,
}

impl ProviderClient {
    /// Creates a provider client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Provider API base URL
    /// * `credentials` - API keys (the secret key authenticates requests)
    /// * `timeout` - Per-request timeout
    pub fn new(
        base_url: &str,
        credentials: ProviderCredentials,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: Url::parse(base_url)?,
            credentials,
            client,
        })
    }

    /// Submits a transfer.
    ///
    /// # Returns
    ///
    /// * `Ok(ProviderResponse)` - The provider's verdict, success or not
    /// * `Err(ProviderError)` - Transport failure or undecodable body
    pub async fn initiate_transfer(
        &self,
        instruction: &TransferInstruction,
    ) -> Result<ProviderResponse<TransferData>, ProviderError> {
        let url = self.base_url.join("v3/transfers")?;
        debug!("POST {} reference={}", url, instruction.reference);

        let response = self
            .client
            .post(url)
            .bearer_auth(&self.credentials.secret_key)
            .json(instruction)
            .send()
            .await?;

        Self::decode(response).await
    }

    /// Fetches a transfer by provider id.
    pub async fn get_transfer(&self, transfer_id: u64) -> Result<ProviderResponse<TransferData>, ProviderError> {
        let url = self.base_url.join(&format!("v3/transfers/{}", transfer_id))?;
        debug!("GET {}", url);

        let response = self
            .client
            .get(url)
            .bearer_auth(&self.credentials.secret_key)
            .send()
            .await?;

        Self::decode(response).await
    }

    /// The provider reports rejections with a 4xx status and the usual
    /// envelope, so the body is decoded regardless of status.
    async fn decode(response: reqwest::Response) -> Result<ProviderResponse<TransferData>, ProviderError> {
        let status = response.status().as_u16();
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|_| ProviderError::InvalidResponse { status, body })
    }
}
