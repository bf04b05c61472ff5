//! Payout Initiator
//!
//! Translates a payout request (amount in the payout currency plus a payout
//! method) into a provider transfer. The bank name is mapped to a provider
//! code through a static table; unknown banks are refused before any network
//! call. Provider verdicts are passed through verbatim; nothing is retried.

pub mod bank_codes;
pub mod method;

use chrono::Utc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;
use warp::http::StatusCode;

use crate::config::ProviderConfig;
use crate::provider_client::{ProviderClient, ProviderCredentials, TransferInstruction};

pub use bank_codes::{bank_code, BANK_CODES, E_WALLET_PROVIDERS};
pub use method::{PayoutMethod, PayoutMethodError, METHOD_BANK, METHOD_EWALLET};

/// Prefix of every transfer reference.
pub const REFERENCE_PREFIX: &str = "adwatch_payout_";

// ============================================================================
// RESULT AND ERROR TYPES
// ============================================================================

/// Errors raised while initiating a payout.
#[derive(Debug, Error)]
pub enum PayoutError {
    #[error("Server configuration error: Flutterwave secret key is missing.")]
    MissingCredentials,
    #[error("Missing amount or bank details")]
    MissingFields,
    #[error("Bank '{0}' is not supported.")]
    UnsupportedBank(String),
    /// Provider refused the transfer; carries the provider's own message
    #[error("{0}")]
    Rejected(String),
    #[error("An unexpected error occurred.")]
    Unexpected { detail: String },
}

impl PayoutError {
    /// HTTP status for this error on the transfer endpoint.
    pub fn status_code(&self) -> StatusCode {
        match self {
            PayoutError::MissingCredentials | PayoutError::Unexpected { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            PayoutError::MissingFields | PayoutError::UnsupportedBank(_) | PayoutError::Rejected(_) => {
                StatusCode::BAD_REQUEST
            }
        }
    }
}

/// A transfer the provider accepted.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferReceipt {
    /// Provider transfer id
    pub transfer_id: u64,
    /// Merchant reference sent with the transfer
    pub reference: String,
    /// Provider settlement status at acceptance time, if reported
    pub provider_status: Option<String>,
}

/// Settlement verdict for a submitted transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    /// Funds delivered
    Successful,
    /// Provider gave up on the transfer
    Failed(String),
    /// Not terminal yet
    InFlight,
}

impl TransferOutcome {
    /// Maps a provider transfer status (`SUCCESSFUL`, `FAILED`, `NEW`, ...).
    pub fn from_provider_status(status: &str, message: Option<&str>) -> Self {
        match status.to_ascii_uppercase().as_str() {
            "SUCCESSFUL" | "SUCCESS" | "COMPLETED" => TransferOutcome::Successful,
            "FAILED" | "CANCELLED" | "REVERSED" => TransferOutcome::Failed(
                message
                    .filter(|m| !m.is_empty())
                    .unwrap_or("Transfer failed at the provider")
                    .to_string(),
            ),
            _ => TransferOutcome::InFlight,
        }
    }
}

/// Generates a transfer reference: millisecond timestamp plus a random
/// suffix, so two payouts in the same millisecond still differ.
pub fn generate_reference() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}{}_{}", REFERENCE_PREFIX, Utc::now().timestamp_millis(), &suffix[..8])
}

// ============================================================================
// PAYOUT INITIATOR
// ============================================================================

/// Submits payouts to the provider.
pub struct PayoutInitiator {
    /// None when the provider credentials are not configured
    client: Option<ProviderClient>,
    narration: String,
    currency: String,
    debit_currency: String,
    callback_url: Option<String>,
}

impl PayoutInitiator {
    /// Creates an initiator.
    ///
    /// Missing credentials are not an error here: the service still runs and
    /// every payout fails with [`PayoutError::MissingCredentials`].
    pub fn new(config: &ProviderConfig, credentials: Option<ProviderCredentials>) -> anyhow::Result<Self> {
        let client = match credentials {
            Some(credentials) => Some(ProviderClient::new(
                &config.base_url,
                credentials,
                Duration::from_millis(config.timeout_ms),
            )?),
            None => {
                warn!(
                    "Provider credentials ({} / {}) not set; payouts are disabled",
                    config.public_key_env, config.secret_key_env
                );
                None
            }
        };

        Ok(Self {
            client,
            narration: config.narration.clone(),
            currency: config.currency.clone(),
            debit_currency: config.debit_currency.clone(),
            callback_url: config.callback_url.clone(),
        })
    }

    pub fn is_configured(&self) -> bool {
        self.client.is_some()
    }

    /// Returns the provider client or the configuration error.
    pub fn ensure_configured(&self) -> Result<&ProviderClient, PayoutError> {
        self.client.as_ref().ok_or(PayoutError::MissingCredentials)
    }

    /// Initiates a transfer of `amount` (payout currency) to `method`.
    ///
    /// Checks run in order: credentials, amount, bank code. Only after all of
    /// them pass is the provider called.
    ///
    /// # Returns
    ///
    /// * `Ok(TransferReceipt)` - Provider accepted the transfer
    /// * `Err(PayoutError)` - Refused locally, rejected by the provider, or failed in transit
    pub async fn initiate(&self, amount: f64, method: &PayoutMethod) -> Result<TransferReceipt, PayoutError> {
        let client = self.ensure_configured()?;

        if !amount.is_finite() || amount <= 0.0 {
            return Err(PayoutError::MissingFields);
        }

        let account_bank = bank_code(&method.bank_name)
            .ok_or_else(|| PayoutError::UnsupportedBank(method.bank_name.clone()))?;

        let instruction = TransferInstruction {
            account_bank: account_bank.to_string(),
            account_number: method.account_number.clone(),
            amount,
            narration: self.narration.clone(),
            currency: self.currency.clone(),
            reference: generate_reference(),
            callback_url: self.callback_url.clone(),
            debit_currency: self.debit_currency.clone(),
        };

        let response = client.initiate_transfer(&instruction).await.map_err(|e| {
            error!("Transfer {} failed in transit: {}", instruction.reference, e);
            PayoutError::Unexpected { detail: e.to_string() }
        })?;

        if !response.is_success() {
            warn!(
                "Provider rejected transfer {}: {}",
                instruction.reference, response.message
            );
            let message = if response.message.is_empty() {
                "Failed to initiate transfer.".to_string()
            } else {
                response.message
            };
            return Err(PayoutError::Rejected(message));
        }

        let data = response.data.ok_or_else(|| PayoutError::Unexpected {
            detail: format!("Provider accepted {} without transfer data", instruction.reference),
        })?;

        info!(
            "Transfer {} accepted: id={} amount={} {} bank={}",
            instruction.reference, data.id, amount, self.currency, method.bank_name
        );

        Ok(TransferReceipt {
            transfer_id: data.id,
            reference: instruction.reference,
            provider_status: data.status,
        })
    }

    /// Looks up the settlement state of a submitted transfer.
    pub async fn transfer_status(&self, transfer_id: u64) -> Result<TransferOutcome, PayoutError> {
        let client = self.ensure_configured()?;
        let response = client
            .get_transfer(transfer_id)
            .await
            .map_err(|e| PayoutError::Unexpected { detail: e.to_string() })?;

        if !response.is_success() {
            return Err(PayoutError::Rejected(response.message));
        }

        let data = response.data.ok_or_else(|| PayoutError::Unexpected {
            detail: format!("Transfer {} lookup returned no data", transfer_id),
        })?;

        Ok(TransferOutcome::from_provider_status(
            data.status.as_deref().unwrap_or_default(),
            data.complete_message.as_deref(),
        ))
    }
}
