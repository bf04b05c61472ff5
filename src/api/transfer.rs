//! Transfer endpoints
//!
//! `POST /api/transfer` forwards a payout straight to the provider and answers
//! with the `{status, message, transferId}` / `{message}` shapes the wallet
//! client already speaks. `POST /api/transfer/callback` receives the
//! provider's settlement webhook.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};
use warp::http::StatusCode;
use warp::hyper::body::Bytes;
use warp::reply::{Json, WithStatus};

use super::generic::{error_reply, success_reply};
use crate::app::AppState;
use crate::payout::{PayoutError, PayoutMethod, TransferOutcome, METHOD_BANK};
use crate::provider_client::TransferData;

/// Header carrying the webhook verification hash.
pub const WEBHOOK_HASH_HEADER: &str = "verif-hash";

pub const TRANSFER_INITIATED_MESSAGE: &str = "Transfer initiated successfully.";

// ============================================================================
// REQUEST/RESPONSE STRUCTURES
// ============================================================================

/// Body of `POST /api/transfer`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(default)]
    pub bank_details: Option<TransferBankDetails>,
}

/// Bank details as the wallet client sends them. Only the account number and
/// bank name are needed to route a transfer.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferBankDetails {
    #[serde(default)]
    pub account_holder: String,
    pub account_number: String,
    pub bank_name: String,
    #[serde(default)]
    pub payment_method: Option<String>,
}

impl From<TransferBankDetails> for PayoutMethod {
    fn from(details: TransferBankDetails) -> Self {
        PayoutMethod {
            account_holder: details.account_holder,
            account_number: details.account_number,
            bank_name: details.bank_name,
            payment_method: details.payment_method.unwrap_or_else(|| METHOD_BANK.to_string()),
        }
    }
}

/// Success body of `POST /api/transfer`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferResponse {
    pub status: String,
    pub message: String,
    pub transfer_id: u64,
}

/// Failure body of `POST /api/transfer`.
#[derive(Debug, Serialize, Deserialize)]
pub struct TransferErrorResponse {
    pub message: String,
}

/// Provider webhook payload.
#[derive(Debug, Deserialize)]
pub struct TransferWebhook {
    #[serde(default)]
    pub event: String,
    pub data: TransferData,
}

/// Compares the presented webhook hash with the expected one in constant time.
pub fn webhook_hash_matches(presented: Option<&str>, expected: &str) -> bool {
    let Some(presented) = presented else {
        return false;
    };
    if presented.len() != expected.len() {
        return false;
    }
    presented
        .bytes()
        .zip(expected.bytes())
        .fold(0u8, |diff, (a, b)| diff | (a ^ b))
        == 0
}

fn transfer_error(err: &PayoutError) -> WithStatus<Json> {
    warp::reply::with_status(
        warp::reply::json(&TransferErrorResponse {
            message: err.to_string(),
        }),
        err.status_code(),
    )
}

// ============================================================================
// API HANDLERS
// ============================================================================

/// Handler for POST /api/transfer.
///
/// Credentials are checked before the body is looked at, so a misconfigured
/// server answers 500 for every request.
pub async fn transfer_handler(body: Bytes, state: Arc<AppState>) -> Result<WithStatus<Json>, warp::Rejection> {
    if let Err(e) = state.payouts.ensure_configured() {
        warn!("Transfer refused: {}", e);
        return Ok(transfer_error(&e));
    }

    let request = match serde_json::from_slice::<TransferRequest>(&body) {
        Ok(request) => request,
        Err(e) => {
            debug!("Unreadable transfer request: {}", e);
            return Ok(transfer_error(&PayoutError::MissingFields));
        }
    };

    let (amount, details) = match (request.amount, request.bank_details) {
        (Some(amount), Some(details)) if amount.is_finite() && amount > 0.0 => (amount, details),
        _ => return Ok(transfer_error(&PayoutError::MissingFields)),
    };

    let method = PayoutMethod::from(details);
    match state.payouts.initiate(amount, &method).await {
        Ok(receipt) => {
            info!("Transfer {} initiated ({})", receipt.transfer_id, receipt.reference);
            Ok(warp::reply::with_status(
                warp::reply::json(&TransferResponse {
                    status: "success".to_string(),
                    message: TRANSFER_INITIATED_MESSAGE.to_string(),
                    transfer_id: receipt.transfer_id,
                }),
                StatusCode::OK,
            ))
        }
        Err(e) => Ok(transfer_error(&e)),
    }
}

/// Handler for POST /api/transfer/callback.
///
/// When a webhook hash is configured the `verif-hash` header must match it.
/// Unknown references are acknowledged so the provider stops retrying.
pub async fn transfer_callback_handler(
    hash: Option<String>,
    body: Bytes,
    state: Arc<AppState>,
) -> Result<WithStatus<Json>, warp::Rejection> {
    if let Some(expected) = &state.webhook_hash {
        if !webhook_hash_matches(hash.as_deref(), expected) {
            warn!("Rejected transfer webhook with bad {} header", WEBHOOK_HASH_HEADER);
            return Ok(error_reply("Invalid webhook signature", StatusCode::UNAUTHORIZED));
        }
    }

    let webhook = match serde_json::from_slice::<TransferWebhook>(&body) {
        Ok(webhook) => webhook,
        Err(e) => return Ok(error_reply(format!("Invalid JSON: {}", e), StatusCode::BAD_REQUEST)),
    };

    let Some(reference) = webhook.data.reference.as_deref() else {
        return Ok(error_reply("Webhook is missing the transfer reference", StatusCode::BAD_REQUEST));
    };

    let outcome = TransferOutcome::from_provider_status(
        webhook.data.status.as_deref().unwrap_or_default(),
        webhook.data.complete_message.as_deref(),
    );
    debug!("Webhook {} for {}: {:?}", webhook.event, reference, outcome);

    let settled = state.ledgers.settle(reference, &outcome).await;
    Ok(success_reply(settled, StatusCode::OK))
}
