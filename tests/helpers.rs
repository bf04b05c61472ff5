//! Shared test helpers
//!
//! The module is organized into several categories:
//! - **Constants**: Dummy users, accounts and provider values
//! - **Configuration Builders**: Test configurations, with or without a mock provider
//! - **Provider Mocks**: Flutterwave response bodies and mounted mocks

#![allow(dead_code)]

use adwatch::config::{Config, SettlementMode};
use adwatch::ledger::{Ledger, LedgerSettings};
use adwatch::payout::{PayoutInitiator, PayoutMethod, METHOD_BANK, METHOD_EWALLET};
use adwatch::provider_client::ProviderCredentials;
use adwatch::storage::KvStore;
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ============================================================================
// CONSTANTS
// ============================================================================

// -------------------------------- USERS ---------------------------------

/// Dummy user id
pub const DUMMY_USER_ID: &str = "user-0001";

/// Second dummy user id
pub const DUMMY_OTHER_USER_ID: &str = "user-0002";

/// Dummy account holder name
pub const DUMMY_ACCOUNT_HOLDER: &str = "Ada Obi";

/// Dummy NUBAN account number (10 digits)
pub const DUMMY_ACCOUNT_NUMBER: &str = "0123456789";

/// Bank present in the bank-code table
pub const DUMMY_BANK_NAME: &str = "Access Bank";

/// Provider code of [`DUMMY_BANK_NAME`]
pub const DUMMY_BANK_CODE: &str = "044";

/// Bank absent from the bank-code table
pub const DUMMY_UNSUPPORTED_BANK: &str = "Bank of Atlantis";

// ------------------------------- PROVIDER -------------------------------

/// Dummy provider public key
pub const DUMMY_PUBLIC_KEY: &str = "FLWPUBK_TEST-00000000000000000000000000000000-X";

/// Dummy provider secret key
pub const DUMMY_SECRET_KEY: &str = "FLWSECK_TEST-00000000000000000000000000000000-X";

/// Dummy provider transfer id
pub const DUMMY_TRANSFER_ID: u64 = 426_001;

/// Dummy webhook verification hash
pub const DUMMY_WEBHOOK_HASH: &str = "adwatch-webhook-hash";

/// Exchange rate used by test configurations (NGN per USD)
pub const TEST_EXCHANGE_RATE: f64 = 1500.0;

// ============================================================================
// CONFIGURATION BUILDERS
// ============================================================================

/// Default configuration with an always-valid verifier and in-memory ledger.
pub fn build_test_config() -> Config {
    Config::default()
}

/// Test configuration pointing the provider at `base_url`.
pub fn build_test_config_with_provider(base_url: &str) -> Config {
    let mut config = Config::default();
    config.provider.base_url = base_url.to_string();
    config.provider.timeout_ms = 5_000;
    config
}

pub fn dummy_credentials() -> ProviderCredentials {
    ProviderCredentials::new(DUMMY_PUBLIC_KEY, DUMMY_SECRET_KEY)
}

/// Bank payout method at [`DUMMY_BANK_NAME`].
pub fn bank_method() -> PayoutMethod {
    PayoutMethod {
        account_holder: DUMMY_ACCOUNT_HOLDER.to_string(),
        account_number: DUMMY_ACCOUNT_NUMBER.to_string(),
        bank_name: DUMMY_BANK_NAME.to_string(),
        payment_method: METHOD_BANK.to_string(),
    }
}

/// E-wallet payout method at Opay.
pub fn ewallet_method() -> PayoutMethod {
    PayoutMethod {
        account_holder: DUMMY_ACCOUNT_HOLDER.to_string(),
        account_number: "8012345678".to_string(),
        bank_name: "Opay".to_string(),
        payment_method: METHOD_EWALLET.to_string(),
    }
}

/// Payout initiator talking to `base_url` with dummy credentials.
pub fn test_initiator(base_url: &str) -> Arc<PayoutInitiator> {
    let config = build_test_config_with_provider(base_url);
    Arc::new(PayoutInitiator::new(&config.provider, Some(dummy_credentials())).unwrap())
}

/// Payout initiator without credentials.
pub fn unconfigured_initiator() -> Arc<PayoutInitiator> {
    let config = build_test_config();
    Arc::new(PayoutInitiator::new(&config.provider, None).unwrap())
}

pub fn ledger_settings(settlement: SettlementMode) -> LedgerSettings {
    LedgerSettings {
        exchange_rate: TEST_EXCHANGE_RATE,
        settlement,
    }
}

/// Loads `DUMMY_USER_ID`'s ledger from `store`, paying out through `base_url`.
pub async fn test_ledger(store: Arc<KvStore>, base_url: &str, settlement: SettlementMode) -> Ledger {
    Ledger::load(
        DUMMY_USER_ID,
        store,
        test_initiator(base_url),
        ledger_settings(settlement),
    )
    .await
}

/// Unique path under the system temp directory.
pub fn temp_path(name: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("adwatch-test-{}-{}", uuid::Uuid::new_v4(), name))
}

// ============================================================================
// PROVIDER MOCKS
// ============================================================================

/// Body of an accepted `POST /v3/transfers`.
pub fn transfer_accepted_body(transfer_id: u64) -> serde_json::Value {
    json!({
        "status": "success",
        "message": "Transfer Queued Successfully",
        "data": {
            "id": transfer_id,
            "account_number": DUMMY_ACCOUNT_NUMBER,
            "bank_code": DUMMY_BANK_CODE,
            "currency": "NGN",
            "reference": "adwatch_payout_0",
            "status": "NEW",
            "complete_message": ""
        }
    })
}

/// Body of a rejected provider call.
pub fn provider_error_body(message: &str) -> serde_json::Value {
    json!({
        "status": "error",
        "message": message,
        "data": null
    })
}

/// Body of `GET /v3/transfers/:id`.
pub fn transfer_lookup_body(transfer_id: u64, status: &str, complete_message: &str) -> serde_json::Value {
    json!({
        "status": "success",
        "message": "Transfer fetched",
        "data": {
            "id": transfer_id,
            "status": status,
            "complete_message": complete_message
        }
    })
}

/// Mounts an accepting `POST /v3/transfers`.
pub async fn mount_transfer_accepted(server: &MockServer, transfer_id: u64) {
    Mock::given(method("POST"))
        .and(path("/v3/transfers"))
        .respond_with(ResponseTemplate::new(200).set_body_json(transfer_accepted_body(transfer_id)))
        .mount(server)
        .await;
}

/// Mounts a rejecting `POST /v3/transfers`.
pub async fn mount_transfer_rejected(server: &MockServer, status: u16, message: &str) {
    Mock::given(method("POST"))
        .and(path("/v3/transfers"))
        .respond_with(ResponseTemplate::new(status).set_body_json(provider_error_body(message)))
        .mount(server)
        .await;
}

/// Mounts a `POST /v3/transfers` that must never be called.
pub async fn mount_transfer_never_called(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/v3/transfers"))
        .respond_with(ResponseTemplate::new(200).set_body_json(transfer_accepted_body(DUMMY_TRANSFER_ID)))
        .expect(0)
        .mount(server)
        .await;
}
