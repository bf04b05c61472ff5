//! Integration tests for the REST API
//!
//! Routes are exercised through `warp::test` against an in-memory service
//! state; the payment provider is a wiremock server.

use adwatch::api::{
    AdPage, ApiResponse, ApiServer, ClaimResponse, SessionResponse, TransferErrorResponse, TransferResponse,
    WalletResponse, webhook_hash_matches, TRANSFER_INITIATED_MESSAGE, WEBHOOK_HASH_HEADER,
};
use adwatch::config::{Config, SettlementMode, VerifierConfig, VerifierMode};
use adwatch::ledger::TransactionStatus;
use adwatch::verifier::ClaimVerdict;
use adwatch::viewer::ViewState;
use adwatch::AppState;
use chrono::{Duration, Utc};
use serde_json::json;
use std::sync::Arc;
use warp::http::StatusCode;
use warp::test::request;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[path = "helpers.rs"]
mod test_helpers;
use test_helpers::{
    build_test_config, build_test_config_with_provider, dummy_credentials, mount_transfer_accepted,
    mount_transfer_never_called, mount_transfer_rejected, DUMMY_ACCOUNT_HOLDER, DUMMY_ACCOUNT_NUMBER,
    DUMMY_BANK_NAME, DUMMY_TRANSFER_ID, DUMMY_UNSUPPORTED_BANK, DUMMY_USER_ID, DUMMY_WEBHOOK_HASH,
};

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

/// Creates a server and its state. Payouts go to `provider`, when given.
fn create_test_server(config: Config, with_credentials: bool) -> (ApiServer, Arc<AppState>) {
    let credentials = with_credentials.then(dummy_credentials);
    let state = Arc::new(AppState::new(&config, credentials, Some(DUMMY_WEBHOOK_HASH.to_string())).unwrap());
    (ApiServer::new(config, state.clone()), state)
}

fn payout_method_body() -> serde_json::Value {
    json!({
        "accountHolder": DUMMY_ACCOUNT_HOLDER,
        "accountNumber": DUMMY_ACCOUNT_NUMBER,
        "bankName": DUMMY_BANK_NAME,
        "paymentMethod": "bank"
    })
}

fn transfer_body(amount: f64, bank_name: &str) -> serde_json::Value {
    json!({
        "amount": amount,
        "bankDetails": {
            "accountHolder": DUMMY_ACCOUNT_HOLDER,
            "accountNumber": DUMMY_ACCOUNT_NUMBER,
            "bankName": bank_name,
            "paymentMethod": "bank"
        }
    })
}

/// Starts a session for ad `ad_id` that unlocked a while ago.
async fn start_unlocked_session(state: &AppState, ad_id: &str) -> String {
    let ad = state.catalog.get(ad_id).unwrap();
    let started = Utc::now() - Duration::seconds(i64::from(ad.duration) + 5);
    state.sessions.start_at(DUMMY_USER_ID, ad, started).await.session_id
}

// ============================================================================
// CATALOG ENDPOINT TESTS
// ============================================================================

/// What is tested: Health endpoint
/// Why: Ensures service is running and responsive
#[tokio::test]
async fn test_health_endpoint() {
    let (server, _) = create_test_server(build_test_config(), false);
    let routes = server.test_routes();

    let response = request().method("GET").path("/health").reply(&routes).await;

    assert_eq!(response.status(), StatusCode::OK);
    let body: ApiResponse<String> = serde_json::from_slice(response.body()).unwrap();
    assert!(body.success);
}

/// What is tested: Catalog listing with paging
/// Why: Clients page through the catalog
#[tokio::test]
async fn test_list_ads() {
    let (server, _) = create_test_server(build_test_config(), false);
    let routes = server.test_routes();

    let response = request().method("GET").path("/ads?offset=95&limit=10").reply(&routes).await;

    assert_eq!(response.status(), StatusCode::OK);
    let body: ApiResponse<AdPage> = serde_json::from_slice(response.body()).unwrap();
    let page = body.data.unwrap();
    assert_eq!(page.total, 100);
    assert_eq!(page.ads.len(), 5);
    assert_eq!(page.ads[0].id, "96");
}

/// What is tested: Malformed paging parameters
/// Why: Bad queries are client errors
#[tokio::test]
async fn test_list_ads_invalid_query() {
    let (server, _) = create_test_server(build_test_config(), false);
    let routes = server.test_routes();

    let response = request().method("GET").path("/ads?limit=many").reply(&routes).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

/// What is tested: Single ad lookup and missing ad
/// Why: Ad "1" is 40s/100.00; ad "101" does not exist in a 100-ad catalog
#[tokio::test]
async fn test_get_ad() {
    let (server, _) = create_test_server(build_test_config(), false);
    let routes = server.test_routes();

    let response = request().method("GET").path("/ads/1").reply(&routes).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = serde_json::from_slice(response.body()).unwrap();
    assert_eq!(body["data"]["duration"], 40);
    assert_eq!(body["data"]["reward"], 100.0);
    assert_eq!(body["data"]["thumbnailUrl"], "https://picsum.photos/seed/1/600/400");

    let response = request().method("GET").path("/ads/101").reply(&routes).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body: ApiResponse<()> = serde_json::from_slice(response.body()).unwrap();
    assert_eq!(body.error.as_deref(), Some("Ad not found."));
}

// ============================================================================
// WATCH SESSION ENDPOINT TESTS
// ============================================================================

/// What is tested: Starting a session and claiming it too early
/// Why: The reward is locked until the ad has played in full
#[tokio::test]
async fn test_watch_then_claim_too_early() {
    let (server, _) = create_test_server(build_test_config(), false);
    let routes = server.test_routes();

    let response = request()
        .method("POST")
        .path(&format!("/users/{}/ads/1/watch", DUMMY_USER_ID))
        .reply(&routes)
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body: ApiResponse<SessionResponse> = serde_json::from_slice(response.body()).unwrap();
    let session = body.data.unwrap();
    assert_eq!(session.state, ViewState::Playing);
    assert_eq!(session.reward, 100.0);

    let response = request()
        .method("POST")
        .path(&format!("/users/{}/sessions/{}/claim", DUMMY_USER_ID, session.session_id))
        .reply(&routes)
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

/// What is tested: Watching an unknown ad, and a bad user id
/// Why: Sessions only open for catalog ads and valid users
#[tokio::test]
async fn test_watch_rejections() {
    let (server, _) = create_test_server(build_test_config(), false);
    let routes = server.test_routes();

    let response = request()
        .method("POST")
        .path(&format!("/users/{}/ads/101/watch", DUMMY_USER_ID))
        .reply(&routes)
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = request().method("POST").path("/users/bad%20user/ads/1/watch").reply(&routes).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

/// What is tested: Claiming an unlocked session credits the wallet once
/// Why: A verified view pays the ad's reward exactly once
#[tokio::test]
async fn test_claim_credits_wallet() {
    let (server, state) = create_test_server(build_test_config(), false);
    let routes = server.test_routes();
    let session_id = start_unlocked_session(&state, "1").await;
    let claim_path = format!("/users/{}/sessions/{}/claim", DUMMY_USER_ID, session_id);

    let response = request().method("POST").path(&claim_path).reply(&routes).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: ApiResponse<ClaimResponse> = serde_json::from_slice(response.body()).unwrap();
    let claim = body.data.unwrap();
    assert_eq!(claim.verdict, ClaimVerdict::Approved { reward: 100.0 });
    assert!(claim.reward_outcome.is_some());

    let response = request().method("POST").path(&claim_path).reply(&routes).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = request()
        .method("GET")
        .path(&format!("/users/{}/wallet", DUMMY_USER_ID))
        .reply(&routes)
        .await;
    let body: ApiResponse<WalletResponse> = serde_json::from_slice(response.body()).unwrap();
    let wallet = body.data.unwrap();
    assert_eq!(wallet.balance, 100.0);
    assert_eq!(wallet.payout_balance, 150_000.0);
    assert!(wallet.payout_method.is_none());
}

/// What is tested: A claim whose client disconnects during verification
/// Why: The session must still be finished and the reward recorded
#[tokio::test]
async fn test_claim_finishes_after_client_disconnect() {
    let scoring_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/score"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "isValidAdView": true }))
                .set_delay(std::time::Duration::from_millis(300)),
        )
        .mount(&scoring_server)
        .await;
    let mut config = build_test_config();
    config.verifier = VerifierConfig {
        mode: VerifierMode::Scoring,
        scoring_url: Some(format!("{}/score", scoring_server.uri())),
        timeout_ms: 5_000,
    };
    let (server, state) = create_test_server(config, false);
    let routes = server.test_routes();
    let session_id = start_unlocked_session(&state, "1").await;
    let claim_path = format!("/users/{}/sessions/{}/claim", DUMMY_USER_ID, session_id);

    let dropped = tokio::time::timeout(
        std::time::Duration::from_millis(50),
        request().method("POST").path(&claim_path).reply(&routes),
    )
    .await;
    assert!(dropped.is_err());

    tokio::time::sleep(std::time::Duration::from_millis(1_000)).await;
    let session = state.sessions.get(DUMMY_USER_ID, &session_id).await.unwrap();
    assert_eq!(session.state_at(Utc::now()), ViewState::Claimed);
    assert_eq!(state.ledgers.snapshot(DUMMY_USER_ID).await.balance, 100.0);
}

/// What is tested: Reading a wallet of an unknown user
/// Why: Read-only lookups must not grow the in-memory ledger set
#[tokio::test]
async fn test_wallet_read_does_not_cache_ledger() {
    let (server, state) = create_test_server(build_test_config(), false);
    let routes = server.test_routes();

    for i in 0..10 {
        let response = request()
            .method("GET")
            .path(&format!("/users/visitor-{}/wallet", i))
            .reply(&routes)
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body: ApiResponse<WalletResponse> = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(body.data.unwrap().balance, 0.0);
    }
    assert!(state.ledgers.is_empty().await);
}

/// What is tested: Claim with client evidence in the body
/// Why: Clients may send their recording and activity logs
#[tokio::test]
async fn test_claim_with_evidence_and_bad_body() {
    let (server, state) = create_test_server(build_test_config(), false);
    let routes = server.test_routes();

    let session_id = start_unlocked_session(&state, "3").await;
    let response = request()
        .method("POST")
        .path(&format!("/users/{}/sessions/{}/claim", DUMMY_USER_ID, session_id))
        .body("{not json")
        .reply(&routes)
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = request()
        .method("POST")
        .path(&format!("/users/{}/sessions/{}/claim", DUMMY_USER_ID, session_id))
        .json(&json!({ "mouseActivity": [{ "x": 1, "y": 2 }] }))
        .reply(&routes)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

/// What is tested: Cancelled sessions cannot be claimed over HTTP
/// Why: Closing the viewer forfeits the reward
#[tokio::test]
async fn test_cancel_then_claim() {
    let (server, state) = create_test_server(build_test_config(), false);
    let routes = server.test_routes();
    let session_id = start_unlocked_session(&state, "1").await;
    let session_path = format!("/users/{}/sessions/{}", DUMMY_USER_ID, session_id);

    let response = request().method("DELETE").path(&session_path).reply(&routes).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: ApiResponse<SessionResponse> = serde_json::from_slice(response.body()).unwrap();
    assert_eq!(body.data.unwrap().state, ViewState::Cancelled);

    let response = request().method("POST").path(&format!("{}/claim", session_path)).reply(&routes).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = request().method("GET").path("/users/someone-else/sessions/x").reply(&routes).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// ============================================================================
// WALLET ENDPOINT TESTS
// ============================================================================

/// What is tested: Saving a payout method pays out the balance
/// Why: The first saved method receives everything earned so far
#[tokio::test]
async fn test_save_payout_method_flushes_balance() {
    let mock_server = MockServer::start().await;
    mount_transfer_accepted(&mock_server, DUMMY_TRANSFER_ID).await;
    let (server, state) = create_test_server(build_test_config_with_provider(&mock_server.uri()), true);
    let routes = server.test_routes();
    state.ledgers.ledger(DUMMY_USER_ID).await.add_reward(100.0).await.unwrap();

    let response = request()
        .method("PUT")
        .path(&format!("/users/{}/payout-method", DUMMY_USER_ID))
        .json(&payout_method_body())
        .reply(&routes)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = serde_json::from_slice(response.body()).unwrap();
    assert_eq!(body["data"]["balance"], 0.0);
    assert_eq!(body["data"]["payoutMethod"]["accountNumber"], "******6789");
    assert_eq!(body["data"]["balancePayout"]["result"], "sent");

    let response = request()
        .method("GET")
        .path(&format!("/users/{}/wallet", DUMMY_USER_ID))
        .reply(&routes)
        .await;
    let body: ApiResponse<WalletResponse> = serde_json::from_slice(response.body()).unwrap();
    let wallet = body.data.unwrap();
    assert_eq!(wallet.balance, 0.0);
    assert_eq!(wallet.transactions.len(), 1);
    assert_eq!(wallet.transactions[0].status, TransactionStatus::Completed);
    assert_eq!(wallet.transactions[0].amount, 150_000.0);
}

/// What is tested: Invalid payout method
/// Why: Form rules are enforced server side
#[tokio::test]
async fn test_save_invalid_payout_method() {
    let (server, state) = create_test_server(build_test_config(), false);
    let routes = server.test_routes();

    let mut method = payout_method_body();
    method["accountNumber"] = json!("12345");
    let response = request()
        .method("PUT")
        .path(&format!("/users/{}/payout-method", DUMMY_USER_ID))
        .json(&method)
        .reply(&routes)
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: ApiResponse<()> = serde_json::from_slice(response.body()).unwrap();
    assert_eq!(body.error.as_deref(), Some("Enter a valid 10-digit NUBAN."));

    let response = request()
        .method("PUT")
        .path(&format!("/users/{}/payout-method", DUMMY_USER_ID))
        .body("[]")
        .reply(&routes)
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let snapshot = state.ledgers.ledger(DUMMY_USER_ID).await.snapshot().await;
    assert!(snapshot.payout_method.is_none());
}

// ============================================================================
// TRANSFER ENDPOINT TESTS
// ============================================================================

/// What is tested: Transfer without provider credentials
/// Why: Configuration errors answer 500 before the body is read
#[tokio::test]
async fn test_transfer_missing_credentials() {
    let (server, _) = create_test_server(build_test_config(), false);
    let routes = server.test_routes();

    let response = request()
        .method("POST")
        .path("/api/transfer")
        .json(&transfer_body(1500.0, DUMMY_BANK_NAME))
        .reply(&routes)
        .await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: TransferErrorResponse = serde_json::from_slice(response.body()).unwrap();
    assert_eq!(body.message, "Server configuration error: Flutterwave secret key is missing.");
}

/// What is tested: Transfer with missing fields
/// Why: Amount and bank details are both required
#[tokio::test]
async fn test_transfer_missing_fields() {
    let mock_server = MockServer::start().await;
    mount_transfer_never_called(&mock_server).await;
    let (server, _) = create_test_server(build_test_config_with_provider(&mock_server.uri()), true);
    let routes = server.test_routes();

    for body in [
        json!({ "bankDetails": transfer_body(1.0, DUMMY_BANK_NAME)["bankDetails"] }),
        json!({ "amount": 1500 }),
        json!({ "amount": 0, "bankDetails": transfer_body(1.0, DUMMY_BANK_NAME)["bankDetails"] }),
    ] {
        let response = request().method("POST").path("/api/transfer").json(&body).reply(&routes).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: TransferErrorResponse = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(body.message, "Missing amount or bank details");
    }

    let response = request().method("POST").path("/api/transfer").body("nonsense").reply(&routes).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

/// What is tested: Transfer to an unsupported bank
/// Why: Refused with 400 and no provider call
#[tokio::test]
async fn test_transfer_unsupported_bank() {
    let mock_server = MockServer::start().await;
    mount_transfer_never_called(&mock_server).await;
    let (server, _) = create_test_server(build_test_config_with_provider(&mock_server.uri()), true);
    let routes = server.test_routes();

    let response = request()
        .method("POST")
        .path("/api/transfer")
        .json(&transfer_body(1500.0, DUMMY_UNSUPPORTED_BANK))
        .reply(&routes)
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: TransferErrorResponse = serde_json::from_slice(response.body()).unwrap();
    assert_eq!(body.message, "Bank 'Bank of Atlantis' is not supported.");
}

/// What is tested: Successful transfer
/// Why: The wallet client expects {status, message, transferId}
#[tokio::test]
async fn test_transfer_success() {
    let mock_server = MockServer::start().await;
    mount_transfer_accepted(&mock_server, DUMMY_TRANSFER_ID).await;
    let (server, _) = create_test_server(build_test_config_with_provider(&mock_server.uri()), true);
    let routes = server.test_routes();

    let response = request()
        .method("POST")
        .path("/api/transfer")
        .json(&transfer_body(1500.0, DUMMY_BANK_NAME))
        .reply(&routes)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: TransferResponse = serde_json::from_slice(response.body()).unwrap();
    assert_eq!(body.status, "success");
    assert_eq!(body.message, TRANSFER_INITIATED_MESSAGE);
    assert_eq!(body.transfer_id, DUMMY_TRANSFER_ID);
}

/// What is tested: Provider rejection over HTTP
/// Why: The provider's message is forwarded with 400
#[tokio::test]
async fn test_transfer_provider_rejection() {
    let mock_server = MockServer::start().await;
    mount_transfer_rejected(&mock_server, 400, "Invalid account number").await;
    let (server, _) = create_test_server(build_test_config_with_provider(&mock_server.uri()), true);
    let routes = server.test_routes();

    let response = request()
        .method("POST")
        .path("/api/transfer")
        .json(&transfer_body(1500.0, DUMMY_BANK_NAME))
        .reply(&routes)
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: TransferErrorResponse = serde_json::from_slice(response.body()).unwrap();
    assert_eq!(body.message, "Invalid account number");
}

// ============================================================================
// WEBHOOK ENDPOINT TESTS
// ============================================================================

/// What is tested: Settlement webhook
/// Why: A pending payout settles when the provider reports the outcome
#[tokio::test]
async fn test_transfer_webhook_settles_pending() {
    let mock_server = MockServer::start().await;
    mount_transfer_accepted(&mock_server, DUMMY_TRANSFER_ID).await;
    let mut config = build_test_config_with_provider(&mock_server.uri());
    config.ledger.settlement = SettlementMode::Confirmed;
    let (server, state) = create_test_server(config, true);
    let routes = server.test_routes();

    let ledger = state.ledgers.ledger(DUMMY_USER_ID).await;
    ledger.add_reward(10.0).await.unwrap();
    ledger.save_payout_method(adwatch::PayoutMethod {
        account_holder: DUMMY_ACCOUNT_HOLDER.to_string(),
        account_number: DUMMY_ACCOUNT_NUMBER.to_string(),
        bank_name: DUMMY_BANK_NAME.to_string(),
        payment_method: "bank".to_string(),
    })
    .await
    .unwrap();
    let reference = ledger.snapshot().await.transactions[0].reference.clone().unwrap();

    let webhook = json!({
        "event": "transfer.completed",
        "data": {
            "id": DUMMY_TRANSFER_ID,
            "reference": reference,
            "status": "SUCCESSFUL",
            "complete_message": "Successful"
        }
    });

    let response = request()
        .method("POST")
        .path("/api/transfer/callback")
        .header(WEBHOOK_HASH_HEADER, "wrong")
        .json(&webhook)
        .reply(&routes)
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(ledger.snapshot().await.transactions[0].status, TransactionStatus::Pending);

    let response = request()
        .method("POST")
        .path("/api/transfer/callback")
        .header(WEBHOOK_HASH_HEADER, DUMMY_WEBHOOK_HASH)
        .json(&webhook)
        .reply(&routes)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(ledger.snapshot().await.transactions[0].status, TransactionStatus::Completed);
}

/// What is tested: Webhook hash comparison
/// Why: Only the exact configured hash authenticates a webhook
#[test]
fn test_webhook_hash_matches() {
    assert!(webhook_hash_matches(Some(DUMMY_WEBHOOK_HASH), DUMMY_WEBHOOK_HASH));
    assert!(!webhook_hash_matches(None, DUMMY_WEBHOOK_HASH));
    assert!(!webhook_hash_matches(Some(""), DUMMY_WEBHOOK_HASH));
    assert!(!webhook_hash_matches(Some("adwatch-webhook-hasH"), DUMMY_WEBHOOK_HASH));
    assert!(!webhook_hash_matches(Some("adwatch-webhook-hash2"), DUMMY_WEBHOOK_HASH));
}

/// What is tested: Unknown route
/// Why: Unmatched paths answer with the JSON envelope
#[tokio::test]
async fn test_unknown_route() {
    let (server, _) = create_test_server(build_test_config(), false);
    let routes = server.test_routes();

    let response = request().method("GET").path("/nope").reply(&routes).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body: ApiResponse<()> = serde_json::from_slice(response.body()).unwrap();
    assert!(!body.success);
}
