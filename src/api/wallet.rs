//! Catalog, watch session and wallet endpoints
//!
//! Handlers for browsing ads, watching them, claiming rewards and managing
//! a user's wallet.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};
use warp::http::StatusCode;
use warp::reply::{Json, WithStatus};

use super::generic::{error_reply, success_reply};
use crate::app::AppState;
use crate::catalog::Advertisement;
use crate::ledger::{is_valid_user_id, RewardOutcome, Transaction};
use crate::payout::PayoutMethod;
use crate::verifier::{verify_ad_view, ClaimEvidence, ClaimVerdict};
use crate::viewer::{ViewError, ViewSession, ViewState};

/// Page size when `limit` is not given.
pub const DEFAULT_PAGE_LIMIT: usize = 20;
/// Largest accepted `limit`.
pub const MAX_PAGE_LIMIT: usize = 100;

const AD_NOT_FOUND: &str = "Ad not found.";
const INVALID_USER_ID: &str = "Invalid user id";

type HandlerResult = Result<WithStatus<Json>, warp::Rejection>;

// ============================================================================
// REQUEST/RESPONSE STRUCTURES
// ============================================================================

/// Query parameters of `GET /ads`.
#[derive(Debug, Default, Deserialize)]
pub struct AdListQuery {
    pub offset: Option<usize>,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdPage {
    pub ads: Vec<Advertisement>,
    pub total: usize,
    pub offset: usize,
    pub limit: usize,
}

/// A watch session as seen by its owner.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub session_id: String,
    pub ad_id: String,
    pub reward: f64,
    pub state: ViewState,
    /// Seconds until the claim unlocks (0 once unlocked)
    pub remaining_secs: i64,
    pub started_at: DateTime<Utc>,
    pub unlocks_at: DateTime<Utc>,
}

impl SessionResponse {
    fn at(session: &ViewSession, now: DateTime<Utc>) -> Self {
        Self {
            session_id: session.session_id.clone(),
            ad_id: session.ad_id.clone(),
            reward: session.reward,
            state: session.state_at(now),
            remaining_secs: session.remaining_secs_at(now),
            started_at: session.started_at,
            unlocks_at: session.unlocks_at,
        }
    }
}

/// Result of a claim.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimResponse {
    #[serde(flatten)]
    pub verdict: ClaimVerdict,
    /// What the ledger did with an approved reward
    pub reward_outcome: Option<RewardOutcome>,
}

/// Wallet view of a user's ledger.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletResponse {
    /// Pending balance in the reward currency
    pub balance: f64,
    /// Pending balance converted to the payout currency
    pub payout_balance: f64,
    pub exchange_rate: f64,
    /// Account number masked
    pub payout_method: Option<PayoutMethod>,
    pub transactions: Vec<Transaction>,
}

/// HTTP status for a session transition failure.
pub fn view_error_status(err: &ViewError) -> StatusCode {
    match err {
        ViewError::SessionNotFound => StatusCode::NOT_FOUND,
        ViewError::StillPlaying { .. }
        | ViewError::ClaimInProgress
        | ViewError::AlreadyClaimed
        | ViewError::Cancelled => StatusCode::CONFLICT,
    }
}

// ============================================================================
// CATALOG HANDLERS
// ============================================================================

/// Handler for GET /ads.
pub async fn list_ads_handler(query: AdListQuery, state: Arc<AppState>) -> HandlerResult {
    let offset = query.offset.unwrap_or(0);
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_LIMIT).min(MAX_PAGE_LIMIT);

    Ok(success_reply(
        AdPage {
            ads: state.catalog.page(offset, limit).to_vec(),
            total: state.catalog.len(),
            offset,
            limit,
        },
        StatusCode::OK,
    ))
}

/// Handler for GET /ads/:id.
pub async fn get_ad_handler(ad_id: String, state: Arc<AppState>) -> HandlerResult {
    Ok(match state.catalog.get(&ad_id) {
        Some(ad) => success_reply(ad, StatusCode::OK),
        None => error_reply(AD_NOT_FOUND, StatusCode::NOT_FOUND),
    })
}

// ============================================================================
// WATCH SESSION HANDLERS
// ============================================================================

/// Handler for POST /users/:user/ads/:id/watch.
///
/// Opens a watch session that unlocks after the ad's duration.
pub async fn start_watch_handler(user_id: String, ad_id: String, state: Arc<AppState>) -> HandlerResult {
    if !is_valid_user_id(&user_id) {
        return Ok(error_reply(INVALID_USER_ID, StatusCode::BAD_REQUEST));
    }
    let Some(ad) = state.catalog.get(&ad_id) else {
        return Ok(error_reply(AD_NOT_FOUND, StatusCode::NOT_FOUND));
    };

    let now = Utc::now();
    let session = state.sessions.start_at(&user_id, ad, now).await;
    info!("User {} started ad {} (session {})", user_id, ad.id, session.session_id);

    Ok(success_reply(SessionResponse::at(&session, now), StatusCode::CREATED))
}

/// Handler for GET /users/:user/sessions/:sid.
pub async fn get_session_handler(user_id: String, session_id: String, state: Arc<AppState>) -> HandlerResult {
    Ok(match state.sessions.get(&user_id, &session_id).await {
        Some(session) => success_reply(SessionResponse::at(&session, Utc::now()), StatusCode::OK),
        None => error_reply(ViewError::SessionNotFound.to_string(), StatusCode::NOT_FOUND),
    })
}

/// Handler for DELETE /users/:user/sessions/:sid.
pub async fn cancel_session_handler(user_id: String, session_id: String, state: Arc<AppState>) -> HandlerResult {
    if let Err(e) = state.sessions.cancel(&user_id, &session_id).await {
        return Ok(error_reply(e.to_string(), view_error_status(&e)));
    }
    // Cancelled sessions are still readable until pruned
    Ok(match state.sessions.get(&user_id, &session_id).await {
        Some(session) => success_reply(SessionResponse::at(&session, Utc::now()), StatusCode::OK),
        None => error_reply(ViewError::SessionNotFound.to_string(), StatusCode::NOT_FOUND),
    })
}

/// Handler for POST /users/:user/sessions/:sid/claim.
///
/// Locks the session, verifies the view and hands an approved reward to the
/// user's ledger. A rejected view leaves the session claimable again.
///
/// Verification and the ledger update run on their own task, so a client
/// that disconnects mid-claim still gets the session finished.
pub async fn claim_handler(
    user_id: String,
    session_id: String,
    evidence: Option<ClaimEvidence>,
    state: Arc<AppState>,
) -> HandlerResult {
    let session = match state.sessions.begin_claim(&user_id, &session_id, Utc::now()).await {
        Ok(session) => session,
        Err(e) => return Ok(error_reply(e.to_string(), view_error_status(&e))),
    };

    let task_state = state.clone();
    let task_session_id = session_id.clone();
    let claim = tokio::spawn(async move {
        let result = process_claim(&user_id, &session.ad_id, evidence, &task_state).await;
        let rewarded = matches!(&result, Ok(ClaimResponse { reward_outcome: Some(_), .. }));
        let _ = task_state.sessions.finish_claim(&task_session_id, rewarded).await;
        result
    });

    match claim.await {
        Ok(Ok(response)) => Ok(success_reply(response, StatusCode::OK)),
        Ok(Err((message, status))) => Ok(error_reply(message, status)),
        Err(e) => {
            error!("Claim task for session {} aborted: {}", session_id, e);
            let _ = state.sessions.finish_claim(&session_id, false).await;
            Ok(error_reply("Claim could not be processed", StatusCode::INTERNAL_SERVER_ERROR))
        }
    }
}

/// Verifies a claimed view and records an approved reward.
async fn process_claim(
    user_id: &str,
    ad_id: &str,
    evidence: Option<ClaimEvidence>,
    state: &AppState,
) -> Result<ClaimResponse, (String, StatusCode)> {
    let Some(ad) = state.catalog.get(ad_id) else {
        return Err((AD_NOT_FOUND.to_string(), StatusCode::NOT_FOUND));
    };

    let verdict = verify_ad_view(&state.verifier, ad, evidence.as_ref()).await;
    let ClaimVerdict::Approved { reward } = verdict else {
        return Ok(ClaimResponse {
            verdict,
            reward_outcome: None,
        });
    };

    let ledger = state.ledgers.ledger(user_id).await;
    match ledger.add_reward(reward).await {
        Ok(outcome) => {
            info!("User {} claimed {:.2} for ad {}", user_id, reward, ad.id);
            Ok(ClaimResponse {
                verdict,
                reward_outcome: Some(outcome),
            })
        }
        Err(e) => {
            warn!("Reward for ad {} not recorded for {}: {}", ad.id, user_id, e);
            Err((e.to_string(), StatusCode::INTERNAL_SERVER_ERROR))
        }
    }
}

// ============================================================================
// WALLET HANDLERS
// ============================================================================

/// Handler for GET /users/:user/wallet.
pub async fn get_wallet_handler(user_id: String, state: Arc<AppState>) -> HandlerResult {
    if !is_valid_user_id(&user_id) {
        return Ok(error_reply(INVALID_USER_ID, StatusCode::BAD_REQUEST));
    }

    let snapshot = state.ledgers.snapshot(&user_id).await;
    Ok(success_reply(
        WalletResponse {
            balance: snapshot.balance,
            payout_balance: snapshot.balance * state.exchange_rate,
            exchange_rate: state.exchange_rate,
            payout_method: snapshot.payout_method.as_ref().map(PayoutMethod::masked),
            transactions: snapshot.transactions,
        },
        StatusCode::OK,
    ))
}

/// Handler for PUT /users/:user/payout-method.
///
/// Saves the method and pays out any outstanding balance to it.
pub async fn save_payout_method_handler(
    user_id: String,
    method: PayoutMethod,
    state: Arc<AppState>,
) -> HandlerResult {
    if !is_valid_user_id(&user_id) {
        return Ok(error_reply(INVALID_USER_ID, StatusCode::BAD_REQUEST));
    }
    // Checked before the ledger is loaded so a bad form never creates state
    if let Err(e) = method.validate() {
        return Ok(error_reply(e.to_string(), StatusCode::BAD_REQUEST));
    }

    let ledger = state.ledgers.ledger(&user_id).await;
    Ok(match ledger.save_payout_method(method).await {
        Ok(outcome) => success_reply(outcome, StatusCode::OK),
        Err(e) => error_reply(e.to_string(), StatusCode::BAD_REQUEST),
    })
}
