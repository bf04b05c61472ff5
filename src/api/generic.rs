//! Generic API structures and handlers
//!
//! This module contains the response envelope, rejection handling, CORS and the
//! route table of the AdWatch API server.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info};
use warp::hyper::body::Bytes;
use warp::reply::{Json, WithStatus};
use warp::{http::{Method, StatusCode}, Filter, Rejection, Reply};

use crate::app::AppState;
use crate::config::Config;

// ============================================================================
// SHARED REQUEST/RESPONSE STRUCTURES
// ============================================================================

/// Standardized response structure for all API endpoints.
///
/// `/api/transfer` is the exception: it keeps the `{status, message,
/// transferId}` shape existing clients expect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    /// Whether the request was successful
    pub success: bool,
    /// Response data (if successful)
    pub data: Option<T>,
    /// Error message (if failed)
    pub error: Option<String>,
}

/// Successful envelope with `status`.
pub fn success_reply<T: Serialize>(data: T, status: StatusCode) -> WithStatus<Json> {
    warp::reply::with_status(
        warp::reply::json(&ApiResponse {
            success: true,
            data: Some(data),
            error: None,
        }),
        status,
    )
}

/// Failed envelope with `status`.
pub fn error_reply(message: impl Into<String>, status: StatusCode) -> WithStatus<Json> {
    warp::reply::with_status(
        warp::reply::json(&ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(message.into()),
        }),
        status,
    )
}

/// Decodes an optional JSON body. An empty body yields `None`.
pub fn parse_optional_body<T: serde::de::DeserializeOwned>(
    route: &str,
    body: &Bytes,
) -> Result<Option<T>, Rejection> {
    if body.iter().all(|b| b.is_ascii_whitespace()) {
        return Ok(None);
    }
    serde_json::from_slice::<T>(body).map(Some).map_err(|e| {
        let body_str = String::from_utf8_lossy(body);
        error!("{} deserialization failed: {}. Body: {}", route, e, body_str);
        warp::reject::custom(JsonDeserializeError(format!("Invalid JSON: {}", e)))
    })
}

// ============================================================================
// WARP FILTER HELPERS
// ============================================================================

/// Creates a warp filter that injects the shared service state.
pub fn with_state(
    state: Arc<AppState>,
) -> impl Filter<Extract = (Arc<AppState>,), Error = std::convert::Infallible> + Clone {
    warp::any().map(move || state.clone())
}

// ============================================================================
// CUSTOM REJECTION TYPES
// ============================================================================

/// Custom rejection for JSON deserialization errors
#[derive(Debug)]
pub struct JsonDeserializeError(pub String);

impl warp::reject::Reject for JsonDeserializeError {}

// ============================================================================
// CORS CONFIGURATION
// ============================================================================

/// Creates a CORS filter based on the configured allowed origins.
fn create_cors_filter(allowed_origins: &[String]) -> warp::cors::Builder {
    let methods = vec![
        Method::GET,
        Method::POST,
        Method::PUT,
        Method::DELETE,
        Method::OPTIONS,
    ];

    if allowed_origins.iter().any(|origin| origin == "*") {
        warp::cors()
            .allow_any_origin()
            .allow_methods(methods)
            .allow_headers(vec!["content-type"])
    } else {
        let origins: Vec<&str> = allowed_origins.iter().map(|s| s.as_str()).collect();
        warp::cors()
            .allow_origins(origins)
            .allow_methods(methods)
            .allow_headers(vec!["content-type"])
    }
}

// ============================================================================
// REJECTION HANDLER
// ============================================================================

/// Global rejection handler for all API routes.
///
/// Converts warp rejections into standardized API responses with
/// appropriate HTTP status codes.
pub async fn handle_rejection(rej: Rejection) -> Result<impl Reply, std::convert::Infallible> {
    let (status, message) = if let Some(err) = rej.find::<JsonDeserializeError>() {
        (StatusCode::BAD_REQUEST, err.0.clone())
    } else if let Some(err) = rej.find::<warp::filters::body::BodyDeserializeError>() {
        (StatusCode::BAD_REQUEST, format!("Invalid JSON: {}", err))
    } else if let Some(err) = rej.find::<warp::reject::InvalidQuery>() {
        (StatusCode::BAD_REQUEST, format!("Invalid query: {}", err))
    } else if rej.is_not_found() {
        (StatusCode::NOT_FOUND, "Endpoint not found".to_string())
    } else if rej.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed".to_string())
    } else {
        error!("Unhandled rejection: {:?}", rej);
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
    };

    Ok(error_reply(message, status))
}

// ============================================================================
// API SERVER IMPLEMENTATION
// ============================================================================

/// REST API server for the AdWatch service.
pub struct ApiServer {
    /// Service configuration
    config: Arc<Config>,
    /// Catalog, sessions, verifier, ledgers
    state: Arc<AppState>,
}

impl ApiServer {
    /// Creates a new API server.
    ///
    /// # Arguments
    ///
    /// * `config` - Service configuration
    /// * `state` - Shared service state
    pub fn new(config: Config, state: Arc<AppState>) -> Self {
        Self {
            config: Arc::new(config),
            state,
        }
    }

    /// Starts the API server and begins handling HTTP requests.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - Server shut down
    /// * `Err(anyhow::Error)` - Invalid bind address
    pub async fn run(&self) -> Result<()> {
        info!(
            "Starting API server on {}:{}",
            self.config.api.host, self.config.api.port
        );

        let routes = self.create_routes();

        let addr: std::net::SocketAddr = format!("{}:{}", self.config.api.host, self.config.api.port)
            .parse()
            .context("Failed to parse API server address")?;

        warp::serve(routes).run(addr).await;

        Ok(())
    }

    /// Creates all API routes for the server.
    pub(crate) fn create_routes(
        &self,
    ) -> impl Filter<Extract = impl warp::Reply, Error = std::convert::Infallible> + Clone {
        use super::{transfer, wallet};

        let state = self.state.clone();

        // Health check endpoint - returns service status
        let health = warp::path("health").and(warp::get()).map(|| {
            warp::reply::json(&ApiResponse::<String> {
                success: true,
                data: Some("AdWatch Service is running".to_string()),
                error: None,
            })
        });

        // GET /ads?offset&limit - Catalog listing
        let list_ads = warp::path("ads")
            .and(warp::path::end())
            .and(warp::get())
            .and(warp::query::<wallet::AdListQuery>())
            .and(with_state(state.clone()))
            .and_then(wallet::list_ads_handler);

        // GET /ads/:id - Single ad
        let get_ad = warp::path("ads")
            .and(warp::path::param())
            .and(warp::path::end())
            .and(warp::get())
            .and(with_state(state.clone()))
            .and_then(wallet::get_ad_handler);

        // POST /users/:user/ads/:id/watch - Start a watch session
        let start_watch = warp::path("users")
            .and(warp::path::param())
            .and(warp::path("ads"))
            .and(warp::path::param())
            .and(warp::path("watch"))
            .and(warp::path::end())
            .and(warp::post())
            .and(with_state(state.clone()))
            .and_then(wallet::start_watch_handler);

        // GET /users/:user/sessions/:sid - Session state
        let get_session = warp::path("users")
            .and(warp::path::param())
            .and(warp::path("sessions"))
            .and(warp::path::param())
            .and(warp::path::end())
            .and(warp::get())
            .and(with_state(state.clone()))
            .and_then(wallet::get_session_handler);

        // DELETE /users/:user/sessions/:sid - Cancel a session
        let cancel_session = warp::path("users")
            .and(warp::path::param())
            .and(warp::path("sessions"))
            .and(warp::path::param())
            .and(warp::path::end())
            .and(warp::delete())
            .and(with_state(state.clone()))
            .and_then(wallet::cancel_session_handler);

        // POST /users/:user/sessions/:sid/claim - Verify the view and grant the reward
        let claim_state = state.clone();
        let claim = warp::path("users")
            .and(warp::path::param())
            .and(warp::path("sessions"))
            .and(warp::path::param())
            .and(warp::path("claim"))
            .and(warp::path::end())
            .and(warp::post())
            .and(warp::body::bytes())
            .and_then(move |user_id: String, session_id: String, body: Bytes| {
                let state = claim_state.clone();
                async move {
                    debug!("POST /users/{}/sessions/{}/claim", user_id, session_id);
                    let evidence = parse_optional_body("Claim evidence", &body)?;
                    wallet::claim_handler(user_id, session_id, evidence, state).await
                }
            });

        // GET /users/:user/wallet - Balance, payout method and history
        let wallet_route = warp::path("users")
            .and(warp::path::param())
            .and(warp::path("wallet"))
            .and(warp::path::end())
            .and(warp::get())
            .and(with_state(state.clone()))
            .and_then(wallet::get_wallet_handler);

        // PUT /users/:user/payout-method - Save payout method
        let save_method_state = state.clone();
        let save_method = warp::path("users")
            .and(warp::path::param())
            .and(warp::path("payout-method"))
            .and(warp::path::end())
            .and(warp::put())
            .and(warp::body::bytes())
            .and_then(move |user_id: String, body: Bytes| {
                let state = save_method_state.clone();
                async move {
                    match serde_json::from_slice::<crate::payout::PayoutMethod>(&body) {
                        Ok(method) => wallet::save_payout_method_handler(user_id, method, state).await,
                        Err(e) => {
                            error!("Payout method deserialization failed: {}", e);
                            Err(warp::reject::custom(JsonDeserializeError(format!("Invalid JSON: {}", e))))
                        }
                    }
                }
            });

        // POST /api/transfer - Payout passthrough
        let transfer_route = warp::path("api")
            .and(warp::path("transfer"))
            .and(warp::path::end())
            .and(warp::post())
            .and(warp::body::bytes())
            .and(with_state(state.clone()))
            .and_then(transfer::transfer_handler);

        // POST /api/transfer/callback - Provider settlement webhook
        let callback = warp::path("api")
            .and(warp::path("transfer"))
            .and(warp::path("callback"))
            .and(warp::path::end())
            .and(warp::post())
            .and(warp::header::optional::<String>(transfer::WEBHOOK_HASH_HEADER))
            .and(warp::body::bytes())
            .and(with_state(state))
            .and_then(transfer::transfer_callback_handler);

        // Combine all routes and apply rejection handler
        health
            .or(list_ads)
            .or(get_ad)
            .or(start_watch)
            .or(get_session)
            .or(cancel_session)
            .or(claim)
            .or(wallet_route)
            .or(save_method)
            .or(transfer_route)
            .or(callback)
            .with(create_cors_filter(&self.config.api.cors_origins))
            .recover(handle_rejection)
    }

    /// Public method for testing - exposes routes for integration tests
    #[allow(dead_code)] // Used by tests
    pub fn test_routes(&self) -> impl Filter<Extract = impl warp::Reply, Error = std::convert::Infallible> + Clone {
        self.create_routes()
    }
}
