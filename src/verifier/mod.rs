//! View Verifier Module
//!
//! Decides whether an ad view was genuine before a reward is granted. The
//! backend is chosen by configuration: `always_valid` accepts every view,
//! `scoring` asks an external fraud-scoring endpoint.

pub mod scoring;

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::catalog::Advertisement;
use crate::config::{VerifierConfig, VerifierMode};

pub use scoring::{parse_data_uri, render_prompt, MediaAttachment, ScoringVerifier};

/// Recording used when the client supplies none: a minimal WebM header.
pub const PLACEHOLDER_RECORDING_URI: &str =
    "data:video/webm;base64,GkXfo0AgQoaBAUL3gQFC8oEEQvOBCEKCQAR3ZWJtQoeBAkKFgQIYU4BnQI0VSalmQCgq17FAAw9A";

/// Reason shown when the verifier rejects a view without saying why.
pub const DEFAULT_REJECTION_REASON: &str = "Unusual activity detected.";

/// Reason shown when verification itself fails.
pub const VERIFICATION_FAILED_REASON: &str = "An unexpected error occurred during verification.";

// ============================================================================
// DATA STRUCTURES
// ============================================================================

/// Everything the verifier looks at for one view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationRequest {
    /// `data:<mime>;base64,<payload>` recording of the view
    pub ad_view_video_data_uri: String,
    pub mouse_activity_json: String,
    pub keyboard_activity_json: String,
    pub ad_metadata_json: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationVerdict {
    pub is_valid_ad_view: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl VerificationVerdict {
    pub fn valid() -> Self {
        Self {
            is_valid_ad_view: true,
            reason: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum VerifierError {
    #[error("Invalid recording: {0}")]
    InvalidMedia(String),
    #[error("Scoring request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Scoring endpoint returned HTTP {status}: {body}")]
    Endpoint { status: u16, body: String },
    #[error("Scoring endpoint returned an unreadable verdict: {0}")]
    InvalidVerdict(String),
}

/// Client-supplied evidence for a claim. Missing fields fall back to the
/// placeholder recording and empty activity logs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimEvidence {
    #[serde(default)]
    pub ad_view_video_data_uri: Option<String>,
    /// Pointer events, as a JSON value
    #[serde(default)]
    pub mouse_activity: Option<serde_json::Value>,
    /// Key events, as a JSON value
    #[serde(default)]
    pub keyboard_activity: Option<serde_json::Value>,
}

/// Result of verifying a claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum ClaimVerdict {
    Approved { reward: f64 },
    Rejected { reason: String },
}

// ============================================================================
// VERIFIER
// ============================================================================

/// Configured verifier backend.
#[derive(Debug)]
pub enum ViewVerifier {
    AlwaysValid,
    Scoring(ScoringVerifier),
}

impl ViewVerifier {
    /// Builds the verifier selected by `config.mode`.
    pub fn from_config(config: &VerifierConfig) -> anyhow::Result<Self> {
        match config.mode {
            VerifierMode::AlwaysValid => Ok(ViewVerifier::AlwaysValid),
            VerifierMode::Scoring => {
                let url = config.scoring_url.as_deref().ok_or_else(|| {
                    anyhow::anyhow!("verifier.scoring_url is required in scoring mode")
                })?;
                info!("View verification via scoring endpoint {}", url);
                Ok(ViewVerifier::Scoring(ScoringVerifier::new(
                    url,
                    Duration::from_millis(config.timeout_ms),
                )?))
            }
        }
    }

    pub async fn verify(&self, request: &VerificationRequest) -> Result<VerificationVerdict, VerifierError> {
        match self {
            ViewVerifier::AlwaysValid => Ok(VerificationVerdict::valid()),
            ViewVerifier::Scoring(scoring) => scoring.score(request).await,
        }
    }
}

/// Builds the verification request for a view of `ad`.
pub fn build_request(ad: &Advertisement, evidence: Option<&ClaimEvidence>) -> VerificationRequest {
    let evidence = evidence.cloned().unwrap_or_default();
    let activity = |value: Option<serde_json::Value>| {
        value.map(|v| v.to_string()).unwrap_or_else(|| "[]".to_string())
    };

    VerificationRequest {
        ad_view_video_data_uri: evidence
            .ad_view_video_data_uri
            .unwrap_or_else(|| PLACEHOLDER_RECORDING_URI.to_string()),
        mouse_activity_json: activity(evidence.mouse_activity),
        keyboard_activity_json: activity(evidence.keyboard_activity),
        ad_metadata_json: serde_json::json!({ "id": ad.id, "duration": ad.duration }).to_string(),
    }
}

/// Verifies a view of `ad` and decides the reward.
///
/// Verifier failures never grant a reward; they surface as a rejection with
/// a generic reason.
pub async fn verify_ad_view(
    verifier: &ViewVerifier,
    ad: &Advertisement,
    evidence: Option<&ClaimEvidence>,
) -> ClaimVerdict {
    let request = build_request(ad, evidence);
    match verifier.verify(&request).await {
        Ok(verdict) if verdict.is_valid_ad_view => ClaimVerdict::Approved { reward: ad.reward },
        Ok(verdict) => {
            let reason = verdict
                .reason
                .filter(|r| !r.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_REJECTION_REASON.to_string());
            warn!("View of ad {} rejected: {}", ad.id, reason);
            ClaimVerdict::Rejected { reason }
        }
        Err(e) => {
            error!("Verification of ad {} failed: {}", ad.id, e);
            ClaimVerdict::Rejected {
                reason: VERIFICATION_FAILED_REASON.to_string(),
            }
        }
    }
}
