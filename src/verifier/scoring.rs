//! Scoring endpoint client
//!
//! Renders the fraud-detection prompt for a view and posts it, together with
//! the raw request, to an external scoring endpoint that answers with a
//! [`VerificationVerdict`].

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::{VerificationRequest, VerificationVerdict, VerifierError};

/// Base64 decoder for recording payloads. Browsers emit both padded and
/// unpadded payloads.
const PAYLOAD_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Recording attached to a view, split out of its data URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaAttachment {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// Parses a `data:<mime>;base64,<payload>` URI.
pub fn parse_data_uri(uri: &str) -> Result<MediaAttachment, VerifierError> {
    let invalid = |detail: &str| VerifierError::InvalidMedia(detail.to_string());

    let rest = uri.strip_prefix("data:").ok_or_else(|| invalid("missing 'data:' scheme"))?;
    let (header, payload) = rest.split_once(',').ok_or_else(|| invalid("missing ',' separator"))?;
    let mime_type = header
        .strip_suffix(";base64")
        .ok_or_else(|| invalid("payload is not base64 encoded"))?;
    if mime_type.is_empty() || !mime_type.contains('/') {
        return Err(invalid("missing MIME type"));
    }
    if payload.is_empty() {
        return Err(invalid("empty payload"));
    }

    let bytes = PAYLOAD_ENGINE
        .decode(payload)
        .map_err(|e| VerifierError::InvalidMedia(format!("bad base64 payload: {}", e)))?;

    Ok(MediaAttachment {
        mime_type: mime_type.to_string(),
        bytes,
    })
}

/// Renders the prompt sent to the scoring model.
pub fn render_prompt(request: &VerificationRequest, media: &MediaAttachment) -> String {
    format!(
        "You are an expert in detecting fraudulent ad views. You are given a video of the ad \
         being watched, as well as mouse and keyboard activity during the ad view. Based on this \
         information, you will determine whether the ad view was likely fraudulent or not.\n\n\
         Here is the video of the ad view: [media {} ({} bytes), attached as adViewVideoDataUri]\n\
         Here is the mouse activity during the ad view: {}\n\
         Here is the keyboard activity during the ad view: {}\n\
         Here is the metadata about the ad being viewed: {}\n",
        media.mime_type,
        media.bytes.len(),
        request.mouse_activity_json,
        request.keyboard_activity_json,
        request.ad_metadata_json,
    )
}

#[derive(Serialize)]
struct ScoringPayload<'a> {
    prompt: String,
    input: &'a VerificationRequest,
}

/// HTTP client for the scoring endpoint.
#[derive(Debug)]
pub struct ScoringVerifier {
    endpoint: Url,
    client: reqwest::Client,
}

impl ScoringVerifier {
    /// Creates a scoring client.
    ///
    /// # Arguments
    ///
    /// * `endpoint` - Scoring endpoint URL
    /// * `timeout` - Per-request timeout
    pub fn new(endpoint: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            endpoint: Url::parse(endpoint)?,
            client,
        })
    }

    /// Scores a view.
    ///
    /// The recording is validated before anything is sent.
    pub async fn score(&self, request: &VerificationRequest) -> Result<VerificationVerdict, VerifierError> {
        let media = parse_data_uri(&request.ad_view_video_data_uri)?;
        let payload = ScoringPayload {
            prompt: render_prompt(request, &media),
            input: request,
        };

        debug!("POST {} ({} byte recording)", self.endpoint, media.bytes.len());
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(VerifierError::Endpoint {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&body).map_err(|e| VerifierError::InvalidVerdict(format!("{}: {}", e, body)))
    }
}
