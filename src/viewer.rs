//! Watch Session Storage Module
//!
//! Server-side stand-in for ad playback. A session opens when a user starts an
//! ad and unlocks once the ad's duration has elapsed; only an unlocked session
//! can be claimed, and only once.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::catalog::Advertisement;

// ============================================================================
// DATA STRUCTURES
// ============================================================================

/// Observable state of a watch session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViewState {
    /// The ad is still "playing"; claiming is locked
    Playing,
    /// Playback finished; the reward can be claimed
    Unlocked,
    /// A claim is being verified
    Claiming,
    /// The reward was granted
    Claimed,
    /// The viewer was torn down before claiming
    Cancelled,
}

/// Lifecycle stage as stored. `Active` resolves to `Playing` or `Unlocked`
/// depending on the clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Active,
    Claiming,
    Claimed,
    Cancelled,
}

/// A single watch session.
#[derive(Debug, Clone)]
pub struct ViewSession {
    pub session_id: String,
    pub user_id: String,
    pub ad_id: String,
    /// Reward the ad pays once claimed
    pub reward: f64,
    pub started_at: DateTime<Utc>,
    pub unlocks_at: DateTime<Utc>,
    stage: Stage,
}

impl ViewSession {
    /// Resolves the session state at `now`.
    pub fn state_at(&self, now: DateTime<Utc>) -> ViewState {
        match self.stage {
            Stage::Active if now < self.unlocks_at => ViewState::Playing,
            Stage::Active => ViewState::Unlocked,
            Stage::Claiming => ViewState::Claiming,
            Stage::Claimed => ViewState::Claimed,
            Stage::Cancelled => ViewState::Cancelled,
        }
    }

    /// Whole seconds of playback left at `now` (0 once unlocked).
    pub fn remaining_secs_at(&self, now: DateTime<Utc>) -> i64 {
        let remaining = self.unlocks_at - now;
        // Round up so "0 seconds left" only shows once actually unlocked
        let millis = remaining.num_milliseconds().max(0);
        (millis + 999) / 1000
    }
}

/// Errors raised by session transitions.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ViewError {
    #[error("Watch session not found")]
    SessionNotFound,
    #[error("Ad is still playing ({remaining_secs}s remaining)")]
    StillPlaying { remaining_secs: i64 },
    #[error("A claim for this session is already being processed")]
    ClaimInProgress,
    #[error("Reward for this session was already claimed")]
    AlreadyClaimed,
    #[error("Watch session was cancelled")]
    Cancelled,
}

// ============================================================================
// STORAGE IMPLEMENTATION
// ============================================================================

/// In-memory storage for watch sessions, keyed by session id.
///
/// Lookups are scoped to the owning user: a session id presented by another
/// user is reported as not found.
pub struct ViewSessionStore {
    sessions: RwLock<HashMap<String, ViewSession>>,
}

impl ViewSessionStore {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Opens a session for `ad` starting now.
    pub async fn start(&self, user_id: &str, ad: &Advertisement) -> ViewSession {
        self.start_at(user_id, ad, Utc::now()).await
    }

    /// Opens a session for `ad` starting at `now`.
    pub async fn start_at(&self, user_id: &str, ad: &Advertisement, now: DateTime<Utc>) -> ViewSession {
        let session = ViewSession {
            session_id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            ad_id: ad.id.clone(),
            reward: ad.reward,
            started_at: now,
            unlocks_at: now + Duration::seconds(i64::from(ad.duration)),
            stage: Stage::Active,
        };

        let mut sessions = self.sessions.write().await;
        sessions.insert(session.session_id.clone(), session.clone());
        session
    }

    /// Gets a session owned by `user_id`.
    pub async fn get(&self, user_id: &str, session_id: &str) -> Option<ViewSession> {
        let sessions = self.sessions.read().await;
        sessions
            .get(session_id)
            .filter(|session| session.user_id == user_id)
            .cloned()
    }

    /// Moves an unlocked session into `Claiming`.
    ///
    /// Only one caller can win this transition; the rest see `ClaimInProgress`
    /// or `AlreadyClaimed`.
    ///
    /// # Returns
    ///
    /// * `Ok(ViewSession)` - Session now claiming
    /// * `Err(ViewError)` - Not found, still playing, cancelled or already claimed
    pub async fn begin_claim(
        &self,
        user_id: &str,
        session_id: &str,
        now: DateTime<Utc>,
    ) -> Result<ViewSession, ViewError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(session_id)
            .filter(|session| session.user_id == user_id)
            .ok_or(ViewError::SessionNotFound)?;

        match session.state_at(now) {
            ViewState::Unlocked => {
                session.stage = Stage::Claiming;
                Ok(session.clone())
            }
            ViewState::Playing => Err(ViewError::StillPlaying {
                remaining_secs: session.remaining_secs_at(now),
            }),
            ViewState::Claiming => Err(ViewError::ClaimInProgress),
            ViewState::Claimed => Err(ViewError::AlreadyClaimed),
            ViewState::Cancelled => Err(ViewError::Cancelled),
        }
    }

    /// Completes a claim started by [`begin_claim`](Self::begin_claim).
    ///
    /// A rewarded claim is final; a rejected one returns the session to
    /// `Unlocked` so the user can try again.
    pub async fn finish_claim(&self, session_id: &str, rewarded: bool) -> Result<(), ViewError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(session_id).ok_or(ViewError::SessionNotFound)?;
        if session.stage != Stage::Claiming {
            return Err(ViewError::SessionNotFound);
        }
        session.stage = if rewarded { Stage::Claimed } else { Stage::Active };
        Ok(())
    }

    /// Tears a session down before it is claimed.
    pub async fn cancel(&self, user_id: &str, session_id: &str) -> Result<(), ViewError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(session_id)
            .filter(|session| session.user_id == user_id)
            .ok_or(ViewError::SessionNotFound)?;

        match session.stage {
            Stage::Active => {
                session.stage = Stage::Cancelled;
                Ok(())
            }
            Stage::Cancelled => Ok(()),
            Stage::Claiming => Err(ViewError::ClaimInProgress),
            Stage::Claimed => Err(ViewError::AlreadyClaimed),
        }
    }

    /// Drops sessions started more than `max_age` before `now`, whatever
    /// their stage. Abandoned and stuck sessions go with the finished ones.
    pub async fn prune(&self, now: DateTime<Utc>, max_age: Duration) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| now - session.started_at <= max_age);
        before - sessions.len()
    }

    /// Number of sessions held, in any stage.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for ViewSessionStore {
    fn default() -> Self {
        Self::new()
    }
}
