//! Payout transaction records and their status transitions.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Payout status.
///
/// Transitions: `Pending -> Completed`, `Pending -> Failed`. Terminal states
/// never change again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionStatus {
    Completed,
    Pending,
    Failed,
}

impl TransactionStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }

    pub fn can_transition_to(self, next: TransactionStatus) -> bool {
        matches!(
            (self, next),
            (TransactionStatus::Pending, TransactionStatus::Completed)
                | (TransactionStatus::Pending, TransactionStatus::Failed)
        )
    }
}

/// One payout attempt, as shown in the transaction history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// RFC 3339 timestamp of the attempt
    pub id: String,
    /// Amount in the payout currency
    pub amount: f64,
    /// Human-readable date, e.g. `Oct 18, 2026, 3:04 PM`
    pub date: String,
    pub status: TransactionStatus,
    /// Merchant reference sent to the provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    /// Provider transfer id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transfer_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl Transaction {
    /// Creates a record stamped with `at`.
    pub fn new(amount: f64, status: TransactionStatus, at: DateTime<Utc>) -> Self {
        Self {
            id: at.to_rfc3339_opts(SecondsFormat::Millis, true),
            amount,
            date: format_display_date(at),
            status,
            reference: None,
            transfer_id: None,
            failure_reason: None,
        }
    }

    /// Applies a status transition.
    ///
    /// # Returns
    ///
    /// * `true` - Status changed
    /// * `false` - Transition not allowed; record untouched
    pub fn transition(&mut self, next: TransactionStatus, failure_reason: Option<String>) -> bool {
        if !self.status.can_transition_to(next) {
            return false;
        }
        self.status = next;
        if next == TransactionStatus::Failed {
            self.failure_reason = failure_reason;
        }
        true
    }
}

/// Formats a timestamp the way the wallet history shows it.
pub fn format_display_date(at: DateTime<Utc>) -> String {
    at.format("%b %-d, %Y, %-I:%M %p").to_string()
}
