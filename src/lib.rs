//! AdWatch Service Library
//!
//! This crate provides the AdWatch rewards service: a catalog of ads users
//! watch for money, server-tracked watch sessions, view verification, a
//! per-user reward ledger and payouts through the Flutterwave transfers API.

pub mod api;
pub mod app;
pub mod catalog;
pub mod config;
pub mod ledger;
pub mod payout;
pub mod provider_client;
pub mod storage;
pub mod verifier;
pub mod viewer;

// Re-export commonly used types
pub use app::AppState;
pub use catalog::{AdCatalog, Advertisement};
pub use config::{Config, SettlementMode, VerifierMode};
pub use ledger::{Ledger, LedgerBook, LedgerSnapshot, Transaction, TransactionStatus};
pub use payout::{PayoutError, PayoutInitiator, PayoutMethod};
pub use provider_client::{ProviderClient, ProviderCredentials};
pub use storage::KvStore;
pub use verifier::{ViewVerifier, VerificationRequest, VerificationVerdict};
pub use viewer::{ViewSessionStore, ViewState};
