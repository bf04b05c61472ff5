//! Reward Ledger Module
//!
//! Per-user reward state: pending balance, saved payout method and payout
//! history. State is mirrored to the key-value store in three independent
//! slots; a failed write is logged and the in-memory state stays
//! authoritative for the life of the process.
//!
//! Every operation holds the user's ledger lock from the first read to the
//! last write, provider call included, so concurrent rewards for the same
//! user are applied one after the other and none is lost.

mod transaction;

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::config::SettlementMode;
use crate::payout::{PayoutError, PayoutInitiator, PayoutMethod, PayoutMethodError, TransferOutcome};
use crate::storage::KvStore;

pub use transaction::{format_display_date, Transaction, TransactionStatus};

/// Store slot holding the pending balance (JSON number).
pub const BALANCE_SLOT: &str = "adwatch_balance";
/// Store slot holding the payout method (JSON object).
pub const BANK_DETAILS_SLOT: &str = "adwatch_bankDetails";
/// Store slot holding the transaction history (JSON array, newest first).
pub const TRANSACTIONS_SLOT: &str = "adwatch_transactions";

const MAX_USER_ID_LEN: usize = 64;

/// Store key for a user's slot.
pub fn slot_key(user_id: &str, slot: &str) -> String {
    format!("{}:{}", user_id, slot)
}

/// User ids are path segments and key prefixes: 1-64 ASCII letters, digits,
/// `-` or `_`.
pub fn is_valid_user_id(user_id: &str) -> bool {
    !user_id.is_empty()
        && user_id.len() <= MAX_USER_ID_LEN
        && user_id.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

// ============================================================================
// DATA STRUCTURES
// ============================================================================

/// Ledger-level failures. Payout failures are outcomes, not errors.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Reward amount must be a non-negative number (got {0})")]
    InvalidAmount(f64),
    #[error(transparent)]
    InvalidPayoutMethod(#[from] PayoutMethodError),
}

/// Ledger numbers that drive behavior.
#[derive(Debug, Clone, Copy)]
pub struct LedgerSettings {
    /// Payout currency units per reward unit
    pub exchange_rate: f64,
    pub settlement: SettlementMode,
}

/// Point-in-time copy of a user's ledger.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerSnapshot {
    /// Pending balance in the reward currency
    pub balance: f64,
    pub payout_method: Option<PayoutMethod>,
    /// Newest first
    pub transactions: Vec<Transaction>,
}

/// Result of a payout attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum PayoutAttempt {
    /// Provider accepted the transfer
    Sent { transaction: Transaction },
    /// Refused locally or by the provider. `transaction` is present when the
    /// attempt reached the provider and was recorded as `Failed`.
    Failed {
        message: String,
        transaction: Option<Transaction>,
    },
}

impl PayoutAttempt {
    pub fn is_sent(&self) -> bool {
        matches!(self, PayoutAttempt::Sent { .. })
    }
}

/// Result of [`Ledger::add_reward`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RewardOutcome {
    /// No payout method on file: added to the pending balance
    Credited { balance: f64 },
    /// Paid out immediately
    PaidOut { transaction: Transaction },
    /// Immediate payout failed; the balance is unchanged
    PayoutFailed {
        message: String,
        transaction: Option<Transaction>,
    },
    /// Zero reward with a payout method on file: nothing to send
    Skipped,
}

/// Result of [`Ledger::save_payout_method`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveOutcome {
    /// Saved method, account number masked
    pub payout_method: PayoutMethod,
    /// Balance after the save (0 when the outstanding balance was paid out)
    pub balance: f64,
    /// Transfer of the outstanding balance, when there was one
    pub balance_payout: Option<PayoutAttempt>,
}

// ============================================================================
// LEDGER IMPLEMENTATION
// ============================================================================

/// A single user's ledger.
pub struct Ledger {
    user_id: String,
    state: Mutex<LedgerSnapshot>,
    store: Arc<KvStore>,
    payouts: Arc<PayoutInitiator>,
    settings: LedgerSettings,
}

impl Ledger {
    /// Loads a user's ledger from the store.
    ///
    /// Each slot is read on its own; a missing or corrupt slot falls back to
    /// its empty value without affecting the others.
    pub async fn load(
        user_id: &str,
        store: Arc<KvStore>,
        payouts: Arc<PayoutInitiator>,
        settings: LedgerSettings,
    ) -> Self {
        let balance = read_slot::<f64>(&store, &slot_key(user_id, BALANCE_SLOT))
            .await
            .filter(|balance| balance.is_finite() && *balance >= 0.0)
            .unwrap_or(0.0);
        let payout_method = read_slot::<PayoutMethod>(&store, &slot_key(user_id, BANK_DETAILS_SLOT)).await;
        let transactions = read_slot::<Vec<Transaction>>(&store, &slot_key(user_id, TRANSACTIONS_SLOT))
            .await
            .unwrap_or_default();

        debug!(
            "Loaded ledger for {}: balance={} method={} transactions={}",
            user_id,
            balance,
            payout_method.is_some(),
            transactions.len()
        );

        Self {
            user_id: user_id.to_string(),
            state: Mutex::new(LedgerSnapshot {
                balance,
                payout_method,
                transactions,
            }),
            store,
            payouts,
            settings,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub async fn snapshot(&self) -> LedgerSnapshot {
        self.state.lock().await.clone()
    }

    /// Records a reward.
    ///
    /// With a payout method on file the reward is paid out at once (converted
    /// at the exchange rate) and the balance is left alone; otherwise it is
    /// added to the balance.
    ///
    /// # Returns
    ///
    /// * `Ok(RewardOutcome)` - What happened to the reward
    /// * `Err(LedgerError)` - Amount negative or not a number
    pub async fn add_reward(&self, amount: f64) -> Result<RewardOutcome, LedgerError> {
        if !amount.is_finite() || amount < 0.0 {
            return Err(LedgerError::InvalidAmount(amount));
        }

        let mut state = self.state.lock().await;

        let Some(method) = state.payout_method.clone() else {
            state.balance += amount;
            let balance = state.balance;
            self.persist(BALANCE_SLOT, &balance).await;
            info!("Credited {:.2} to {} (balance {:.2})", amount, self.user_id, balance);
            return Ok(RewardOutcome::Credited { balance });
        };

        if amount == 0.0 {
            return Ok(RewardOutcome::Skipped);
        }

        Ok(match self.pay_out(&mut state, amount, &method).await {
            PayoutAttempt::Sent { transaction } => RewardOutcome::PaidOut { transaction },
            PayoutAttempt::Failed { message, transaction } => {
                RewardOutcome::PayoutFailed { message, transaction }
            }
        })
    }

    /// Saves the payout method and flushes any outstanding balance to it.
    ///
    /// The balance is zeroed only after the provider accepted the transfer;
    /// when the payout fails the balance stays as it was.
    pub async fn save_payout_method(&self, method: PayoutMethod) -> Result<SaveOutcome, LedgerError> {
        method.validate()?;

        let mut state = self.state.lock().await;
        state.payout_method = Some(method.clone());
        self.persist(BANK_DETAILS_SLOT, &method).await;
        info!("Saved payout method for {} ({})", self.user_id, method.bank_name);

        let balance_payout = if state.balance > 0.0 {
            let outstanding = state.balance;
            let attempt = self.pay_out(&mut state, outstanding, &method).await;
            if attempt.is_sent() {
                state.balance = 0.0;
                self.persist(BALANCE_SLOT, &0.0_f64).await;
            }
            Some(attempt)
        } else {
            None
        };

        Ok(SaveOutcome {
            payout_method: method.masked(),
            balance: state.balance,
            balance_payout,
        })
    }

    /// Applies a provider settlement verdict to the transaction with
    /// `reference`.
    ///
    /// A pending payout that fails is credited back to the balance (converted
    /// back to the reward currency), so the funds stay claimable.
    ///
    /// # Returns
    ///
    /// * `Some(Transaction)` - The transaction moved to a terminal status
    /// * `None` - Unknown reference, verdict not terminal, or already settled
    pub async fn settle(&self, reference: &str, outcome: &TransferOutcome) -> Option<Transaction> {
        let (next, reason) = match outcome {
            TransferOutcome::Successful => (TransactionStatus::Completed, None),
            TransferOutcome::Failed(reason) => (TransactionStatus::Failed, Some(reason.clone())),
            TransferOutcome::InFlight => return None,
        };

        let mut state = self.state.lock().await;
        let transaction = state
            .transactions
            .iter_mut()
            .find(|tx| tx.reference.as_deref() == Some(reference))?;

        if !transaction.transition(next, reason) {
            debug!("Ignoring {:?} for {} (already {:?})", next, reference, transaction.status);
            return None;
        }
        let settled = transaction.clone();

        info!("Transfer {} for {} settled as {:?}", reference, self.user_id, settled.status);
        let transactions = state.transactions.clone();
        self.persist(TRANSACTIONS_SLOT, &transactions).await;

        if settled.status == TransactionStatus::Failed {
            let refund = settled.amount / self.settings.exchange_rate;
            if refund.is_finite() && refund > 0.0 {
                state.balance += refund;
                let balance = state.balance;
                self.persist(BALANCE_SLOT, &balance).await;
                info!(
                    "Returned {:.2} to {} after failed transfer {} (balance {:.2})",
                    refund, self.user_id, reference, balance
                );
            }
        }
        Some(settled)
    }

    /// `(reference, transfer_id)` of every transaction still pending.
    pub async fn pending_transfers(&self) -> Vec<(String, u64)> {
        let state = self.state.lock().await;
        state
            .transactions
            .iter()
            .filter(|tx| tx.status == TransactionStatus::Pending)
            .filter_map(|tx| Some((tx.reference.clone()?, tx.transfer_id?)))
            .collect()
    }

    /// Sends `reward_amount` (converted) to `method` and records the attempt.
    async fn pay_out(&self, state: &mut LedgerSnapshot, reward_amount: f64, method: &PayoutMethod) -> PayoutAttempt {
        let amount = reward_amount * self.settings.exchange_rate;
        let now = Utc::now();

        match self.payouts.initiate(amount, method).await {
            Ok(receipt) => {
                let status = match self.settings.settlement {
                    SettlementMode::OnAcceptance => TransactionStatus::Completed,
                    SettlementMode::Confirmed => TransactionStatus::Pending,
                };
                let mut transaction = Transaction::new(amount, status, now);
                transaction.reference = Some(receipt.reference);
                transaction.transfer_id = Some(receipt.transfer_id);
                self.record(state, transaction.clone()).await;
                info!(
                    "Payout of {} to {} for {} submitted ({:?})",
                    amount, method.bank_name, self.user_id, status
                );
                PayoutAttempt::Sent { transaction }
            }
            Err(err) => {
                let message = err.to_string();
                warn!("Payout of {} for {} failed: {:?}", amount, self.user_id, err);
                let transaction = match err {
                    PayoutError::Rejected(_) | PayoutError::Unexpected { .. } => {
                        let mut transaction = Transaction::new(amount, TransactionStatus::Failed, now);
                        transaction.failure_reason = Some(message.clone());
                        self.record(state, transaction.clone()).await;
                        Some(transaction)
                    }
                    // Refused before reaching the provider: nothing to record
                    _ => None,
                };
                PayoutAttempt::Failed { message, transaction }
            }
        }
    }

    async fn record(&self, state: &mut LedgerSnapshot, transaction: Transaction) {
        state.transactions.insert(0, transaction);
        self.persist(TRANSACTIONS_SLOT, &state.transactions).await;
    }

    async fn persist<T: Serialize + ?Sized>(&self, slot: &str, value: &T) {
        let key = slot_key(&self.user_id, slot);
        let encoded = match serde_json::to_string(value) {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!("Failed to encode {}: {}", key, e);
                return;
            }
        };
        if let Err(e) = self.store.set(&key, encoded).await {
            warn!("Failed to persist {}: {}", key, e);
        }
    }
}

async fn read_slot<T: DeserializeOwned>(store: &KvStore, key: &str) -> Option<T> {
    let raw = store.get(key).await?;
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("Ignoring unreadable slot {}: {}", key, e);
            None
        }
    }
}

// ============================================================================
// LEDGER BOOK
// ============================================================================

/// All users' ledgers, loaded on first use.
pub struct LedgerBook {
    ledgers: RwLock<HashMap<String, Arc<Ledger>>>,
    store: Arc<KvStore>,
    payouts: Arc<PayoutInitiator>,
    settings: LedgerSettings,
}

impl LedgerBook {
    pub fn new(store: Arc<KvStore>, payouts: Arc<PayoutInitiator>, settings: LedgerSettings) -> Self {
        Self {
            ledgers: RwLock::new(HashMap::new()),
            store,
            payouts,
            settings,
        }
    }

    /// Returns the user's ledger, loading it from the store on first access.
    pub async fn ledger(&self, user_id: &str) -> Arc<Ledger> {
        if let Some(ledger) = self.ledgers.read().await.get(user_id) {
            return ledger.clone();
        }

        let mut ledgers = self.ledgers.write().await;
        // Another task may have loaded it between the two locks
        if let Some(ledger) = ledgers.get(user_id) {
            return ledger.clone();
        }
        let ledger = Arc::new(
            Ledger::load(user_id, self.store.clone(), self.payouts.clone(), self.settings).await,
        );
        ledgers.insert(user_id.to_string(), ledger.clone());
        ledger
    }

    /// Reads a user's ledger without caching it.
    ///
    /// Ledgers with state are already cached (loaded at start-up or on their
    /// first write), so an unknown user reads as empty and leaves no entry.
    pub async fn snapshot(&self, user_id: &str) -> LedgerSnapshot {
        if let Some(ledger) = self.ledgers.read().await.get(user_id) {
            return ledger.snapshot().await;
        }
        Ledger::load(user_id, self.store.clone(), self.payouts.clone(), self.settings)
            .await
            .snapshot()
            .await
    }

    /// Number of ledgers held in memory.
    pub async fn len(&self) -> usize {
        self.ledgers.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Loads every ledger that has state in the store.
    ///
    /// # Returns
    ///
    /// Number of ledgers known after loading
    pub async fn load_persisted(&self) -> usize {
        let mut user_ids = BTreeSet::new();
        for slot in [BALANCE_SLOT, BANK_DETAILS_SLOT, TRANSACTIONS_SLOT] {
            let suffix = format!(":{}", slot);
            for key in self.store.keys_with_suffix(&suffix).await {
                if let Some(user_id) = key.strip_suffix(&suffix) {
                    user_ids.insert(user_id.to_string());
                }
            }
        }

        for user_id in &user_ids {
            self.ledger(user_id).await;
        }
        self.ledgers.read().await.len()
    }

    /// Applies a settlement verdict to whichever ledger holds `reference`.
    pub async fn settle(&self, reference: &str, outcome: &TransferOutcome) -> Option<Transaction> {
        for ledger in self.all().await {
            if let Some(transaction) = ledger.settle(reference, outcome).await {
                return Some(transaction);
            }
        }
        None
    }

    /// Polls the provider for every pending transfer and applies terminal
    /// verdicts.
    ///
    /// # Returns
    ///
    /// Number of transactions settled
    pub async fn reconcile_pending(&self) -> usize {
        let mut lookups = Vec::new();
        for ledger in self.all().await {
            for (reference, transfer_id) in ledger.pending_transfers().await {
                let ledger = ledger.clone();
                let payouts = self.payouts.clone();
                lookups.push(async move {
                    match payouts.transfer_status(transfer_id).await {
                        Ok(outcome) => ledger.settle(&reference, &outcome).await.is_some(),
                        Err(e) => {
                            warn!("Could not reconcile transfer {} ({}): {}", reference, transfer_id, e);
                            false
                        }
                    }
                });
            }
        }

        let settled = futures::future::join_all(lookups)
            .await
            .into_iter()
            .filter(|settled| *settled)
            .count();
        if settled > 0 {
            info!("Reconciled {} pending transfer(s)", settled);
        }
        settled
    }

    async fn all(&self) -> Vec<Arc<Ledger>> {
        self.ledgers.read().await.values().cloned().collect()
    }
}
