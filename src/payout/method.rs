//! Payout method (bank account or e-wallet) and its validation rules.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::bank_codes::is_e_wallet;

/// `paymentMethod` value for bank accounts.
pub const METHOD_BANK: &str = "bank";
/// `paymentMethod` value for e-wallets.
pub const METHOD_EWALLET: &str = "ewallet";

/// Length of a NUBAN account number.
pub const ACCOUNT_NUMBER_LEN: usize = 10;

/// Destination for reward cash-out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayoutMethod {
    pub account_holder: String,
    pub account_number: String,
    /// Bank or e-wallet provider display name
    pub bank_name: String,
    /// `"bank"` or `"ewallet"`
    pub payment_method: String,
}

/// Reasons a payout method is refused.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PayoutMethodError {
    #[error("Name must be at least 2 characters.")]
    HolderTooShort,
    #[error("Enter a valid 10-digit NUBAN.")]
    InvalidAccountNumber,
    #[error("Please select a bank.")]
    MissingBank,
    #[error("Unknown payment method '{0}'")]
    UnknownMethod(String),
    #[error("'{0}' is not an e-wallet provider")]
    NotAnEWallet(String),
    #[error("'{0}' is an e-wallet provider; choose the e-wallet payment method")]
    NotABank(String),
}

impl PayoutMethod {
    /// Checks the fields the wallet form enforces.
    pub fn validate(&self) -> Result<(), PayoutMethodError> {
        if self.account_holder.trim().chars().count() < 2 {
            return Err(PayoutMethodError::HolderTooShort);
        }
        let number = &self.account_number;
        if number.len() != ACCOUNT_NUMBER_LEN || !number.bytes().all(|b| b.is_ascii_digit()) {
            return Err(PayoutMethodError::InvalidAccountNumber);
        }
        if self.bank_name.trim().chars().count() < 3 {
            return Err(PayoutMethodError::MissingBank);
        }

        match self.payment_method.as_str() {
            METHOD_BANK if is_e_wallet(&self.bank_name) => {
                Err(PayoutMethodError::NotABank(self.bank_name.clone()))
            }
            METHOD_EWALLET if !is_e_wallet(&self.bank_name) => {
                Err(PayoutMethodError::NotAnEWallet(self.bank_name.clone()))
            }
            METHOD_BANK | METHOD_EWALLET => Ok(()),
            other => Err(PayoutMethodError::UnknownMethod(other.to_string())),
        }
    }

    /// Account number with all but the last four digits hidden.
    pub fn masked_account_number(&self) -> String {
        let digits: Vec<char> = self.account_number.chars().collect();
        let tail: String = digits[digits.len().saturating_sub(4)..].iter().collect();
        format!("******{}", tail)
    }

    /// Copy safe to return to clients.
    pub fn masked(&self) -> Self {
        Self {
            account_number: self.masked_account_number(),
            ..self.clone()
        }
    }
}
