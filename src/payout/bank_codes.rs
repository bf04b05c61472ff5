//! Provider bank codes
//!
//! Maps bank and e-wallet display names to the provider's bank codes. A name
//! missing from this table cannot receive payouts.

/// Display name -> provider bank code.
pub const BANK_CODES: [(&str, &str); 22] = [
    ("Access Bank", "044"),
    ("Fidelity Bank", "070"),
    ("First City Monument Bank (FCMB)", "214"),
    ("First Bank of Nigeria", "011"),
    ("Guaranty Trust Bank (GTB)", "058"),
    ("Union Bank of Nigeria", "032"),
    ("United Bank for Africa (UBA)", "033"),
    ("Zenith Bank", "057"),
    ("Citibank Nigeria", "023"),
    ("Ecobank Nigeria", "050"),
    ("Heritage Bank", "030"),
    ("Keystone Bank", "082"),
    ("Kuda Bank", "50211"),
    ("Opay", "999991"),
    ("Palmpay", "999992"),
    ("Polaris Bank", "076"),
    ("Stanbic IBTC Bank", "221"),
    ("Standard Chartered Bank", "068"),
    ("Sterling Bank", "232"),
    ("SunTrust Bank Nigeria", "100"),
    ("Titan Trust Bank", "102"),
    ("Wema Bank", "035"),
];

/// Providers offered under the e-wallet payment method.
pub const E_WALLET_PROVIDERS: [&str; 2] = ["Opay", "Palmpay"];

/// Looks up the provider code for a bank display name (exact match).
pub fn bank_code(bank_name: &str) -> Option<&'static str> {
    BANK_CODES
        .iter()
        .find(|(name, _)| *name == bank_name)
        .map(|(_, code)| *code)
}

pub fn is_e_wallet(bank_name: &str) -> bool {
    E_WALLET_PROVIDERS.contains(&bank_name)
}
