//! REST API Server Module
//!
//! This module provides the REST API of the AdWatch service: the ad catalog,
//! watch sessions and reward claims, the user wallet, and the payout
//! passthrough used by the wallet client.

// Envelope, rejection handling and route table
mod generic;

// Catalog, watch session and wallet handlers
mod wallet;

// Payout passthrough and provider webhook
mod transfer;

pub use generic::ApiServer;
#[allow(unused_imports)]
pub use generic::ApiResponse;
#[allow(unused_imports)]
pub use transfer::{
    webhook_hash_matches, TransferErrorResponse, TransferResponse, TRANSFER_INITIATED_MESSAGE, WEBHOOK_HASH_HEADER,
};
#[allow(unused_imports)]
pub use wallet::{AdPage, ClaimResponse, SessionResponse, WalletResponse, DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT};
