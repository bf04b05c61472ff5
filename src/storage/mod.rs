//! Storage Module
//!
//! Durable string-keyed storage used to mirror ledger state.

pub mod kv;

pub use kv::{KvStore, StorageError};
