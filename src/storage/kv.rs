//! Key-Value Storage
//!
//! A string-keyed store holding JSON-encoded values. Every write is flushed
//! to a single JSON file when a path is configured; without a path the store
//! lives in memory only.
//!
//! Values are opaque strings: each slot is read and written independently and
//! carries no schema version.

use anyhow::Context;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

/// Errors raised when persisting the store.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to write store file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to encode store contents: {0}")]
    Encode(#[from] serde_json::Error),
}

/// String-keyed store, optionally backed by a JSON file.
pub struct KvStore {
    /// Backing file (None = memory only)
    path: Option<PathBuf>,
    /// Map of key -> JSON-encoded value
    entries: RwLock<HashMap<String, String>>,
}

impl KvStore {
    /// Creates a store that is never written to disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Opens a file-backed store.
    ///
    /// A missing file starts an empty store; the file is created on the first
    /// write. Missing parent directories are created here.
    ///
    /// # Returns
    ///
    /// * `Ok(KvStore)` - Store loaded (or empty)
    /// * `Err(anyhow::Error)` - The directory could not be created, or the
    ///   file exists but could not be read or parsed
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create store directory '{}'", parent.display())
            })?;
        }
        let entries = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            if content.trim().is_empty() {
                HashMap::new()
            } else {
                serde_json::from_str(&content).map_err(|e| {
                    anyhow::anyhow!("Store file '{}' is not a JSON object of strings: {}", path.display(), e)
                })?
            }
        } else {
            HashMap::new()
        };

        Ok(Self {
            path: Some(path),
            entries: RwLock::new(entries),
        })
    }

    /// Reads a raw value.
    pub async fn get(&self, key: &str) -> Option<String> {
        let entries = self.entries.read().await;
        entries.get(key).cloned()
    }

    /// Writes a raw value and flushes the store.
    ///
    /// The in-memory value is updated even when the flush fails.
    pub async fn set(&self, key: &str, value: String) -> Result<(), StorageError> {
        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), value);
        self.flush(&entries).await
    }

    /// Lists keys ending with `suffix`.
    pub async fn keys_with_suffix(&self, suffix: &str) -> Vec<String> {
        let entries = self.entries.read().await;
        let mut keys: Vec<String> = entries
            .keys()
            .filter(|key| key.ends_with(suffix))
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    async fn flush(&self, entries: &HashMap<String, String>) -> Result<(), StorageError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let content = serde_json::to_string_pretty(entries)?;
        // Write-then-rename; readers never see a truncated file
        let tmp_path = path.with_extension("json.tmp");
        let io_err = |source| StorageError::Io {
            path: path.display().to_string(),
            source,
        };
        tokio::fs::write(&tmp_path, content).await.map_err(io_err)?;
        tokio::fs::rename(&tmp_path, path).await.map_err(io_err)?;
        debug!("Flushed {} entries to {}", entries.len(), path.display());
        Ok(())
    }
}
