//! Key/value persistence behind the cache.
//!
//! Entries live in one of two independently addressable stores, selected by
//! [`StorageClass`]:
//!
//! - **Session**: lives as long as the process. [`MemoryStorage`] is the
//!   usual implementation.
//! - **Durable**: survives restarts. [`FileStorage`] persists to a JSON file.
//!
//! Both implement the synchronous [`Storage`] trait. A single `get`, `set` or
//! `remove` is atomic from the cache's point of view, so interleaved calls
//! never observe a partial write.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;

mod file;
mod memory;

pub use file::FileStorage;
pub use memory::MemoryStorage;

/// Errors raised by a storage backend.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage I/O error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("storage file {} is not a JSON object: {source}", .path.display())]
    Format {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize value for storage: {0}")]
    Serialize(#[source] serde_json::Error),
}

/// Lifetime class of a cache entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageClass {
    /// Cleared with the process; never garbage-collected by the cache.
    #[default]
    Session,
    /// Persists across runs; orphans are removed at teardown.
    Durable,
}

impl StorageClass {
    pub const ALL: [StorageClass; 2] = [StorageClass::Session, StorageClass::Durable];

    pub fn as_str(self) -> &'static str {
        match self {
            StorageClass::Session => "session",
            StorageClass::Durable => "durable",
        }
    }
}

impl std::fmt::Display for StorageClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A synchronous string key/value store.
///
/// Keys are enumerable by index through [`len`](Self::len) and
/// [`key_at`](Self::key_at). Indices are only stable until the next write.
pub trait Storage: Send + Sync {
    /// Returns the raw value stored under `key`.
    fn get(&self, key: &str) -> Option<String>;

    /// Stores `value` under `key`, replacing any previous value.
    fn set(&self, key: &str, value: String) -> Result<(), StorageError>;

    /// Removes `key`. Removing an absent key is not an error.
    fn remove(&self, key: &str) -> Result<(), StorageError>;

    /// Number of stored keys.
    fn len(&self) -> usize;

    /// Returns the key at position `index`, if in range.
    fn key_at(&self, index: usize) -> Option<String>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of every key currently stored.
    ///
    /// The default walks [`key_at`](Self::key_at) index by index; stores
    /// that can list their keys in one pass should override it.
    fn keys(&self) -> Vec<String> {
        (0..self.len()).filter_map(|i| self.key_at(i)).collect()
    }
}

/// The pair of stores the cache writes to, one per [`StorageClass`].
#[derive(Clone)]
pub struct Storages {
    session: Arc<dyn Storage>,
    durable: Arc<dyn Storage>,
}

impl Storages {
    pub fn new(session: Arc<dyn Storage>, durable: Arc<dyn Storage>) -> Self {
        Self { session, durable }
    }

    /// Two independent in-memory stores. Nothing survives the process.
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(MemoryStorage::new()),
            Arc::new(MemoryStorage::new()),
        )
    }

    pub fn get(&self, class: StorageClass) -> &dyn Storage {
        match class {
            StorageClass::Session => self.session.as_ref(),
            StorageClass::Durable => self.durable.as_ref(),
        }
    }
}

impl Default for Storages {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl std::fmt::Debug for Storages {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storages")
            .field("session_len", &self.session.len())
            .field("durable_len", &self.durable.len())
            .finish()
    }
}
