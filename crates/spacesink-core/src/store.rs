//! Persistence contracts.
//!
//! Implementations: `MemoryStore`, `SqliteStore`, and `PostgresStore` in
//! `spacesink-storage`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::cursor::Cursor;
use crate::error::IndexerError;
use crate::model::{Row, RowKey, RowWrite};

/// Projected state, block journal, and cursor.
#[async_trait]
pub trait SinkStore: Send + Sync {
    /// Load the persisted cursor (`None` on a fresh store).
    async fn load_cursor(&self) -> Result<Option<Cursor>, IndexerError>;

    /// Apply `writes` for block `cursor.block_number`, journal their
    /// before-images, and persist `cursor`, all in one transaction.
    async fn commit_block(&self, cursor: &Cursor, writes: &[RowWrite]) -> Result<(), IndexerError>;

    /// Revert every journaled write made at or after block `target` and persist
    /// `cursor`, in one transaction. Returns the number of writes reverted.
    ///
    /// Fails with `IndexerError::Rollback`, leaving the store untouched, when
    /// `target` is below the journal horizon (see [`prune_journal`]).
    ///
    /// [`prune_journal`]: SinkStore::prune_journal
    async fn rollback_to(&self, target: u64, cursor: &Cursor) -> Result<u64, IndexerError>;

    /// Read one projected row.
    async fn get_row(&self, key: &RowKey) -> Result<Option<Row>, IndexerError>;

    /// Drop journal entries for blocks below `below_block` and raise the
    /// persisted journal horizon to it; blocks below the horizon can no longer
    /// be rolled back. Returns the number of entries removed.
    async fn prune_journal(&self, below_block: u64) -> Result<u64, IndexerError>;

    /// Truncate projected tables, journal, content cache, and cursor.
    async fn reset(&self) -> Result<(), IndexerError>;
}

/// Error for an undo deeper than the retained journal.
pub fn horizon_error(target: u64, horizon: u64) -> IndexerError {
    IndexerError::Rollback {
        target,
        reason: format!("journal only covers blocks from {horizon}; rows written before it cannot be reverted"),
    }
}

/// A durable content-cache record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Content uri (`ipfs://…`).
    pub uri: String,
    /// Decoded payload; `None` when `is_errored`.
    pub json: Option<serde_json::Value>,
    pub is_errored: bool,
}

impl CacheEntry {
    pub fn decoded(uri: impl Into<String>, json: serde_json::Value) -> Self {
        Self {
            uri: uri.into(),
            json: Some(json),
            is_errored: false,
        }
    }

    pub fn failed(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            json: None,
            is_errored: true,
        }
    }
}

/// Insert-only content cache table.
#[async_trait]
pub trait ContentCacheStore: Send + Sync {
    async fn get_content(&self, uri: &str) -> Result<Option<CacheEntry>, IndexerError>;

    /// Insert `entry` unless the uri is already cached. Returns `true` if a
    /// row was inserted; existing rows are never modified.
    async fn insert_content(&self, entry: &CacheEntry) -> Result<bool, IndexerError>;
}
