//! In-memory storage backend.
//!
//! Keeps projected rows, the rollback journal, the content cache, and the
//! cursor behind one mutex, so every commit and rollback is atomic.
//! All data is lost when the process exits.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use spacesink_core::cursor::Cursor;
use spacesink_core::error::IndexerError;
use spacesink_core::model::{JournalEntry, Row, RowKey, RowSet, RowWrite, Table};
use spacesink_core::store::{horizon_error, CacheEntry, ContentCacheStore, SinkStore};

#[derive(Default)]
struct State {
    rows: RowSet,
    journal: Vec<JournalEntry>,
    /// Lowest block still covered by the journal.
    journal_horizon: u64,
    cache: HashMap<String, CacheEntry>,
    cursor: Option<Cursor>,
    failing_commits: u32,
}

/// In-memory sink storage.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, State>, IndexerError> {
        self.state
            .lock()
            .map_err(|_| IndexerError::Storage("memory store lock poisoned".into()))
    }

    /// Make the next `n` commits fail with a transient storage error.
    #[cfg(any(test, feature = "test-util"))]
    pub fn fail_next_commits(&self, n: u32) {
        if let Ok(mut s) = self.state() {
            s.failing_commits = n;
        }
    }

    /// Snapshot of all projected rows.
    pub fn rows(&self) -> RowSet {
        self.state().map(|s| s.rows.clone()).unwrap_or_default()
    }

    /// Projected rows of one table, in key order.
    pub fn table_rows(&self, table: Table) -> Vec<Row> {
        self.state()
            .map(|s| s.rows.table(table).cloned().collect())
            .unwrap_or_default()
    }

    pub fn journal_len(&self) -> usize {
        self.state().map(|s| s.journal.len()).unwrap_or(0)
    }
}

#[async_trait]
impl SinkStore for MemoryStore {
    async fn load_cursor(&self) -> Result<Option<Cursor>, IndexerError> {
        Ok(self.state()?.cursor.clone())
    }

    async fn commit_block(&self, cursor: &Cursor, writes: &[RowWrite]) -> Result<(), IndexerError> {
        let mut s = self.state()?;
        if s.failing_commits > 0 {
            s.failing_commits -= 1;
            return Err(IndexerError::Storage("injected commit failure".into()));
        }

        let state = &mut *s;
        for write in writes {
            if let Some(before) = state.rows.apply(write) {
                state.journal.push(JournalEntry {
                    block_number: cursor.block_number,
                    key: write.key().clone(),
                    before,
                });
            }
        }
        state.cursor = Some(cursor.clone());
        Ok(())
    }

    async fn rollback_to(&self, target: u64, cursor: &Cursor) -> Result<u64, IndexerError> {
        let mut s = self.state()?;
        let state = &mut *s;
        if target < state.journal_horizon {
            return Err(horizon_error(target, state.journal_horizon));
        }

        let keep = state.journal.partition_point(|e| e.block_number < target);
        let undone: Vec<JournalEntry> = state.journal.drain(keep..).collect();
        let reverted = undone.len() as u64;
        for entry in undone.into_iter().rev() {
            state.rows.restore(&entry.key, entry.before);
        }
        state.cursor = Some(cursor.clone());
        Ok(reverted)
    }

    async fn get_row(&self, key: &RowKey) -> Result<Option<Row>, IndexerError> {
        Ok(self.state()?.rows.get(key).cloned())
    }

    async fn prune_journal(&self, below_block: u64) -> Result<u64, IndexerError> {
        let mut s = self.state()?;
        let cut = s.journal.partition_point(|e| e.block_number < below_block);
        s.journal.drain(..cut);
        s.journal_horizon = s.journal_horizon.max(below_block);
        Ok(cut as u64)
    }

    async fn reset(&self) -> Result<(), IndexerError> {
        let mut s = self.state()?;
        *s = State::default();
        Ok(())
    }
}

#[async_trait]
impl ContentCacheStore for MemoryStore {
    async fn get_content(&self, uri: &str) -> Result<Option<CacheEntry>, IndexerError> {
        Ok(self.state()?.cache.get(uri).cloned())
    }

    async fn insert_content(&self, entry: &CacheEntry) -> Result<bool, IndexerError> {
        let mut s = self.state()?;
        if s.cache.contains_key(&entry.uri) {
            return Ok(false);
        }
        s.cache.insert(entry.uri.clone(), entry.clone());
        Ok(true)
    }
}
