//! Cursor manager: atomic block commits and rollbacks against the store.
//!
//! Two phases. In `Forward`, every block commit writes the block's rows and
//! the new cursor in one store transaction. An undo signal switches to
//! `RollingBack` until the store has reverted the journal and rewritten the
//! cursor, then returns to `Forward`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::cursor::Cursor;
use crate::error::IndexerError;
use crate::model::RowWrite;
use crate::retry::RetryPolicy;
use crate::store::SinkStore;
use crate::types::{BlockData, BlockRef, StartPosition, UndoSignal};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CursorPhase {
    Forward,
    RollingBack,
}

pub struct CursorManager {
    store: Arc<dyn SinkStore>,
    retry: RetryPolicy,
    current: Option<Cursor>,
    phase: CursorPhase,
}

impl CursorManager {
    /// Load the persisted cursor from `store`.
    pub async fn load(store: Arc<dyn SinkStore>, retry: RetryPolicy) -> Result<Self, IndexerError> {
        let current = retry.run("load_cursor", || store.load_cursor()).await?;
        match &current {
            Some(c) => tracing::info!(block = c.block_number, hash = %c.block_hash, "Resuming from cursor"),
            None => tracing::info!("No cursor persisted, starting fresh"),
        }
        Ok(Self {
            store,
            retry,
            current,
            phase: CursorPhase::Forward,
        })
    }

    pub fn current(&self) -> Option<&Cursor> {
        self.current.as_ref()
    }

    pub fn phase(&self) -> CursorPhase {
        self.phase
    }

    /// Where to (re)connect the stream: right after the cursor, or at
    /// `start_block` on a fresh store.
    pub fn start_position(&self, start_block: Option<u64>) -> StartPosition {
        match (&self.current, start_block) {
            (Some(c), _) => c.start_position(),
            (None, Some(n)) => StartPosition::Block(n),
            (None, None) => StartPosition::Genesis,
        }
    }

    /// Reject blocks that would move the cursor backwards.
    pub fn check_forward(&self, block: &BlockRef) -> Result<(), IndexerError> {
        match &self.current {
            Some(c) if !c.admits(block) => Err(IndexerError::CursorMismatch {
                cursor_block: c.block_number,
                received: block.number,
            }),
            _ => Ok(()),
        }
    }

    /// Commit `writes` for `data`'s block together with the advanced cursor.
    ///
    /// The store commit is one transaction, so retrying it after a transient
    /// failure cannot double-apply.
    pub async fn commit(&mut self, data: &BlockData, writes: &[RowWrite]) -> Result<(), IndexerError> {
        self.check_forward(&data.block)?;
        let next = Cursor::after_block(data);
        self.retry
            .run("commit_block", || self.store.commit_block(&next, writes))
            .await?;
        self.current = Some(next);
        Ok(())
    }

    /// Revert all state at or after `signal.target` and move the cursor there.
    pub async fn rollback(&mut self, signal: &UndoSignal) -> Result<u64, IndexerError> {
        let target = signal.target.number;
        match &self.current {
            None => {
                return Err(IndexerError::Rollback {
                    target,
                    reason: "undo signal received before any block was committed".into(),
                })
            }
            Some(c) if target > c.block_number => {
                return Err(IndexerError::CursorMismatch {
                    cursor_block: c.block_number,
                    received: target,
                })
            }
            Some(_) => {}
        }

        self.phase = CursorPhase::RollingBack;
        let next = Cursor::after_undo(signal);
        let reverted = self
            .retry
            .run("rollback", || self.store.rollback_to(target, &next))
            .await
            .map_err(|e| match e {
                e @ IndexerError::Rollback { .. } => e,
                other => IndexerError::Rollback {
                    target,
                    reason: other.to_string(),
                },
            })?;

        tracing::warn!(target, reverted, hash = %signal.target.hash, "Rolled back to block");
        self.current = Some(next);
        self.phase = CursorPhase::Forward;
        Ok(reverted)
    }
}
