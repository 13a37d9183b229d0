//! Sink cursor: the last stream position whose effects are durably committed.

use serde::{Deserialize, Serialize};

use crate::types::{BlockData, BlockRef, StartPosition, UndoSignal};

/// Persisted stream position.
///
/// `block_number` is the block the cursor token belongs to. After a forward
/// commit it is the applied block; after a rollback it is the rollback target,
/// which has been reverted and which the stream may deliver again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    /// Opaque token issued by the stream.
    pub token: String,
    pub block_number: u64,
    pub block_hash: String,
    /// `false` when `block_number` was reverted by an undo and not re-applied.
    #[serde(default = "applied_default")]
    pub applied: bool,
}

fn applied_default() -> bool {
    true
}

impl Cursor {
    pub fn new(token: impl Into<String>, block_number: u64, block_hash: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            block_number,
            block_hash: block_hash.into(),
            applied: true,
        }
    }

    /// Cursor to persist after `data` is applied.
    pub fn after_block(data: &BlockData) -> Self {
        Self::new(data.cursor.clone(), data.block.number, data.block.hash.clone())
    }

    /// Cursor to persist after rolling back to `signal.target`.
    pub fn after_undo(signal: &UndoSignal) -> Self {
        Self {
            applied: false,
            ..Self::new(
                signal.cursor.clone(),
                signal.target.number,
                signal.target.hash.clone(),
            )
        }
    }

    /// Highest block whose effects are in the store, if any.
    pub fn last_applied_block(&self) -> Option<u64> {
        if self.applied {
            Some(self.block_number)
        } else {
            self.block_number.checked_sub(1)
        }
    }

    /// Whether every block up to and including `block` has been applied.
    pub fn has_applied(&self, block: u64) -> bool {
        self.last_applied_block().is_some_and(|last| last >= block)
    }

    /// Forward blocks may repeat the cursor's block (idempotent re-delivery)
    /// but never go below it.
    pub fn admits(&self, block: &BlockRef) -> bool {
        block.number >= self.block_number
    }

    /// Position to reconnect the stream from.
    pub fn start_position(&self) -> StartPosition {
        StartPosition::Cursor(self.token.clone())
    }
}
