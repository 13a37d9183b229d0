//! Stream message types shared by the sink and its stream sources.

use serde::{Deserialize, Serialize};

// ─── BlockRef ─────────────────────────────────────────────────────────────────

/// A block as identified by the upstream stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRef {
    /// Block number.
    pub number: u64,
    /// Block hash (`0x…`).
    pub hash: String,
    /// Unix timestamp of the block (seconds since epoch).
    #[serde(default)]
    pub timestamp: i64,
}

impl BlockRef {
    pub fn new(number: u64, hash: impl Into<String>) -> Self {
        Self {
            number,
            hash: hash.into(),
            timestamp: 0,
        }
    }
}

impl std::fmt::Display for BlockRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{} ({})", self.number, self.hash)
    }
}

// ─── Messages ─────────────────────────────────────────────────────────────────

/// Forward data for one block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockData {
    pub block: BlockRef,
    /// Opaque stream cursor positioned after this block.
    pub cursor: String,
    /// Protobuf-encoded `SinkOutput` for the block.
    pub payload: Vec<u8>,
}

/// Chain reorganization: every row written at or after `target` must be reverted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UndoSignal {
    pub target: BlockRef,
    /// Cursor to resume from once the rollback is committed.
    pub cursor: String,
}

/// One message from the upstream block stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamMessage {
    BlockData(BlockData),
    Undo(UndoSignal),
}

impl StreamMessage {
    /// Block number the message refers to.
    pub fn block_number(&self) -> u64 {
        match self {
            Self::BlockData(d) => d.block.number,
            Self::Undo(u) => u.target.number,
        }
    }

    pub fn cursor(&self) -> &str {
        match self {
            Self::BlockData(d) => &d.cursor,
            Self::Undo(u) => &u.cursor,
        }
    }
}

// ─── StartPosition ────────────────────────────────────────────────────────────

/// Where a stream connection should begin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartPosition {
    /// Resume right after the given cursor.
    Cursor(String),
    /// Start at the given block (inclusive).
    Block(u64),
    /// Start from the beginning of the chain.
    Genesis,
}

impl std::fmt::Display for StartPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cursor(c) => write!(f, "cursor {c}"),
            Self::Block(n) => write!(f, "block {n}"),
            Self::Genesis => write!(f, "genesis"),
        }
    }
}
