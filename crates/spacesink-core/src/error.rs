//! Error types for the spacesink pipeline.
//!
//! Three layers, each converted at its boundary:
//! - [`DecodeError`]: one malformed event; becomes a quarantined value.
//! - [`ContentError`]: one undecodable content payload; becomes a cached failure.
//! - [`IndexerError`]: everything that can stop or delay a block.

use thiserror::Error;

use crate::event::EventKind;

/// Errors that can occur while driving the sink.
#[derive(Debug, Error)]
pub enum IndexerError {
    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Content unavailable for '{uri}': {reason}")]
    ContentUnavailable { uri: String, reason: String },

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Cursor mismatch: persisted block {cursor_block}, received block {received}")]
    CursorMismatch { cursor_block: u64, received: u64 },

    #[error("Missing {entity} '{id}' referenced at block {block_number}")]
    MissingEntity {
        entity: &'static str,
        id: String,
        block_number: u64,
    },

    #[error("Rollback to block {target} failed: {reason}")]
    Rollback { target: u64, reason: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Sink aborted: {reason}")]
    Aborted { reason: String },

    #[error("{0}")]
    Other(String),
}

impl IndexerError {
    /// Returns `true` for I/O failures that are safe to retry with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Stream(_) | Self::Storage(_) | Self::ContentUnavailable { .. } | Self::Timeout(_)
        )
    }

    /// Returns `true` if the error must halt the pipeline.
    pub fn is_fatal(&self) -> bool {
        !self.is_transient()
    }
}

/// Validation failure for a single on-chain event.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("{kind}: malformed message: {reason}")]
    Malformed { kind: EventKind, reason: String },

    #[error("{kind}: missing required field '{field}'")]
    MissingField { kind: EventKind, field: &'static str },

    #[error("{kind}: field '{field}' is not a valid address: {value}")]
    InvalidAddress {
        kind: EventKind,
        field: &'static str,
        value: String,
    },

    #[error("{kind}: field '{field}' has unexpected value '{value}'")]
    InvalidLiteral {
        kind: EventKind,
        field: &'static str,
        value: String,
    },
}

impl DecodeError {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Malformed { kind, .. }
            | Self::MissingField { kind, .. }
            | Self::InvalidAddress { kind, .. }
            | Self::InvalidLiteral { kind, .. } => *kind,
        }
    }
}

/// Permanent failure to interpret a content payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContentError {
    #[error("unsupported content uri '{0}'")]
    UnsupportedUri(String),

    #[error("undecodable edit: {0}")]
    Undecodable(String),

    #[error("edit has no id")]
    MissingEditId,
}
