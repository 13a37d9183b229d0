//! Injected diagnostics sink.
//!
//! Components receive an `Arc<dyn Reporter>` instead of reaching for global
//! hooks. Every method has an empty default so implementations only override
//! what they care about.

use crate::error::{DecodeError, IndexerError};

pub trait Reporter: Send + Sync {
    /// An on-chain event failed validation and was dropped.
    fn invalid_event(&self, _block_number: u64, _error: &DecodeError) {}

    /// A content payload was fetched but could not be decoded.
    fn content_failed(&self, _uri: &str, _reason: &str) {}

    /// A transient failure is about to be retried.
    fn retrying(&self, _operation: &str, _attempt: u32, _error: &IndexerError) {}

    /// A block's writes and cursor were committed.
    fn block_committed(&self, _block_number: u64, _events: usize, _writes: usize) {}

    /// State was rolled back to `target`.
    fn rolled_back(&self, _target: u64, _reverted: u64) {}
}

/// Reporter that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReporter;

impl Reporter for NoopReporter {}

/// Reporter that emits `tracing` events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn invalid_event(&self, block_number: u64, error: &DecodeError) {
        tracing::warn!(block = block_number, kind = %error.kind(), %error, "Dropping invalid event");
    }

    fn content_failed(&self, uri: &str, reason: &str) {
        tracing::warn!(uri, reason, "Content could not be decoded");
    }

    fn retrying(&self, operation: &str, attempt: u32, error: &IndexerError) {
        tracing::warn!(operation, attempt, %error, "Transient failure, retrying");
    }

    fn block_committed(&self, block_number: u64, events: usize, writes: usize) {
        tracing::debug!(block = block_number, events, writes, "Block committed");
    }

    fn rolled_back(&self, target: u64, reverted: u64) {
        tracing::warn!(target, reverted, "Rolled back");
    }
}
