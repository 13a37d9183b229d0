//! Sink configuration and runtime state.

use serde::{Deserialize, Serialize};

use crate::error::IndexerError;
use crate::retry::RetryConfig;

/// Smallest accepted `journal_retention_blocks`. Undo signals deeper than the
/// retained journal cannot be applied and halt the sink.
pub const MIN_JOURNAL_RETENTION_BLOCKS: u64 = 128;

/// Configuration for a sink instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    /// Network name mixed into derived space ids (e.g. `"GEO"`).
    pub network: String,
    /// First block to stream when no cursor is persisted. `None` = genesis.
    pub start_block: Option<u64>,
    /// Stop cleanly after committing this block. `None` = run forever.
    pub stop_block: Option<u64>,
    /// Upper bound on parallel content fetches within one block.
    pub content_concurrency: usize,
    /// Entries held by the in-memory content cache.
    pub content_cache_capacity: usize,
    /// Lifetime of an in-memory content cache entry (seconds).
    pub content_cache_ttl_secs: u64,
    /// Reconnect if the stream is silent this long (seconds).
    pub idle_timeout_secs: u64,
    /// Keep rollback journal entries for this many blocks behind the cursor.
    /// `None` keeps everything.
    pub journal_retention_blocks: Option<u64>,
    /// Halt on events whose space has not been created.
    pub strict_references: bool,
    /// How many times the driver re-runs a block that failed transiently
    /// after the per-call retries were exhausted.
    pub max_block_attempts: u32,
    /// Backoff for store, content, and reconnect retries.
    pub retry: RetryConfig,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            network: "GEO".into(),
            start_block: None,
            stop_block: None,
            content_concurrency: 8,
            content_cache_capacity: 1024,
            content_cache_ttl_secs: 600,
            idle_timeout_secs: 300,
            journal_retention_blocks: Some(10_000),
            strict_references: false,
            max_block_attempts: 3,
            retry: RetryConfig::default(),
        }
    }
}

impl SinkConfig {
    pub fn validate(&self) -> Result<(), IndexerError> {
        if self.network.trim().is_empty() {
            return Err(IndexerError::Config("network must not be empty".into()));
        }
        if self.content_concurrency == 0 {
            return Err(IndexerError::Config("content_concurrency must be at least 1".into()));
        }
        if self.max_block_attempts == 0 {
            return Err(IndexerError::Config("max_block_attempts must be at least 1".into()));
        }
        if let Some(blocks) = self.journal_retention_blocks {
            if blocks < MIN_JOURNAL_RETENTION_BLOCKS {
                return Err(IndexerError::Config(format!(
                    "journal_retention_blocks must be at least {MIN_JOURNAL_RETENTION_BLOCKS}, got {blocks}"
                )));
            }
        }
        if let (Some(start), Some(stop)) = (self.start_block, self.stop_block) {
            if stop < start {
                return Err(IndexerError::Config(format!(
                    "stop_block {stop} is before start_block {start}"
                )));
            }
        }
        Ok(())
    }
}

/// Runtime state of the sink driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SinkState {
    /// Not yet started.
    Idle,
    /// Connected and applying blocks.
    Streaming,
    /// Reverting state for an undo signal.
    RollingBack,
    /// Waiting to re-establish the stream connection.
    Reconnecting,
    /// Shutting down gracefully.
    Stopping,
    /// Terminated.
    Stopped,
    /// Encountered an unrecoverable error.
    Error,
}

impl std::fmt::Display for SinkState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Streaming => write!(f, "streaming"),
            Self::RollingBack => write!(f, "rolling-back"),
            Self::Reconnecting => write!(f, "reconnecting"),
            Self::Stopping => write!(f, "stopping"),
            Self::Stopped => write!(f, "stopped"),
            Self::Error => write!(f, "error"),
        }
    }
}
