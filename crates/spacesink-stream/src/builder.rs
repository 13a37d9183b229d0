//! Fluent builder API for creating sinks and drivers.
//!
//! # Example
//!
//! ```rust,no_run
//! use spacesink_stream::SinkBuilder;
//!
//! let config = SinkBuilder::new()
//!     .network("GEO")
//!     .start_block(36_472_424)
//!     .content_concurrency(16)
//!     .strict_references(true)
//!     .build_config();
//! ```

use std::sync::Arc;
use std::time::Duration;

use spacesink_core::config::SinkConfig;
use spacesink_core::content::ContentFetcher;
use spacesink_core::error::IndexerError;
use spacesink_core::reporter::{Reporter, TracingReporter};
use spacesink_core::retry::RetryConfig;
use spacesink_core::sink::Sink;
use spacesink_core::store::{ContentCacheStore, SinkStore};

use crate::driver::SinkDriver;
use crate::source::BlockStream;

/// Fluent builder for `SinkConfig`, and for a ready-to-run [`SinkDriver`].
pub struct SinkBuilder {
    config: SinkConfig,
    reporter: Arc<dyn Reporter>,
}

impl Default for SinkBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SinkBuilder {
    pub fn new() -> Self {
        Self::from_config(SinkConfig::default())
    }

    /// Start from an existing (e.g. file-loaded) config.
    pub fn from_config(config: SinkConfig) -> Self {
        Self {
            config,
            reporter: Arc::new(TracingReporter),
        }
    }

    /// Set the network name mixed into space ids.
    pub fn network(mut self, network: impl Into<String>) -> Self {
        self.config.network = network.into();
        self
    }

    /// First block to stream on a fresh store.
    pub fn start_block(mut self, block: u64) -> Self {
        self.config.start_block = Some(block);
        self
    }

    /// Stop after this block (bounded backfill).
    pub fn stop_block(mut self, block: u64) -> Self {
        self.config.stop_block = Some(block);
        self
    }

    pub fn content_concurrency(mut self, n: usize) -> Self {
        self.config.content_concurrency = n;
        self
    }

    pub fn content_cache(mut self, capacity: usize, ttl: Duration) -> Self {
        self.config.content_cache_capacity = capacity;
        self.config.content_cache_ttl_secs = ttl.as_secs();
        self
    }

    /// Reconnect when the stream is silent this long.
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.idle_timeout_secs = timeout.as_secs().max(1);
        self
    }

    /// Rollback journal depth; `None` keeps everything.
    pub fn journal_retention(mut self, blocks: Option<u64>) -> Self {
        self.config.journal_retention_blocks = blocks;
        self
    }

    pub fn strict_references(mut self, strict: bool) -> Self {
        self.config.strict_references = strict;
        self
    }

    pub fn max_block_attempts(mut self, attempts: u32) -> Self {
        self.config.max_block_attempts = attempts;
        self
    }

    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.config.retry = retry;
        self
    }

    /// Replace the default `TracingReporter`.
    pub fn reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Build the `SinkConfig`.
    pub fn build_config(self) -> SinkConfig {
        self.config
    }

    /// Open a [`Sink`] over the given store and content fetcher.
    pub async fn open(
        self,
        store: Arc<dyn SinkStore>,
        cache_store: Arc<dyn ContentCacheStore>,
        fetcher: Arc<dyn ContentFetcher>,
    ) -> Result<Sink, IndexerError> {
        Sink::open(&self.config, store, cache_store, fetcher, self.reporter).await
    }

    /// Open a sink and wrap it in a driver reading from `stream`.
    pub async fn driver(
        self,
        stream: Box<dyn BlockStream>,
        store: Arc<dyn SinkStore>,
        cache_store: Arc<dyn ContentCacheStore>,
        fetcher: Arc<dyn ContentFetcher>,
    ) -> Result<SinkDriver, IndexerError> {
        let config = self.config.clone();
        let sink = self.open(store, cache_store, fetcher).await?;
        Ok(SinkDriver::new(sink, stream, config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults() {
        let cfg = SinkBuilder::new().build_config();
        assert_eq!(cfg.network, "GEO");
        assert_eq!(cfg.content_concurrency, 8);
        assert_eq!(cfg.start_block, None);
        assert_eq!(cfg.journal_retention_blocks, Some(10_000));
    }

    #[test]
    fn builder_custom() {
        let cfg = SinkBuilder::new()
            .network("TESTNET")
            .start_block(100)
            .stop_block(200)
            .content_concurrency(2)
            .content_cache(16, Duration::from_secs(30))
            .idle_timeout(Duration::from_millis(10))
            .journal_retention(None)
            .strict_references(true)
            .max_block_attempts(5)
            .build_config();

        assert_eq!(cfg.network, "TESTNET");
        assert_eq!(cfg.start_block, Some(100));
        assert_eq!(cfg.stop_block, Some(200));
        assert_eq!(cfg.content_concurrency, 2);
        assert_eq!(cfg.content_cache_capacity, 16);
        assert_eq!(cfg.content_cache_ttl_secs, 30);
        assert_eq!(cfg.idle_timeout_secs, 1);
        assert_eq!(cfg.journal_retention_blocks, None);
        assert!(cfg.strict_references);
        assert_eq!(cfg.max_block_attempts, 5);
        assert!(cfg.validate().is_ok());
    }
}
