//! The sink: decode → project → commit for forward blocks, and rollback for
//! undo signals. Owns no connection; the stream driver feeds it messages one
//! at a time.

use std::sync::Arc;
use std::time::Duration;

use crate::checkpoint::CursorManager;
use crate::config::SinkConfig;
use crate::content::{ContentFetcher, ContentResolver, DurableContentCache, LruContentCache, TieredCache};
use crate::cursor::Cursor;
use crate::decoder::EventDecoder;
use crate::error::IndexerError;
use crate::projector::StateProjector;
use crate::reporter::Reporter;
use crate::retry::RetryPolicy;
use crate::store::{ContentCacheStore, SinkStore};
use crate::types::{BlockData, StartPosition, UndoSignal};

/// Journal pruning runs once per this many committed blocks.
const PRUNE_INTERVAL: u64 = 100;

/// Summary of one applied block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockOutcome {
    pub block_number: u64,
    pub events: usize,
    pub invalid: usize,
    pub writes: usize,
}

pub struct Sink {
    decoder: EventDecoder,
    projector: StateProjector,
    cursors: CursorManager,
    store: Arc<dyn SinkStore>,
    reporter: Arc<dyn Reporter>,
    journal_retention: Option<u64>,
    committed_since_prune: u64,
}

impl Sink {
    /// Wire up the sink's components and load the persisted cursor.
    pub async fn open(
        config: &SinkConfig,
        store: Arc<dyn SinkStore>,
        cache_store: Arc<dyn ContentCacheStore>,
        fetcher: Arc<dyn ContentFetcher>,
        reporter: Arc<dyn Reporter>,
    ) -> Result<Self, IndexerError> {
        config.validate()?;
        let retry = RetryPolicy::new(config.retry.clone()).with_reporter(reporter.clone());

        let cache = TieredCache::new(
            Arc::new(LruContentCache::new(
                config.content_cache_capacity,
                Duration::from_secs(config.content_cache_ttl_secs),
            )),
            Arc::new(DurableContentCache::new(cache_store)),
        );
        let resolver = ContentResolver::new(fetcher, Arc::new(cache))
            .with_retry(retry.clone())
            .with_reporter(reporter.clone());

        let projector = StateProjector::new(config.network.clone(), Arc::new(resolver), store.clone())
            .with_content_concurrency(config.content_concurrency)
            .with_strict_references(config.strict_references);

        let cursors = CursorManager::load(store.clone(), retry).await?;

        Ok(Self {
            decoder: EventDecoder::new(reporter.clone()),
            projector,
            cursors,
            store,
            reporter,
            journal_retention: config.journal_retention_blocks,
            committed_since_prune: 0,
        })
    }

    pub fn cursor(&self) -> Option<&Cursor> {
        self.cursors.current()
    }

    pub fn start_position(&self, start_block: Option<u64>) -> StartPosition {
        self.cursors.start_position(start_block)
    }

    /// Apply one forward block. Nothing is written unless every event's writes
    /// and the new cursor commit together.
    pub async fn handle_block_data(&mut self, data: &BlockData) -> Result<BlockOutcome, IndexerError> {
        self.cursors.check_forward(&data.block)?;

        let decoded = self.decoder.decode_block(data.block.number, &data.payload);
        let writes = self.projector.project_block(&data.block, &decoded.events).await?;
        self.cursors.commit(data, &writes).await?;

        let outcome = BlockOutcome {
            block_number: data.block.number,
            events: decoded.events.len(),
            invalid: decoded.invalid.len(),
            writes: writes.len(),
        };
        self.reporter
            .block_committed(outcome.block_number, outcome.events, outcome.writes);
        self.maybe_prune(data.block.number).await;
        Ok(outcome)
    }

    /// Revert state to `signal.target`. Failures here are fatal.
    pub async fn handle_undo_signal(&mut self, signal: &UndoSignal) -> Result<u64, IndexerError> {
        let reverted = self.cursors.rollback(signal).await?;
        self.reporter.rolled_back(signal.target.number, reverted);
        Ok(reverted)
    }

    async fn maybe_prune(&mut self, block_number: u64) {
        let Some(retention) = self.journal_retention else {
            return;
        };
        self.committed_since_prune += 1;
        if self.committed_since_prune < PRUNE_INTERVAL {
            return;
        }
        self.committed_since_prune = 0;

        let below = block_number.saturating_sub(retention);
        if below == 0 {
            return;
        }
        match self.store.prune_journal(below).await {
            Ok(removed) => tracing::debug!(below, removed, "Pruned rollback journal"),
            Err(e) => tracing::warn!(below, error = %e, "Journal pruning failed"),
        }
    }
}
