//! `SinkDriver`: owns the stream connection and feeds the sink one message at
//! a time.
//!
//! Each message is processed to completion (committed or rolled back) before
//! the next is requested. Cancellation is only observed while waiting for the
//! next message, so an in-flight block is never cut short. Transient stream
//! failures and stalls reconnect from the persisted cursor with backoff;
//! fatal errors stop the driver without skipping the block.

use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use spacesink_core::config::{SinkConfig, SinkState};
use spacesink_core::error::IndexerError;
use spacesink_core::retry::RetryPolicy;
use spacesink_core::sink::Sink;
use spacesink_core::types::{BlockData, StreamMessage, UndoSignal};

use crate::source::BlockStream;

/// Counters for one driver run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DriverStats {
    pub blocks_applied: u64,
    pub undos_applied: u64,
    pub invalid_events: u64,
    pub reconnects: u64,
}

/// Why the run loop stopped reading.
enum Halt {
    Cancelled,
    StopBlock,
    StreamEnded,
}

pub struct SinkDriver {
    sink: Sink,
    stream: Box<dyn BlockStream>,
    config: SinkConfig,
    retry: RetryPolicy,
    state: watch::Sender<SinkState>,
    stats: DriverStats,
}

impl SinkDriver {
    pub fn new(sink: Sink, stream: Box<dyn BlockStream>, config: SinkConfig) -> Self {
        let retry = RetryPolicy::new(config.retry.clone());
        let (state, _) = watch::channel(SinkState::Idle);
        Self {
            sink,
            stream,
            config,
            retry,
            state,
            stats: DriverStats::default(),
        }
    }

    /// Observe state transitions.
    pub fn state(&self) -> watch::Receiver<SinkState> {
        self.state.subscribe()
    }

    pub fn sink(&self) -> &Sink {
        &self.sink
    }

    fn set_state(&self, state: SinkState) {
        self.state.send_replace(state);
    }

    /// Run until cancelled, the stop block is applied, the stream ends, or a
    /// fatal error occurs.
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<DriverStats, IndexerError> {
        info!(network = %self.config.network, "Sink driver starting");
        match self.run_inner(&cancel).await {
            Ok(halt) => {
                self.set_state(SinkState::Stopping);
                let reason = match halt {
                    Halt::Cancelled => "cancelled",
                    Halt::StopBlock => "stop block reached",
                    Halt::StreamEnded => "stream ended",
                };
                info!(
                    reason,
                    blocks = self.stats.blocks_applied,
                    undos = self.stats.undos_applied,
                    cursor = ?self.sink.cursor().map(|c| c.block_number),
                    "Sink driver stopped"
                );
                self.set_state(SinkState::Stopped);
                Ok(self.stats.clone())
            }
            Err(e) => {
                error!(error = %e, cursor = ?self.sink.cursor().map(|c| c.block_number), "Sink driver halted");
                self.set_state(SinkState::Error);
                Err(e)
            }
        }
    }

    fn stop_block_reached(&self) -> bool {
        match (self.config.stop_block, self.sink.cursor()) {
            (Some(stop), Some(cursor)) => cursor.has_applied(stop),
            _ => false,
        }
    }

    async fn run_inner(&mut self, cancel: &CancellationToken) -> Result<Halt, IndexerError> {
        let idle = Duration::from_secs(self.config.idle_timeout_secs);
        let mut failures = 0u32;

        'connect: loop {
            if cancel.is_cancelled() {
                return Ok(Halt::Cancelled);
            }
            if self.stop_block_reached() {
                return Ok(Halt::StopBlock);
            }

            let from = self.sink.start_position(self.config.start_block);
            if let Err(e) = self.stream.connect(&from).await {
                self.backoff(&mut failures, e, cancel).await?;
                continue;
            }
            self.set_state(SinkState::Streaming);

            loop {
                let next = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Ok(Halt::Cancelled),
                    next = tokio::time::timeout(idle, self.stream.next_message()) => next,
                };

                let message = match next {
                    Err(_) => {
                        let stalled = IndexerError::Timeout(format!("no stream message for {}s", idle.as_secs()));
                        self.backoff(&mut failures, stalled, cancel).await?;
                        continue 'connect;
                    }
                    Ok(Err(e)) => {
                        self.backoff(&mut failures, e, cancel).await?;
                        continue 'connect;
                    }
                    Ok(Ok(None)) => return Ok(Halt::StreamEnded),
                    Ok(Ok(Some(message))) => message,
                };
                failures = 0;

                match message {
                    StreamMessage::BlockData(data) => {
                        if let Some(stop) = self.config.stop_block {
                            if data.block.number > stop {
                                return Ok(Halt::StopBlock);
                            }
                        }
                        self.apply_block(&data).await?;
                        if self.stop_block_reached() {
                            return Ok(Halt::StopBlock);
                        }
                    }
                    StreamMessage::Undo(signal) => self.apply_undo(&signal).await?,
                }
            }
        }
    }

    /// Re-run a block whose transient failures outlasted the per-call retries.
    async fn apply_block(&mut self, data: &BlockData) -> Result<(), IndexerError> {
        let max = self.config.max_block_attempts;
        let mut attempt = 1;
        loop {
            match self.sink.handle_block_data(data).await {
                Ok(outcome) => {
                    self.stats.blocks_applied += 1;
                    self.stats.invalid_events += outcome.invalid as u64;
                    if outcome.events > 0 {
                        info!(
                            block = outcome.block_number,
                            events = outcome.events,
                            writes = outcome.writes,
                            "Applied block"
                        );
                    }
                    return Ok(());
                }
                Err(e) if e.is_transient() && attempt < max => {
                    warn!(block = data.block.number, attempt, error = %e, "Block failed, retrying");
                    let delay = self.retry.next_delay(attempt).unwrap_or(Duration::from_millis(100));
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn apply_undo(&mut self, signal: &UndoSignal) -> Result<(), IndexerError> {
        self.set_state(SinkState::RollingBack);
        self.sink.handle_undo_signal(signal).await?;
        self.stats.undos_applied += 1;
        self.set_state(SinkState::Streaming);
        Ok(())
    }

    /// Wait before reconnecting, or give up on fatal or exhausted failures.
    async fn backoff(
        &mut self,
        failures: &mut u32,
        error: IndexerError,
        cancel: &CancellationToken,
    ) -> Result<(), IndexerError> {
        if error.is_fatal() {
            return Err(error);
        }
        *failures += 1;
        let Some(delay) = self.retry.next_delay(*failures) else {
            return Err(error);
        };

        self.set_state(SinkState::Reconnecting);
        self.stats.reconnects += 1;
        warn!(attempt = *failures, ?delay, error = %error, "Block stream interrupted, reconnecting");
        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = tokio::time::sleep(delay) => {}
        }
        Ok(())
    }
}
