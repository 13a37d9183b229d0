//! `BlockStream` trait: abstraction over the upstream block stream.
//!
//! A stream is connected at a [`StartPosition`] and then yields forward block
//! data and undo signals strictly in order. The driver reconnects a stream
//! from the persisted cursor whenever it reports a transient error.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use spacesink_core::error::IndexerError;
use spacesink_core::types::{StartPosition, StreamMessage};

#[async_trait]
pub trait BlockStream: Send {
    /// (Re)connect, discarding any previous connection.
    async fn connect(&mut self, from: &StartPosition) -> Result<(), IndexerError>;

    /// Next message, or `None` once the stream has ended for good.
    /// A dropped connection is a transient [`IndexerError::Stream`].
    async fn next_message(&mut self) -> Result<Option<StreamMessage>, IndexerError>;
}

// ─── ReplayStream ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fault {
    Disconnect,
    Stall,
}

/// In-memory stream over a fixed script of messages.
///
/// Connecting at a cursor resumes right after the message that carried it;
/// connecting at a block starts at the first message for that block or later.
/// Faults can be injected once at a given position to exercise reconnects.
pub struct ReplayStream {
    script: Vec<StreamMessage>,
    position: Option<usize>,
    faults: Vec<(usize, Fault)>,
    connects: Arc<Mutex<Vec<StartPosition>>>,
}

impl ReplayStream {
    pub fn new(script: Vec<StreamMessage>) -> Self {
        Self {
            script,
            position: None,
            faults: Vec::new(),
            connects: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Drop the connection once, instead of delivering message `index`.
    pub fn disconnect_at(mut self, index: usize) -> Self {
        self.faults.push((index, Fault::Disconnect));
        self
    }

    /// Go silent once, instead of delivering message `index`.
    pub fn stall_at(mut self, index: usize) -> Self {
        self.faults.push((index, Fault::Stall));
        self
    }

    /// Shared log of every position this stream was connected at.
    pub fn connect_log(&self) -> Arc<Mutex<Vec<StartPosition>>> {
        Arc::clone(&self.connects)
    }

    fn resume_index(&self, from: &StartPosition) -> Result<usize, IndexerError> {
        match from {
            StartPosition::Genesis => Ok(0),
            StartPosition::Block(n) => Ok(self
                .script
                .iter()
                .position(|m| m.block_number() >= *n)
                .unwrap_or(self.script.len())),
            StartPosition::Cursor(token) => self
                .script
                .iter()
                .position(|m| m.cursor() == token)
                .map(|i| i + 1)
                .ok_or_else(|| IndexerError::Stream(format!("unknown cursor {token}"))),
        }
    }
}

#[async_trait]
impl BlockStream for ReplayStream {
    async fn connect(&mut self, from: &StartPosition) -> Result<(), IndexerError> {
        if let Ok(mut log) = self.connects.lock() {
            log.push(from.clone());
        }
        self.position = Some(self.resume_index(from)?);
        Ok(())
    }

    async fn next_message(&mut self) -> Result<Option<StreamMessage>, IndexerError> {
        let Some(index) = self.position else {
            return Err(IndexerError::Stream("not connected".into()));
        };

        if let Some(slot) = self.faults.iter().position(|(at, _)| *at == index) {
            let (_, fault) = self.faults.remove(slot);
            self.position = None;
            match fault {
                Fault::Disconnect => return Err(IndexerError::Stream("connection reset".into())),
                Fault::Stall => futures::future::pending::<()>().await,
            }
        }

        let message = self.script.get(index).cloned();
        if message.is_some() {
            self.position = Some(index + 1);
        }
        Ok(message)
    }
}
