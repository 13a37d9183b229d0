//! spacesink-core: decoding, identity, content resolution, and reorg-safe
//! projection of space governance events.
//!
//! # Architecture
//!
//! ```text
//! BlockStream → SinkDriver (spacesink-stream)
//!                   └── Sink
//!                         ├── EventDecoder    (protobuf → validated DomainEvents)
//!                         ├── StateProjector  (events → keyed RowWrites)
//!                         │     └── ContentResolver (LRU → durable cache → gateway)
//!                         └── CursorManager   (atomic commit / rollback)
//!                               └── SinkStore (memory / SQLite / Postgres)
//! ```

pub mod address;
pub mod checkpoint;
pub mod config;
pub mod content;
pub mod cursor;
pub mod decoder;
pub mod error;
pub mod event;
pub mod ids;
pub mod model;
pub mod projector;
pub mod reporter;
pub mod retry;
pub mod sink;
pub mod store;
pub mod types;
pub mod wire;

pub use checkpoint::{CursorManager, CursorPhase};
pub use config::{SinkConfig, SinkState};
pub use content::{ContentFetcher, ContentResolver, Resolved};
pub use cursor::Cursor;
pub use decoder::{DecodedBlock, EventDecoder};
pub use error::{ContentError, DecodeError, IndexerError};
pub use event::{DomainEvent, EventKind, VoteOption};
pub use model::{Row, RowKey, RowSet, RowWrite, Table};
pub use projector::StateProjector;
pub use reporter::{NoopReporter, Reporter, TracingReporter};
pub use retry::{RetryConfig, RetryPolicy};
pub use sink::{BlockOutcome, Sink};
pub use store::{CacheEntry, ContentCacheStore, SinkStore};
pub use types::{BlockData, BlockRef, StartPosition, StreamMessage, UndoSignal};
