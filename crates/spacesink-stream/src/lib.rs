//! # spacesink-stream
//!
//! Connects a [`Sink`](spacesink_core::Sink) to the outside world: the block
//! stream it reads from, the IPFS gateway it resolves content through, and the
//! driver loop that ties them together.
//!
//! ## Architecture
//! ```text
//! BlockStream (SubstreamsStream / WsBlockStream / ReplayStream)
//!       │  StreamMessage, strictly ordered
//!       ▼
//! SinkDriver ── reconnect / idle timeout / stop block / cancellation
//!       │
//!       ▼
//! Sink::handle_block_data / handle_undo_signal
//!       │
//!       └── IpfsGatewayFetcher (ContentFetcher)
//! ```

pub mod builder;
pub mod driver;
pub mod ipfs;
pub mod source;
pub mod substreams;
pub mod ws;

pub use builder::SinkBuilder;
pub use driver::{DriverStats, SinkDriver};
pub use ipfs::IpfsGatewayFetcher;
pub use source::{BlockStream, ReplayStream};
pub use substreams::SubstreamsStream;
pub use ws::WsBlockStream;
