//! `SubstreamsStream`: `BlockStream` over the Substreams gRPC `Blocks` RPC.
//!
//! Each connect opens one server-streaming call with the package's module
//! graph, the output module name and the start position. Responses map onto
//! [`StreamMessage`]s:
//!
//! ```text
//! BlockScopedData { clock, cursor, output.map_output.value } → BlockData
//! BlockUndoSignal { last_valid_block, last_valid_cursor }    → Undo (target = last_valid + 1)
//! FatalError                                                 → IndexerError::Aborted
//! SessionInit / ModulesProgress                              → skipped
//! ```
//!
//! # Usage
//! ```no_run
//! use spacesink_stream::substreams::SubstreamsStream;
//!
//! # fn build() -> Result<(), spacesink_core::IndexerError> {
//! let stream = SubstreamsStream::from_package_file(
//!     "https://mainnet.substreams.example.io:443",
//!     "./spaces-v1.0.0.spkg",
//!     "map_sink_output",
//! )?
//! .with_api_token("YOUR_TOKEN")
//! .with_stop_block(1_000_000);
//! # Ok(())
//! # }
//! ```

pub mod pb;

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use prost::Message;
use tonic::codec::{CompressionEncoding, ProstCodec};
use tonic::codegen::http::uri::PathAndQuery;
use tonic::metadata::{Ascii, MetadataValue};
use tonic::transport::{Channel, ClientTlsConfig, Endpoint};
use tonic::{Code, Status, Streaming};
use tracing::{debug, info, warn};

use spacesink_core::error::IndexerError;
use spacesink_core::types::{BlockData, BlockRef, StartPosition, StreamMessage, UndoSignal};

const BLOCKS_PATH: &str = "/sf.substreams.rpc.v2.Stream/Blocks";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_MESSAGE_BYTES: usize = 64 * 1024 * 1024;

/// Substreams gRPC block stream client.
pub struct SubstreamsStream {
    endpoint: String,
    modules: Vec<u8>,
    output_module: String,
    api_token: Option<String>,
    stop_block: Option<u64>,
    production_mode: bool,
    responses: Option<Streaming<pb::Response>>,
}

impl SubstreamsStream {
    /// `modules` is the encoded `sf.substreams.v1.Modules` graph.
    pub fn new(endpoint: impl Into<String>, modules: Vec<u8>, output_module: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            modules,
            output_module: output_module.into(),
            api_token: None,
            stop_block: None,
            production_mode: true,
            responses: None,
        }
    }

    /// Load the module graph from a `.spkg` package file.
    pub fn from_package_file(
        endpoint: impl Into<String>,
        package: impl AsRef<Path>,
        output_module: impl Into<String>,
    ) -> Result<Self, IndexerError> {
        let path = package.as_ref();
        let raw = std::fs::read(path)
            .map_err(|e| IndexerError::Config(format!("cannot read package {}: {e}", path.display())))?;
        let modules = modules_from_package(&raw)
            .map_err(|e| IndexerError::Config(format!("package {}: {e}", path.display())))?;
        Ok(Self::new(endpoint, modules, output_module))
    }

    /// Send `authorization: Bearer <token>` with every request.
    pub fn with_api_token(mut self, token: impl Into<String>) -> Self {
        self.api_token = Some(token.into());
        self
    }

    /// Ask the backend to end the stream after this block.
    pub fn with_stop_block(mut self, block: u64) -> Self {
        self.stop_block = Some(block);
        self
    }

    /// Development mode streams module logs and disables parallel backfill.
    pub fn with_production_mode(mut self, production: bool) -> Self {
        self.production_mode = production;
        self
    }

    pub fn is_connected(&self) -> bool {
        self.responses.is_some()
    }

    fn request(&self, from: &StartPosition) -> pb::Request {
        let (start_block_num, start_cursor) = match from {
            StartPosition::Cursor(c) => (0, c.clone()),
            StartPosition::Block(n) => (i64::try_from(*n).unwrap_or(i64::MAX), String::new()),
            StartPosition::Genesis => (0, String::new()),
        };
        pb::Request {
            start_block_num,
            start_cursor,
            stop_block_num: self.stop_block.unwrap_or(0),
            final_blocks_only: false,
            production_mode: self.production_mode,
            output_module: self.output_module.clone(),
            modules: Some(self.modules.clone()),
        }
    }

    async fn channel(&mut self) -> Result<Channel, IndexerError> {
        let mut endpoint = Endpoint::from_shared(self.endpoint.clone())
            .map_err(|e| IndexerError::Config(format!("invalid stream endpoint {}: {e}", self.endpoint)))?
            .connect_timeout(CONNECT_TIMEOUT)
            .tcp_keepalive(Some(Duration::from_secs(30)))
            .http2_keep_alive_interval(Duration::from_secs(30));
        if self.endpoint.starts_with("https://") {
            endpoint = endpoint
                .tls_config(ClientTlsConfig::new())
                .map_err(|e| IndexerError::Config(format!("tls setup: {e}")))?;
        }
        endpoint
            .connect()
            .await
            .map_err(|e| IndexerError::Stream(format!("connect {}: {e}", self.endpoint)))
    }
}

#[async_trait]
impl crate::source::BlockStream for SubstreamsStream {
    async fn connect(&mut self, from: &StartPosition) -> Result<(), IndexerError> {
        self.responses = None;

        let mut request = tonic::Request::new(self.request(from));
        if let Some(token) = &self.api_token {
            let value: MetadataValue<Ascii> = format!("Bearer {token}")
                .parse()
                .map_err(|e| IndexerError::Config(format!("invalid api token: {e}")))?;
            request.metadata_mut().insert("authorization", value);
        }

        info!(endpoint = %self.endpoint, module = %self.output_module, %from, "Connecting to substreams");
        let channel = self.channel().await?;
        let mut client = tonic::client::Grpc::new(channel)
            .accept_compressed(CompressionEncoding::Gzip)
            .max_decoding_message_size(MAX_MESSAGE_BYTES);
        client
            .ready()
            .await
            .map_err(|e| IndexerError::Stream(format!("service not ready: {e}")))?;

        let codec = ProstCodec::<pb::Request, pb::Response>::default();
        let response = client
            .server_streaming(request, PathAndQuery::from_static(BLOCKS_PATH), codec)
            .await
            .map_err(status_error)?;

        info!(endpoint = %self.endpoint, "Substreams session opened");
        self.responses = Some(response.into_inner());
        Ok(())
    }

    async fn next_message(&mut self) -> Result<Option<StreamMessage>, IndexerError> {
        let Some(responses) = self.responses.as_mut() else {
            return Err(IndexerError::Stream("not connected".into()));
        };

        loop {
            let response = match responses.message().await {
                Ok(Some(response)) => response,
                Ok(None) if self.stop_block.is_some() => {
                    info!("Substreams session reached its stop block");
                    self.responses = None;
                    return Ok(None);
                }
                Ok(None) => {
                    self.responses = None;
                    return Err(IndexerError::Stream("session closed by server".into()));
                }
                Err(status) => {
                    warn!(code = ?status.code(), message = status.message(), "Substreams error");
                    self.responses = None;
                    return Err(status_error(status));
                }
            };

            if let Some(message) = map_response(response)? {
                return Ok(Some(message));
            }
        }
    }
}

// ─── Response mapping ─────────────────────────────────────────────────────────

/// Extract the module graph from an encoded `.spkg` package.
pub fn modules_from_package(raw: &[u8]) -> Result<Vec<u8>, String> {
    let package = pb::Package::decode(raw).map_err(|e| format!("not a substreams package: {e}"))?;
    package
        .modules
        .filter(|m| !m.is_empty())
        .ok_or_else(|| "package has no modules".to_string())
}

/// `None` for session bookkeeping the sink does not act on.
fn map_response(response: pb::Response) -> Result<Option<StreamMessage>, IndexerError> {
    use pb::response::Message;

    let Some(message) = response.message else {
        return Ok(None);
    };
    match message {
        Message::Session(session) => {
            info!(
                trace_id = %session.trace_id,
                resolved_start_block = session.resolved_start_block,
                linear_handoff_block = session.linear_handoff_block,
                "Substreams session initialised"
            );
            Ok(None)
        }
        Message::Progress(_) => Ok(None),
        Message::BlockScopedData(data) => {
            let clock = data
                .clock
                .ok_or_else(|| IndexerError::Stream("block data without clock".into()))?;
            let payload = data
                .output
                .and_then(|o| o.map_output)
                .map(|any| any.value)
                .unwrap_or_default();
            debug!(block = clock.number, len = payload.len(), "Substreams block");
            Ok(Some(StreamMessage::BlockData(BlockData {
                block: BlockRef {
                    number: clock.number,
                    hash: clock.id,
                    timestamp: clock.timestamp.map(|t| t.seconds).unwrap_or_default(),
                },
                cursor: data.cursor,
                payload,
            })))
        }
        Message::BlockUndoSignal(undo) => {
            let last_valid = undo
                .last_valid_block
                .ok_or_else(|| IndexerError::Stream("undo signal without last valid block".into()))?;
            // The first reverted block's hash is unknown; only its height is.
            Ok(Some(StreamMessage::Undo(UndoSignal {
                target: BlockRef::new(last_valid.number + 1, String::new()),
                cursor: undo.last_valid_cursor,
            })))
        }
        Message::FatalError(err) => Err(IndexerError::Aborted {
            reason: format!("module '{}' failed: {}", err.module, err.reason),
        }),
    }
}

/// Rejected credentials or requests are configuration errors; everything
/// else is a transport failure worth reconnecting over.
fn status_error(status: Status) -> IndexerError {
    match status.code() {
        Code::Unauthenticated | Code::PermissionDenied | Code::InvalidArgument => IndexerError::Config(format!(
            "substreams rejected the request ({:?}): {}",
            status.code(),
            status.message()
        )),
        code => IndexerError::Stream(format!("substreams {code:?}: {}", status.message())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pb::response::Message as Msg;

    fn respond(message: Msg) -> pb::Response {
        pb::Response { message: Some(message) }
    }

    #[test]
    fn block_scoped_data_becomes_block() {
        let data = pb::BlockScopedData {
            output: Some(pb::MapModuleOutput {
                name: "map_sink_output".into(),
                map_output: Some(pb::Any {
                    type_url: "type.googleapis.com/spacesink.SinkOutput".into(),
                    value: vec![0x0a, 0x00],
                }),
            }),
            clock: Some(pb::Clock {
                id: "0xabc".into(),
                number: 42,
                timestamp: Some(pb::Timestamp { seconds: 1_700_000_000, nanos: 0 }),
            }),
            cursor: "c42".into(),
            final_block_height: 40,
        };
        let Some(StreamMessage::BlockData(block)) = map_response(respond(Msg::BlockScopedData(data))).unwrap() else {
            panic!("expected block data");
        };
        assert_eq!(block.block.number, 42);
        assert_eq!(block.block.hash, "0xabc");
        assert_eq!(block.block.timestamp, 1_700_000_000);
        assert_eq!(block.cursor, "c42");
        assert_eq!(block.payload, vec![0x0a, 0x00]);
    }

    #[test]
    fn block_without_output_has_empty_payload() {
        let data = pb::BlockScopedData {
            clock: Some(pb::Clock { id: "0x01".into(), number: 1, timestamp: None }),
            cursor: "c1".into(),
            ..Default::default()
        };
        let Some(StreamMessage::BlockData(block)) = map_response(respond(Msg::BlockScopedData(data))).unwrap() else {
            panic!("expected block data");
        };
        assert!(block.payload.is_empty());
    }

    #[test]
    fn undo_targets_first_reverted_block() {
        let undo = pb::BlockUndoSignal {
            last_valid_block: Some(pb::BlockRef { id: "0x27".into(), number: 39 }),
            last_valid_cursor: "u39".into(),
        };
        let mapped = map_response(respond(Msg::BlockUndoSignal(undo))).unwrap();
        assert_eq!(
            mapped,
            Some(StreamMessage::Undo(UndoSignal {
                target: BlockRef::new(40, ""),
                cursor: "u39".into(),
            }))
        );
    }

    #[test]
    fn session_and_progress_are_skipped() {
        let session = pb::SessionInit {
            trace_id: "t".into(),
            resolved_start_block: 10,
            ..Default::default()
        };
        assert_eq!(map_response(respond(Msg::Session(session))).unwrap(), None);
        assert_eq!(map_response(respond(Msg::Progress(pb::ModulesProgress {}))).unwrap(), None);
        assert_eq!(map_response(pb::Response { message: None }).unwrap(), None);
    }

    #[test]
    fn module_failure_halts() {
        let err = pb::Error {
            module: "map_sink_output".into(),
            reason: "panic at block 7".into(),
            ..Default::default()
        };
        let mapped = map_response(respond(Msg::FatalError(err))).unwrap_err();
        assert!(mapped.is_fatal());
        assert!(mapped.to_string().contains("map_sink_output"));
    }

    #[test]
    fn malformed_messages_are_transient() {
        let data = pb::BlockScopedData { cursor: "c".into(), ..Default::default() };
        assert!(map_response(respond(Msg::BlockScopedData(data))).unwrap_err().is_transient());
        let undo = pb::BlockUndoSignal { last_valid_block: None, last_valid_cursor: "u".into() };
        assert!(map_response(respond(Msg::BlockUndoSignal(undo))).unwrap_err().is_transient());
    }

    #[test]
    fn status_codes_split_fatal_and_transient() {
        assert!(status_error(Status::unauthenticated("bad token")).is_fatal());
        assert!(status_error(Status::invalid_argument("no such module")).is_fatal());
        assert!(status_error(Status::unavailable("overloaded")).is_transient());
        assert!(status_error(Status::internal("reset")).is_transient());
    }

    #[test]
    fn request_carries_position_and_modules() {
        let stream = SubstreamsStream::new("http://localhost:9000", vec![1, 2, 3], "map_sink_output")
            .with_stop_block(500);

        let req = stream.request(&StartPosition::Cursor("abc".into()));
        assert_eq!(req.start_cursor, "abc");
        assert_eq!(req.stop_block_num, 500);
        assert_eq!(req.output_module, "map_sink_output");
        assert_eq!(req.modules.as_deref(), Some(&[1u8, 2, 3][..]));
        assert!(req.production_mode);

        let req = stream.request(&StartPosition::Block(7));
        assert_eq!(req.start_block_num, 7);
        assert!(req.start_cursor.is_empty());
    }

    #[test]
    fn package_modules_are_forwarded_verbatim() {
        let raw = pb::Package { modules: Some(vec![0x0a, 0x02, 0x08, 0x01]) }.encode_to_vec();
        assert_eq!(modules_from_package(&raw).unwrap(), vec![0x0a, 0x02, 0x08, 0x01]);
        assert!(modules_from_package(&pb::Package::default().encode_to_vec()).is_err());
        assert!(modules_from_package(&[0xff, 0xff]).is_err());
    }

    #[test]
    fn missing_package_file_is_config_error() {
        let err = SubstreamsStream::from_package_file("http://localhost:9000", "/nonexistent.spkg", "m")
            .err()
            .unwrap();
        assert!(matches!(err, IndexerError::Config(_)));
    }
}
