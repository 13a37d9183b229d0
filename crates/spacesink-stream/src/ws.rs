//! `WsBlockStream`: `BlockStream` over a WebSocket block-stream endpoint.
//!
//! After connecting, the client sends one subscribe frame with its start
//! position and optional stop block. The server then pushes JSON text frames:
//!
//! ```text
//! {"type":"block","number":42,"hash":"0x…","timestamp":1700000000,"cursor":"…","payload":"<hex>"}
//! {"type":"undo","target":{"number":40,"hash":"0x…"},"cursor":"…"}
//! {"type":"end"}
//! ```
//!
//! `payload` is the hex-encoded protobuf `SinkOutput` for the block.
//!
//! # Usage
//! ```no_run
//! use spacesink_stream::ws::WsBlockStream;
//!
//! let stream = WsBlockStream::new("wss://stream.example.org/v1/blocks")
//!     .with_api_token("YOUR_TOKEN")
//!     .with_stop_block(1_000_000);
//! ```

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header::AUTHORIZATION, HeaderValue};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use spacesink_core::error::IndexerError;
use spacesink_core::types::{BlockData, BlockRef, StartPosition, StreamMessage, UndoSignal};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket block stream client.
pub struct WsBlockStream {
    endpoint: String,
    api_token: Option<String>,
    stop_block: Option<u64>,
    socket: Option<Socket>,
}

impl WsBlockStream {
    /// Create a stream for a `ws://` or `wss://` endpoint.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_token: None,
            stop_block: None,
            socket: None,
        }
    }

    /// Send `Authorization: Bearer <token>` on connect.
    pub fn with_api_token(mut self, token: impl Into<String>) -> Self {
        self.api_token = Some(token.into());
        self
    }

    /// Ask the server to end the stream after this block.
    pub fn with_stop_block(mut self, block: u64) -> Self {
        self.stop_block = Some(block);
        self
    }

    pub fn is_connected(&self) -> bool {
        self.socket.is_some()
    }

    fn subscribe_frame(&self, from: &StartPosition) -> serde_json::Value {
        let mut frame = serde_json::json!({ "type": "subscribe" });
        match from {
            StartPosition::Cursor(c) => frame["start_cursor"] = c.clone().into(),
            StartPosition::Block(n) => frame["start_block"] = (*n).into(),
            StartPosition::Genesis => frame["start_block"] = 0.into(),
        }
        if let Some(stop) = self.stop_block {
            frame["stop_block"] = stop.into();
        }
        frame
    }
}

#[async_trait]
impl crate::source::BlockStream for WsBlockStream {
    async fn connect(&mut self, from: &StartPosition) -> Result<(), IndexerError> {
        self.socket = None;
        url::Url::parse(&self.endpoint)
            .map_err(|e| IndexerError::Config(format!("invalid stream endpoint {}: {e}", self.endpoint)))?;

        let mut request = self
            .endpoint
            .as_str()
            .into_client_request()
            .map_err(|e| IndexerError::Config(format!("invalid stream endpoint: {e}")))?;
        if let Some(token) = &self.api_token {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| IndexerError::Config(format!("invalid api token: {e}")))?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }

        info!(endpoint = %self.endpoint, %from, "Connecting to block stream");
        let (mut socket, _) = connect_async(request)
            .await
            .map_err(|e| IndexerError::Stream(format!("connect {}: {e}", self.endpoint)))?;

        let subscribe = self.subscribe_frame(from);
        socket
            .send(Message::Text(subscribe.to_string()))
            .await
            .map_err(|e| IndexerError::Stream(format!("send subscribe: {e}")))?;

        info!(endpoint = %self.endpoint, "Block stream connected");
        self.socket = Some(socket);
        Ok(())
    }

    async fn next_message(&mut self) -> Result<Option<StreamMessage>, IndexerError> {
        let Some(socket) = self.socket.as_mut() else {
            return Err(IndexerError::Stream("not connected".into()));
        };

        loop {
            let frame = match socket.next().await {
                Some(Ok(frame)) => frame,
                Some(Err(e)) => {
                    warn!(error = %e, "Block stream error");
                    self.socket = None;
                    return Err(IndexerError::Stream(e.to_string()));
                }
                None => {
                    self.socket = None;
                    return Err(IndexerError::Stream("connection closed".into()));
                }
            };

            match frame {
                Message::Text(text) => {
                    debug!(len = text.len(), "WS frame");
                    match parse_frame(&text)? {
                        Parsed::Message(m) => return Ok(Some(m)),
                        Parsed::End => {
                            info!("Block stream ended");
                            self.socket = None;
                            return Ok(None);
                        }
                        Parsed::Ignored => {}
                    }
                }
                Message::Ping(data) => {
                    let _ = socket.send(Message::Pong(data)).await;
                }
                Message::Close(_) => {
                    info!("Block stream closed by server");
                    self.socket = None;
                    return Err(IndexerError::Stream("closed by server".into()));
                }
                _ => {} // binary / pong
            }
        }
    }
}

// ─── Frame parsing ────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct FrameBlock {
    number: u64,
    hash: String,
    #[serde(default)]
    timestamp: i64,
}

impl From<FrameBlock> for BlockRef {
    fn from(b: FrameBlock) -> Self {
        BlockRef {
            number: b.number,
            hash: b.hash,
            timestamp: b.timestamp,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Frame {
    Block {
        #[serde(flatten)]
        block: FrameBlock,
        cursor: String,
        payload: String,
    },
    Undo {
        target: FrameBlock,
        cursor: String,
    },
    End,
    #[serde(other)]
    Other,
}

#[derive(Debug, PartialEq, Eq)]
enum Parsed {
    Message(StreamMessage),
    End,
    Ignored,
}

/// A frame that is not valid JSON, or a block frame with a bad payload, is a
/// protocol error: the connection is dropped and re-established.
fn parse_frame(text: &str) -> Result<Parsed, IndexerError> {
    let frame: Frame = serde_json::from_str(text)
        .map_err(|e| IndexerError::Stream(format!("malformed frame: {e}")))?;

    Ok(match frame {
        Frame::Block {
            block,
            cursor,
            payload,
        } => {
            let payload = hex::decode(payload.trim_start_matches("0x"))
                .map_err(|e| IndexerError::Stream(format!("block {} payload: {e}", block.number)))?;
            Parsed::Message(StreamMessage::BlockData(BlockData {
                block: block.into(),
                cursor,
                payload,
            }))
        }
        Frame::Undo { target, cursor } => Parsed::Message(StreamMessage::Undo(UndoSignal {
            target: target.into(),
            cursor,
        })),
        Frame::End => Parsed::End,
        Frame::Other => Parsed::Ignored,
    })
}
