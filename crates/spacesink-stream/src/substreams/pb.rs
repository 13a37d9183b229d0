//! Messages of the `sf.substreams.rpc.v2.Stream/Blocks` service.
//!
//! Only the parts the sink reads are declared; prost skips unknown fields.
//! The module graph is forwarded as opaque bytes: a `bytes` field is
//! wire-compatible with the embedded `sf.substreams.v1.Modules` message.

/// `sf.substreams.v1.Package`, as stored in a `.spkg` file.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Package {
    #[prost(bytes = "vec", optional, tag = "6")]
    pub modules: Option<Vec<u8>>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Request {
    #[prost(int64, tag = "1")]
    pub start_block_num: i64,
    #[prost(string, tag = "2")]
    pub start_cursor: String,
    /// 0 streams forever.
    #[prost(uint64, tag = "3")]
    pub stop_block_num: u64,
    #[prost(bool, tag = "4")]
    pub final_blocks_only: bool,
    #[prost(bool, tag = "5")]
    pub production_mode: bool,
    #[prost(string, tag = "6")]
    pub output_module: String,
    #[prost(bytes = "vec", optional, tag = "7")]
    pub modules: Option<Vec<u8>>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Response {
    #[prost(oneof = "response::Message", tags = "1, 2, 3, 4, 5")]
    pub message: Option<response::Message>,
}

pub mod response {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Message {
        #[prost(message, tag = "1")]
        Session(super::SessionInit),
        #[prost(message, tag = "2")]
        Progress(super::ModulesProgress),
        #[prost(message, tag = "3")]
        BlockScopedData(super::BlockScopedData),
        #[prost(message, tag = "4")]
        BlockUndoSignal(super::BlockUndoSignal),
        #[prost(message, tag = "5")]
        FatalError(super::Error),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SessionInit {
    #[prost(string, tag = "1")]
    pub trace_id: String,
    #[prost(uint64, tag = "2")]
    pub resolved_start_block: u64,
    #[prost(uint64, tag = "3")]
    pub linear_handoff_block: u64,
    #[prost(uint64, tag = "4")]
    pub max_parallel_workers: u64,
}

/// Sent periodically while the backend prepares data. Contents are ignored.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ModulesProgress {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct BlockScopedData {
    #[prost(message, optional, tag = "1")]
    pub output: Option<MapModuleOutput>,
    #[prost(message, optional, tag = "2")]
    pub clock: Option<Clock>,
    #[prost(string, tag = "3")]
    pub cursor: String,
    #[prost(uint64, tag = "4")]
    pub final_block_height: u64,
}

/// Everything above `last_valid_block` was reverted on-chain.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct BlockUndoSignal {
    #[prost(message, optional, tag = "1")]
    pub last_valid_block: Option<BlockRef>,
    #[prost(string, tag = "2")]
    pub last_valid_cursor: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Error {
    #[prost(string, tag = "1")]
    pub module: String,
    #[prost(string, tag = "2")]
    pub reason: String,
    #[prost(string, repeated, tag = "3")]
    pub logs: Vec<String>,
    #[prost(bool, tag = "4")]
    pub logs_truncated: bool,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MapModuleOutput {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(message, optional, tag = "2")]
    pub map_output: Option<Any>,
}

/// `google.protobuf.Any`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Any {
    #[prost(string, tag = "1")]
    pub type_url: String,
    #[prost(bytes = "vec", tag = "2")]
    pub value: Vec<u8>,
}

/// `sf.substreams.v1.Clock`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Clock {
    #[prost(string, tag = "1")]
    pub id: String,
    #[prost(uint64, tag = "2")]
    pub number: u64,
    #[prost(message, optional, tag = "3")]
    pub timestamp: Option<Timestamp>,
}

/// `sf.substreams.v1.BlockRef`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct BlockRef {
    #[prost(string, tag = "1")]
    pub id: String,
    #[prost(uint64, tag = "2")]
    pub number: u64,
}

/// `google.protobuf.Timestamp`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Timestamp {
    #[prost(int64, tag = "1")]
    pub seconds: i64,
    #[prost(int32, tag = "2")]
    pub nanos: i32,
}
