//! Protobuf wire messages.
//!
//! `SinkOutput` is the per-block module output. Each event list is declared as
//! `repeated bytes`, which is wire-compatible with `repeated <Message>`: the
//! decoder gets every entry as raw bytes and decodes them one at a time, so a
//! corrupt entry only loses itself.
//!
//! `Edit` is the off-chain payload referenced by a processed proposal.

// ─── Block output ─────────────────────────────────────────────────────────────

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SinkOutput {
    #[prost(bytes = "vec", repeated, tag = "1")]
    pub spaces_created: Vec<Vec<u8>>,
    #[prost(bytes = "vec", repeated, tag = "2")]
    pub editors_added: Vec<Vec<u8>>,
    #[prost(bytes = "vec", repeated, tag = "3")]
    pub editors_removed: Vec<Vec<u8>>,
    #[prost(bytes = "vec", repeated, tag = "4")]
    pub members_added: Vec<Vec<u8>>,
    #[prost(bytes = "vec", repeated, tag = "5")]
    pub members_removed: Vec<Vec<u8>>,
    #[prost(bytes = "vec", repeated, tag = "6")]
    pub subspaces_added: Vec<Vec<u8>>,
    #[prost(bytes = "vec", repeated, tag = "7")]
    pub subspaces_removed: Vec<Vec<u8>>,
    #[prost(bytes = "vec", repeated, tag = "8")]
    pub votes_cast: Vec<Vec<u8>>,
    #[prost(bytes = "vec", repeated, tag = "9")]
    pub proposals_processed: Vec<Vec<u8>>,
    #[prost(bytes = "vec", repeated, tag = "10")]
    pub membership_requests: Vec<Vec<u8>>,
    #[prost(bytes = "vec", repeated, tag = "11")]
    pub profiles_registered: Vec<Vec<u8>>,
    #[prost(bytes = "vec", repeated, tag = "12")]
    pub proposals_created: Vec<Vec<u8>>,
    #[prost(bytes = "vec", repeated, tag = "13")]
    pub proposals_executed: Vec<Vec<u8>>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SpaceCreated {
    #[prost(string, tag = "1")]
    pub dao_address: String,
    #[prost(string, tag = "2")]
    pub space_address: String,
}

/// Editor or member added/removed.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PermissionChanged {
    #[prost(string, tag = "1")]
    pub dao_address: String,
    #[prost(string, tag = "2")]
    pub plugin_address: String,
    #[prost(string, tag = "3")]
    pub account: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SubspaceChanged {
    #[prost(string, tag = "1")]
    pub dao_address: String,
    #[prost(string, tag = "2")]
    pub plugin_address: String,
    #[prost(string, tag = "3")]
    pub subspace: String,
    /// `"added"` or `"removed"`; must match the list the entry arrived in.
    #[prost(string, tag = "4")]
    pub change_type: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct VoteCast {
    #[prost(string, tag = "1")]
    pub dao_address: String,
    #[prost(string, tag = "2")]
    pub plugin_address: String,
    #[prost(string, tag = "3")]
    pub onchain_proposal_id: String,
    #[prost(string, tag = "4")]
    pub voter: String,
    /// `"2"` = accept, `"3"` = reject.
    #[prost(string, tag = "5")]
    pub vote_option: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProposalCreated {
    #[prost(string, tag = "1")]
    pub dao_address: String,
    #[prost(string, tag = "2")]
    pub plugin_address: String,
    #[prost(string, tag = "3")]
    pub onchain_proposal_id: String,
    #[prost(string, tag = "4")]
    pub creator: String,
    /// Voting window, unix seconds.
    #[prost(string, tag = "5")]
    pub start_time: String,
    #[prost(string, tag = "6")]
    pub end_time: String,
    /// Proposed content; empty when the proposal carries none.
    #[prost(string, tag = "7")]
    pub content_uri: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProposalExecuted {
    #[prost(string, tag = "1")]
    pub dao_address: String,
    #[prost(string, tag = "2")]
    pub plugin_address: String,
    #[prost(string, tag = "3")]
    pub onchain_proposal_id: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProposalProcessed {
    #[prost(string, tag = "1")]
    pub dao_address: String,
    #[prost(string, tag = "2")]
    pub plugin_address: String,
    #[prost(string, tag = "3")]
    pub onchain_proposal_id: String,
    #[prost(string, tag = "4")]
    pub content_uri: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MembershipRequested {
    #[prost(string, tag = "1")]
    pub dao_address: String,
    #[prost(string, tag = "2")]
    pub requestor: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProfileRegistered {
    #[prost(string, tag = "1")]
    pub requestor: String,
    /// DAO address of the space the profile lives in.
    #[prost(string, tag = "2")]
    pub space: String,
    #[prost(string, tag = "3")]
    pub id: String,
}

// ─── Edit payload ─────────────────────────────────────────────────────────────

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Edit {
    #[prost(string, tag = "1")]
    pub id: String,
    #[prost(string, tag = "2")]
    pub name: String,
    #[prost(message, repeated, tag = "3")]
    pub ops: Vec<Op>,
    #[prost(string, repeated, tag = "4")]
    pub authors: Vec<String>,
    #[prost(string, optional, tag = "5")]
    pub version: Option<String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Op {
    #[prost(enumeration = "OpType", tag = "1")]
    pub op_type: i32,
    #[prost(message, optional, tag = "2")]
    pub triple: Option<Triple>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Triple {
    #[prost(string, tag = "1")]
    pub entity: String,
    #[prost(string, tag = "2")]
    pub attribute: String,
    #[prost(message, optional, tag = "3")]
    pub value: Option<Value>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Value {
    #[prost(enumeration = "ValueType", tag = "1")]
    pub value_type: i32,
    #[prost(string, tag = "2")]
    pub value: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum OpType {
    None = 0,
    SetTriple = 1,
    DeleteTriple = 2,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum ValueType {
    Unknown = 0,
    Text = 1,
    Number = 2,
    Entity = 3,
    Collection = 4,
    Checkbox = 5,
    Url = 6,
    Time = 7,
    GeoLocation = 8,
}
