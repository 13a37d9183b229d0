//! Off-chain content: edit decoding, the two-tier cache, and the resolver.

pub mod cache;
pub mod edit;
pub mod resolver;

pub use cache::{ContentCache, DurableContentCache, LruContentCache, TieredCache};
pub use edit::{decode_edit, decode_edit_json, DecodedEdit, EditOp, TripleValue, ValueType};
pub use resolver::{is_supported_uri, ContentFetcher, ContentResolver, Resolved};
