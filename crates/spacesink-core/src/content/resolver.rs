//! Content resolution: cache lookup, fetch with retry, decode, cache result.

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;

use crate::content::cache::ContentCache;
use crate::content::edit::{decode_edit, decode_edit_json, DecodedEdit};
use crate::error::{ContentError, IndexerError};
use crate::reporter::{NoopReporter, Reporter};
use crate::retry::RetryPolicy;
use crate::store::CacheEntry;

const IPFS_SCHEME: &str = "ipfs://";
/// Edits embedded in the uri itself as base64 JSON.
const INLINE_JSON_PREFIX: &str = "data:application/json;base64,";

/// Whether `uri` names content this resolver can look up.
pub fn is_supported_uri(uri: &str) -> bool {
    uri.starts_with(IPFS_SCHEME) || uri.starts_with(INLINE_JSON_PREFIX)
}

/// Fetches raw bytes by content identifier from the content network.
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    /// Fetch the bytes for `cid` (the uri without its `ipfs://` scheme).
    /// Network failures must be reported as transient [`IndexerError`]s.
    async fn fetch(&self, cid: &str) -> Result<Vec<u8>, IndexerError>;
}

/// Outcome of resolving a content uri.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    Edit(DecodedEdit),
    /// Content is known to be undecodable. Permanent.
    Failed(String),
}

impl Resolved {
    pub fn edit(&self) -> Option<&DecodedEdit> {
        match self {
            Self::Edit(e) => Some(e),
            Self::Failed(_) => None,
        }
    }
}

pub struct ContentResolver {
    fetcher: Arc<dyn ContentFetcher>,
    cache: Arc<dyn ContentCache>,
    retry: RetryPolicy,
    reporter: Arc<dyn Reporter>,
}

impl ContentResolver {
    pub fn new(fetcher: Arc<dyn ContentFetcher>, cache: Arc<dyn ContentCache>) -> Self {
        Self {
            fetcher,
            cache,
            retry: RetryPolicy::default(),
            reporter: Arc::new(NoopReporter),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Resolve `uri` to a decoded edit or a permanent failure.
    ///
    /// `data:` uris are decoded in place and never reach the fetcher. Only
    /// transport failures that outlast the retry budget are returned as
    /// `Err`; those are not cached.
    pub async fn resolve(&self, uri: &str) -> Result<Resolved, IndexerError> {
        if let Some(entry) = self.cache.get(uri).await? {
            tracing::trace!(uri, errored = entry.is_errored, "Content cache hit");
            return Ok(self.resolved_from(entry));
        }

        let decoded = if let Some(cid) = uri.strip_prefix(IPFS_SCHEME).filter(|c| !c.is_empty()) {
            let bytes = self
                .retry
                .run("fetch_content", || self.fetcher.fetch(cid))
                .await?;
            decode_edit(&bytes)
        } else if let Some(encoded) = uri.strip_prefix(INLINE_JSON_PREFIX) {
            base64::engine::general_purpose::STANDARD
                .decode(encoded.trim())
                .map_err(|e| ContentError::Undecodable(format!("bad base64: {e}")))
                .and_then(|bytes| decode_edit_json(&bytes))
        } else {
            Err(ContentError::UnsupportedUri(uri.to_string()))
        };
        let entry = match decoded.and_then(|edit| {
            serde_json::to_value(&edit).map_err(|e| ContentError::Undecodable(e.to_string()))
        }) {
            Ok(json) => CacheEntry::decoded(uri, json),
            Err(e) => {
                // Reported once, when the failure is first recorded.
                self.reporter.content_failed(uri, &e.to_string());
                CacheEntry::failed(uri)
            }
        };

        let stored = self.cache.insert(entry).await?;
        Ok(self.resolved_from(stored))
    }

    fn resolved_from(&self, entry: CacheEntry) -> Resolved {
        if entry.is_errored {
            return Resolved::Failed(format!("'{}' is cached as undecodable", entry.uri));
        }
        let Some(json) = entry.json else {
            return Resolved::Failed(format!("'{}' has an empty cache row", entry.uri));
        };
        match serde_json::from_value::<DecodedEdit>(json) {
            Ok(edit) => Resolved::Edit(edit),
            Err(e) => Resolved::Failed(format!("'{}' cached payload is not an edit: {e}", entry.uri)),
        }
    }
}
