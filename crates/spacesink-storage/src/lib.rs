//! spacesink-storage: pluggable storage backends for SpaceSink.
//!
//! Backends:
//! - [`memory`]: in-memory (dev/testing, no persistence)
//! - `sqlite`: SQLite via `sqlx` (embedded, single-file persistence)
//! - `postgres`: PostgreSQL via `sqlx` (pooled, production)
//!
//! Each backend implements both [`SinkStore`] and [`ContentCacheStore`].
//! [`Backend::open`] picks one from a connection URL.

pub mod memory;

#[cfg(any(feature = "sqlite", feature = "postgres"))]
mod codec;
#[cfg(any(feature = "sqlite", feature = "postgres"))]
pub mod schema;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "postgres")]
pub mod postgres;

use std::sync::Arc;

use spacesink_core::error::IndexerError;
use spacesink_core::model::Table;
use spacesink_core::store::{ContentCacheStore, SinkStore};

pub use memory::MemoryStore;
#[cfg(feature = "postgres")]
pub use postgres::{PostgresOptions, PostgresStore};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

/// A storage backend chosen at runtime.
#[derive(Clone)]
pub enum Backend {
    Memory(Arc<MemoryStore>),
    #[cfg(feature = "sqlite")]
    Sqlite(Arc<SqliteStore>),
    #[cfg(feature = "postgres")]
    Postgres(Arc<PostgresStore>),
}

impl Backend {
    /// Open a backend from a URL:
    ///
    /// - `memory`
    /// - `sqlite:./spaces.db`, `sqlite::memory:`, or a path ending in `.db`
    /// - `postgres://…` / `postgresql://…`
    pub async fn open(url: &str) -> Result<Self, IndexerError> {
        if url == "memory" {
            return Ok(Self::Memory(Arc::new(MemoryStore::new())));
        }

        #[cfg(feature = "sqlite")]
        if url.starts_with("sqlite:") || url.ends_with(".db") || url.ends_with(".sqlite") {
            let store = if url == "sqlite::memory:" {
                SqliteStore::in_memory().await?
            } else {
                SqliteStore::open(url).await?
            };
            return Ok(Self::Sqlite(Arc::new(store)));
        }

        #[cfg(feature = "postgres")]
        if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            return Ok(Self::Postgres(Arc::new(PostgresStore::connect(url).await?)));
        }

        Err(IndexerError::Config(format!(
            "unsupported database url `{url}` (is the backend feature enabled?)"
        )))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Memory(_) => "memory",
            #[cfg(feature = "sqlite")]
            Self::Sqlite(_) => "sqlite",
            #[cfg(feature = "postgres")]
            Self::Postgres(_) => "postgres",
        }
    }

    pub fn sink_store(&self) -> Arc<dyn SinkStore> {
        match self {
            Self::Memory(s) => s.clone(),
            #[cfg(feature = "sqlite")]
            Self::Sqlite(s) => s.clone(),
            #[cfg(feature = "postgres")]
            Self::Postgres(s) => s.clone(),
        }
    }

    pub fn cache_store(&self) -> Arc<dyn ContentCacheStore> {
        match self {
            Self::Memory(s) => s.clone(),
            #[cfg(feature = "sqlite")]
            Self::Sqlite(s) => s.clone(),
            #[cfg(feature = "postgres")]
            Self::Postgres(s) => s.clone(),
        }
    }

    /// Row count for every projected table.
    pub async fn table_counts(&self) -> Result<Vec<(Table, u64)>, IndexerError> {
        match self {
            Self::Memory(s) => Ok(Table::ALL
                .into_iter()
                .map(|t| (t, s.table_rows(t).len() as u64))
                .collect()),
            #[cfg(feature = "sqlite")]
            Self::Sqlite(s) => s.table_counts().await,
            #[cfg(feature = "postgres")]
            Self::Postgres(s) => s.table_counts().await,
        }
    }
}
