//! SQLite storage backend for SpaceSink.
//!
//! Persists projected tables, the rollback journal, the content cache, and
//! the cursor to a single SQLite file. Every block commit and rollback runs
//! in one transaction.
//!
//! # Usage
//! ```rust,no_run
//! use spacesink_storage::sqlite::SqliteStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // File-backed (persistent)
//! let store = SqliteStore::open("./spaces.db").await?;
//!
//! // In-memory (tests / ephemeral)
//! let store = SqliteStore::in_memory().await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqliteConnection, SqlitePoolOptions};
use sqlx::{Row as SqlRow, Sqlite, SqlitePool};
use tracing::debug;

use spacesink_core::cursor::Cursor;
use spacesink_core::error::IndexerError;
use spacesink_core::model::{Row, RowImage, RowKey, RowWrite, Table};
use spacesink_core::store::{horizon_error, CacheEntry, ContentCacheStore, SinkStore};

use crate::codec;
use crate::schema::{self, Dialect};

const D: Dialect = Dialect::Sqlite;

fn storage_err(e: sqlx::Error) -> IndexerError {
    IndexerError::Storage(e.to_string())
}

type SqliteQuery<'q> = Query<'q, Sqlite, SqliteArguments<'q>>;

fn bind_key<'q>(mut q: SqliteQuery<'q>, key: &'q RowKey) -> SqliteQuery<'q> {
    for part in &key.parts {
        q = q.bind(part.as_str());
    }
    q
}

fn bind_row<'q>(q: SqliteQuery<'q>, row: &'q Row) -> SqliteQuery<'q> {
    let mut q = bind_key(q, &row.key);
    for value in &row.values {
        q = q.bind(value.as_deref());
    }
    q.bind(row.block_number as i64)
}

/// SQLite-backed sink storage.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) a SQLite database at `path`.
    ///
    /// The path may be a plain file path (`"./spaces.db"`) or a full
    /// SQLite URL (`"sqlite:./spaces.db?mode=rwc"`).
    pub async fn open(path: &str) -> Result<Self, IndexerError> {
        // create the file unless the caller passed explicit options
        let url = match path.strip_prefix("sqlite:") {
            Some(rest) if rest.contains('?') || rest == ":memory:" => path.to_string(),
            Some(rest) => format!("sqlite:{rest}?mode=rwc"),
            None => format!("sqlite:{path}?mode=rwc"),
        };

        let pool = SqlitePool::connect(&url).await.map_err(storage_err)?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Open an in-memory SQLite database.
    ///
    /// The pool holds a single connection, since every SQLite memory
    /// connection is its own database.
    pub async fn in_memory() -> Result<Self, IndexerError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(storage_err)?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), IndexerError> {
        sqlx::query("PRAGMA journal_mode=WAL;")
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;

        for table in Table::ALL {
            sqlx::query(&schema::create_table(table, D))
                .execute(&self.pool)
                .await
                .map_err(storage_err)?;
        }
        for ddl in schema::support_tables(D) {
            sqlx::query(&ddl).execute(&self.pool).await.map_err(storage_err)?;
        }

        debug!("SqliteStore schema initialized");
        Ok(())
    }

    /// Row count for every projected table.
    pub async fn table_counts(&self) -> Result<Vec<(Table, u64)>, IndexerError> {
        let mut counts = Vec::with_capacity(Table::ALL.len());
        for table in Table::ALL {
            let n: i64 = sqlx::query_scalar(&schema::count(table))
                .fetch_one(&self.pool)
                .await
                .map_err(storage_err)?;
            counts.push((table, n as u64));
        }
        Ok(counts)
    }

    /// Get the underlying connection pool (for custom queries).
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

// ─── Transaction helpers ──────────────────────────────────────────────────────

async fn fetch_image(conn: &mut SqliteConnection, key: &RowKey) -> Result<Option<RowImage>, IndexerError> {
    let sql = schema::select(key.table, D);
    let row = bind_key(sqlx::query(&sql), key)
        .fetch_optional(&mut *conn)
        .await
        .map_err(storage_err)?;

    let Some(row) = row else {
        return Ok(None);
    };
    let width = key.table.value_columns().len();
    let values = (0..width)
        .map(|i| row.try_get::<Option<String>, _>(i))
        .collect::<Result<Vec<_>, _>>()
        .map_err(storage_err)?;
    let block_number: i64 = row.try_get(width).map_err(storage_err)?;
    Ok(Some(RowImage {
        values,
        block_number: block_number as u64,
    }))
}

async fn execute_write(conn: &mut SqliteConnection, write: &RowWrite) -> Result<(), IndexerError> {
    let sql = match write {
        RowWrite::Upsert(row) => schema::upsert(row.key.table, D),
        RowWrite::InsertIfAbsent(row) => schema::insert_if_absent(row.key.table, D),
        RowWrite::Merge(row) => schema::merge(row.key.table, D),
        RowWrite::Delete(key) => schema::delete(key.table, D),
    };
    let query = match write {
        RowWrite::Upsert(row) | RowWrite::InsertIfAbsent(row) | RowWrite::Merge(row) => {
            bind_row(sqlx::query(&sql), row)
        }
        RowWrite::Delete(key) => bind_key(sqlx::query(&sql), key),
    };
    query.execute(&mut *conn).await.map_err(storage_err)?;
    Ok(())
}

async fn save_cursor(conn: &mut SqliteConnection, cursor: &Cursor) -> Result<(), IndexerError> {
    sqlx::query(&schema::save_cursor(D))
        .bind(&cursor.token)
        .bind(cursor.block_number as i64)
        .bind(&cursor.block_hash)
        .bind(cursor.applied)
        .bind(chrono::Utc::now().timestamp())
        .execute(&mut *conn)
        .await
        .map_err(storage_err)?;
    Ok(())
}

async fn load_horizon(conn: &mut SqliteConnection) -> Result<u64, IndexerError> {
    let horizon: Option<i64> = sqlx::query_scalar(&schema::load_horizon())
        .fetch_optional(&mut *conn)
        .await
        .map_err(storage_err)?;
    Ok(horizon.unwrap_or(0) as u64)
}

// ─── SinkStore impl ───────────────────────────────────────────────────────────

#[async_trait]
impl SinkStore for SqliteStore {
    async fn load_cursor(&self) -> Result<Option<Cursor>, IndexerError> {
        let row = sqlx::query(&schema::load_cursor())
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?;

        row.map(|r| {
            Ok(Cursor {
                token: r.try_get("cursor").map_err(storage_err)?,
                block_number: r.try_get::<i64, _>("block_number").map_err(storage_err)? as u64,
                block_hash: r.try_get("block_hash").map_err(storage_err)?,
                applied: r.try_get("applied").map_err(storage_err)?,
            })
        })
        .transpose()
    }

    async fn commit_block(&self, cursor: &Cursor, writes: &[RowWrite]) -> Result<(), IndexerError> {
        let mut tx = self.pool.begin().await.map_err(storage_err)?;
        let journal_sql = schema::journal_insert(D);

        for write in writes {
            let key = write.key();
            let before = fetch_image(&mut tx, key).await?;
            let changes = match write {
                RowWrite::Upsert(_) | RowWrite::Merge(_) => true,
                RowWrite::InsertIfAbsent(_) => before.is_none(),
                RowWrite::Delete(_) => before.is_some(),
            };
            if !changes {
                continue;
            }

            execute_write(&mut tx, write).await?;
            sqlx::query(&journal_sql)
                .bind(cursor.block_number as i64)
                .bind(key.table.name())
                .bind(codec::encode_key(key)?)
                .bind(codec::encode_image(before.as_ref())?)
                .execute(&mut *tx)
                .await
                .map_err(storage_err)?;
        }

        save_cursor(&mut tx, cursor).await?;
        tx.commit().await.map_err(storage_err)?;
        debug!(block = cursor.block_number, writes = writes.len(), "Committed block");
        Ok(())
    }

    async fn rollback_to(&self, target: u64, cursor: &Cursor) -> Result<u64, IndexerError> {
        let mut tx = self.pool.begin().await.map_err(storage_err)?;

        let horizon = load_horizon(&mut tx).await?;
        if target < horizon {
            return Err(horizon_error(target, horizon));
        }

        let entries = sqlx::query(&schema::journal_since(D))
            .bind(target as i64)
            .fetch_all(&mut *tx)
            .await
            .map_err(storage_err)?;

        for entry in &entries {
            let table_name: String = entry.try_get(0).map_err(storage_err)?;
            let key_json: String = entry.try_get(1).map_err(storage_err)?;
            let before_json: Option<String> = entry.try_get(2).map_err(storage_err)?;

            let key = codec::decode_key(&table_name, &key_json)?;
            let write = match codec::decode_image(before_json.as_deref())? {
                Some(image) => RowWrite::Upsert(image.into_row(key)),
                None => RowWrite::Delete(key),
            };
            execute_write(&mut tx, &write).await?;
        }

        sqlx::query(&schema::journal_delete_since(D))
            .bind(target as i64)
            .execute(&mut *tx)
            .await
            .map_err(storage_err)?;
        save_cursor(&mut tx, cursor).await?;
        tx.commit().await.map_err(storage_err)?;

        Ok(entries.len() as u64)
    }

    async fn get_row(&self, key: &RowKey) -> Result<Option<Row>, IndexerError> {
        let mut conn = self.pool.acquire().await.map_err(storage_err)?;
        let image = fetch_image(&mut conn, key).await?;
        Ok(image.map(|i| i.into_row(key.clone())))
    }

    async fn prune_journal(&self, below_block: u64) -> Result<u64, IndexerError> {
        let mut tx = self.pool.begin().await.map_err(storage_err)?;
        let result = sqlx::query(&schema::journal_prune(D))
            .bind(below_block as i64)
            .execute(&mut *tx)
            .await
            .map_err(storage_err)?;
        sqlx::query(&schema::raise_horizon(D))
            .bind(below_block as i64)
            .bind(below_block as i64)
            .execute(&mut *tx)
            .await
            .map_err(storage_err)?;
        tx.commit().await.map_err(storage_err)?;
        Ok(result.rows_affected())
    }

    async fn reset(&self) -> Result<(), IndexerError> {
        let mut tx = self.pool.begin().await.map_err(storage_err)?;
        for name in schema::all_table_names() {
            sqlx::query(&format!("DELETE FROM {name}"))
                .execute(&mut *tx)
                .await
                .map_err(storage_err)?;
        }
        tx.commit().await.map_err(storage_err)
    }
}

// ─── ContentCacheStore impl ───────────────────────────────────────────────────

#[async_trait]
impl ContentCacheStore for SqliteStore {
    async fn get_content(&self, uri: &str) -> Result<Option<CacheEntry>, IndexerError> {
        let row = sqlx::query(&schema::cache_get(D))
            .bind(uri)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?;

        row.map(|r| {
            let json: Option<String> = r.try_get("json").map_err(storage_err)?;
            Ok(CacheEntry {
                uri: r.try_get("uri").map_err(storage_err)?,
                json: codec::decode_content(json.as_deref())?,
                is_errored: r.try_get("is_errored").map_err(storage_err)?,
            })
        })
        .transpose()
    }

    async fn insert_content(&self, entry: &CacheEntry) -> Result<bool, IndexerError> {
        let result = sqlx::query(&schema::cache_insert(D))
            .bind(&entry.uri)
            .bind(codec::encode_content(entry.json.as_ref()))
            .bind(entry.is_errored)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(result.rows_affected() == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vote(voter: &str, option: &str, block: u64) -> Row {
        Row::new(
            RowKey::new(Table::Votes, vec!["proposal-1".into(), voter.into()]),
            vec![Some(option.into()), Some("0xplugin".into()), Some("7".into())],
            block,
        )
    }

    fn cursor(n: u64) -> Cursor {
        Cursor::new(format!("c{n}"), n, format!("0x{n:02x}"))
    }

    // ── SinkStore ─────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn cursor_roundtrip() {
        let store = SqliteStore::in_memory().await.unwrap();
        assert!(store.load_cursor().await.unwrap().is_none());

        store.commit_block(&cursor(42), &[]).await.unwrap();
        let loaded = store.load_cursor().await.unwrap().unwrap();
        assert_eq!(loaded, cursor(42));
    }

    #[tokio::test]
    async fn upsert_overwrites_and_insert_if_absent_keeps_first() {
        let store = SqliteStore::in_memory().await.unwrap();
        store
            .commit_block(&cursor(1), &[RowWrite::Upsert(vote("0xa", "accept", 1))])
            .await
            .unwrap();
        store
            .commit_block(
                &cursor(2),
                &[
                    RowWrite::Upsert(vote("0xa", "reject", 2)),
                    RowWrite::InsertIfAbsent(vote("0xa", "accept", 2)),
                ],
            )
            .await
            .unwrap();

        let row = store.get_row(&vote("0xa", "", 0).key).await.unwrap().unwrap();
        assert_eq!(row.get("vote_option"), Some("reject"));
        assert_eq!(row.block_number, 2);
    }

    #[tokio::test]
    async fn merge_fills_gaps_and_rolls_back() {
        let store = SqliteStore::in_memory().await.unwrap();
        store
            .commit_block(&cursor(1), &[RowWrite::Merge(vote("0xa", "accept", 1))])
            .await
            .unwrap();
        let partial = Row::new(vote("0xa", "", 0).key, vec![None, None, Some("8".into())], 2);
        store.commit_block(&cursor(2), &[RowWrite::Merge(partial)]).await.unwrap();

        let key = vote("0xa", "", 0).key;
        let row = store.get_row(&key).await.unwrap().unwrap();
        assert_eq!(row.get("vote_option"), Some("accept"));
        assert_eq!(row.get("onchain_proposal_id"), Some("8"));
        assert_eq!(row.block_number, 2);

        store.rollback_to(2, &cursor(1)).await.unwrap();
        let row = store.get_row(&key).await.unwrap().unwrap();
        assert_eq!(row.get("onchain_proposal_id"), Some("7"));
        assert_eq!(row.block_number, 1);
    }

    #[tokio::test]
    async fn rollback_restores_rows_and_cursor() {
        let store = SqliteStore::in_memory().await.unwrap();
        store
            .commit_block(&cursor(1), &[RowWrite::Upsert(vote("0xa", "accept", 1))])
            .await
            .unwrap();
        store
            .commit_block(
                &cursor(2),
                &[
                    RowWrite::Upsert(vote("0xa", "reject", 2)),
                    RowWrite::Upsert(vote("0xb", "accept", 2)),
                ],
            )
            .await
            .unwrap();
        store
            .commit_block(&cursor(3), &[RowWrite::Delete(vote("0xa", "", 0).key)])
            .await
            .unwrap();

        let reverted = store.rollback_to(2, &cursor(2)).await.unwrap();
        assert_eq!(reverted, 3);

        let a = store.get_row(&vote("0xa", "", 0).key).await.unwrap().unwrap();
        assert_eq!(a.get("vote_option"), Some("accept"));
        assert_eq!(a.block_number, 1);
        assert!(store.get_row(&vote("0xb", "", 0).key).await.unwrap().is_none());
        assert_eq!(store.load_cursor().await.unwrap().unwrap().block_number, 2);

        let counts = store.table_counts().await.unwrap();
        assert!(counts.contains(&(Table::Votes, 1)));
    }

    #[tokio::test]
    async fn redelivered_block_rolls_back_cleanly() {
        let store = SqliteStore::in_memory().await.unwrap();
        store
            .commit_block(&cursor(5), &[RowWrite::Upsert(vote("0xa", "accept", 5))])
            .await
            .unwrap();
        store
            .commit_block(&cursor(5), &[RowWrite::Upsert(vote("0xa", "accept", 5))])
            .await
            .unwrap();
        store.rollback_to(5, &cursor(4)).await.unwrap();
        assert!(store.get_row(&vote("0xa", "", 0).key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn prune_and_reset() {
        let store = SqliteStore::in_memory().await.unwrap();
        for n in 1..=4 {
            store
                .commit_block(&cursor(n), &[RowWrite::Upsert(vote("0xa", "accept", n))])
                .await
                .unwrap();
        }
        assert_eq!(store.prune_journal(3).await.unwrap(), 2);

        store.reset().await.unwrap();
        assert!(store.load_cursor().await.unwrap().is_none());
        assert!(store.get_row(&vote("0xa", "", 0).key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rollback_below_journal_horizon_is_refused() {
        let store = SqliteStore::in_memory().await.unwrap();
        for n in 1..=5 {
            store
                .commit_block(&cursor(n), &[RowWrite::Upsert(vote(&format!("0x{n}"), "accept", n))])
                .await
                .unwrap();
        }
        assert_eq!(store.prune_journal(4).await.unwrap(), 3);
        // a lower prune never lowers the horizon
        assert_eq!(store.prune_journal(2).await.unwrap(), 0);

        let err = store.rollback_to(2, &cursor(2)).await.unwrap_err();
        assert!(matches!(err, IndexerError::Rollback { target: 2, .. }));
        assert_eq!(store.load_cursor().await.unwrap().unwrap().block_number, 5);
        let counts = store.table_counts().await.unwrap();
        assert!(counts.contains(&(Table::Votes, 5)));

        assert_eq!(store.rollback_to(4, &cursor(4)).await.unwrap(), 2);
        let counts = store.table_counts().await.unwrap();
        assert!(counts.contains(&(Table::Votes, 3)));
    }

    #[tokio::test]
    async fn reverted_cursor_persists_applied_flag() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.commit_block(&cursor(3), &[]).await.unwrap();
        let reverted = Cursor {
            applied: false,
            ..cursor(3)
        };
        store.rollback_to(3, &reverted).await.unwrap();

        let loaded = store.load_cursor().await.unwrap().unwrap();
        assert!(!loaded.applied);
        assert_eq!(loaded.last_applied_block(), Some(2));
    }

    // ── ContentCacheStore ─────────────────────────────────────────────────────

    #[tokio::test]
    async fn content_cache_never_overwrites() {
        let store = SqliteStore::in_memory().await.unwrap();
        let ok = CacheEntry::decoded("ipfs://bafy", serde_json::json!({"id": "e1"}));
        assert!(store.insert_content(&ok).await.unwrap());
        assert!(!store.insert_content(&CacheEntry::failed("ipfs://bafy")).await.unwrap());

        let loaded = store.get_content("ipfs://bafy").await.unwrap().unwrap();
        assert_eq!(loaded, ok);
        assert!(store.get_content("ipfs://missing").await.unwrap().is_none());
    }
}
