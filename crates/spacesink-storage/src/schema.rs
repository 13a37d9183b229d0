//! SQL generation for the relational backends.
//!
//! Every projected table is described by [`Table`]; DDL and DML are built from
//! its key and value columns. Placeholders and a few column types differ per
//! [`Dialect`].

use spacesink_core::model::Table;

pub const CURSOR_TABLE: &str = "sink_cursor";
pub const JOURNAL_TABLE: &str = "block_journal";
pub const CACHE_TABLE: &str = "ipfs_cache";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Sqlite,
    Postgres,
}

impl Dialect {
    /// Bind placeholder for the `n`th parameter (1-based).
    pub fn placeholder(&self, n: usize) -> String {
        match self {
            Self::Sqlite => "?".to_string(),
            Self::Postgres => format!("${n}"),
        }
    }

    fn placeholders(&self, from: usize, count: usize) -> Vec<String> {
        (from..from + count).map(|n| self.placeholder(n)).collect()
    }

    fn block_type(&self) -> &'static str {
        match self {
            Self::Sqlite => "INTEGER",
            Self::Postgres => "BIGINT",
        }
    }

    fn serial_pk(&self) -> &'static str {
        match self {
            Self::Sqlite => "INTEGER PRIMARY KEY AUTOINCREMENT",
            Self::Postgres => "BIGSERIAL PRIMARY KEY",
        }
    }

    fn bool_type(&self) -> &'static str {
        match self {
            Self::Sqlite => "INTEGER",
            Self::Postgres => "BOOLEAN",
        }
    }
}

// ─── DDL ──────────────────────────────────────────────────────────────────────

pub fn create_table(table: Table, dialect: Dialect) -> String {
    let mut cols: Vec<String> = table
        .key_columns()
        .iter()
        .map(|c| format!("{c} TEXT NOT NULL"))
        .collect();
    cols.extend(table.value_columns().iter().map(|c| format!("{c} TEXT")));
    cols.push(format!("block_number {} NOT NULL", dialect.block_type()));
    cols.push(format!("PRIMARY KEY ({})", table.key_columns().join(", ")));
    format!("CREATE TABLE IF NOT EXISTS {} ({})", table.name(), cols.join(", "))
}

/// DDL for the cursor, journal, and cache tables, plus the journal index.
pub fn support_tables(dialect: Dialect) -> Vec<String> {
    let block = dialect.block_type();
    vec![
        format!(
            "CREATE TABLE IF NOT EXISTS {CURSOR_TABLE} (
                id              INTEGER PRIMARY KEY CHECK (id = 1),
                cursor          TEXT    NOT NULL,
                block_number    {block}  NOT NULL,
                block_hash      TEXT    NOT NULL,
                applied         {flag}  NOT NULL,
                journal_horizon {block}  NOT NULL DEFAULT 0,
                updated_at      {block}  NOT NULL
            )",
            flag = dialect.bool_type()
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {JOURNAL_TABLE} (
                id           {},
                block_number {block} NOT NULL,
                table_name   TEXT   NOT NULL,
                key_json     TEXT   NOT NULL,
                before_json  TEXT
            )",
            dialect.serial_pk()
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS idx_{JOURNAL_TABLE}_block ON {JOURNAL_TABLE}(block_number)"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {CACHE_TABLE} (
                uri        TEXT PRIMARY KEY,
                json       TEXT,
                is_errored {} NOT NULL
            )",
            dialect.bool_type()
        ),
    ]
}

// ─── Row DML ──────────────────────────────────────────────────────────────────

fn key_predicate(table: Table, dialect: Dialect, first: usize) -> String {
    table
        .key_columns()
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{c} = {}", dialect.placeholder(first + i)))
        .collect::<Vec<_>>()
        .join(" AND ")
}

fn insert_prefix(table: Table, dialect: Dialect) -> String {
    let cols: Vec<&str> = table
        .key_columns()
        .iter()
        .chain(table.value_columns())
        .copied()
        .chain(std::iter::once("block_number"))
        .collect();
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table.name(),
        cols.join(", "),
        dialect.placeholders(1, cols.len()).join(", ")
    )
}

/// Insert or overwrite. Binds: key parts, values, block_number.
pub fn upsert(table: Table, dialect: Dialect) -> String {
    let sets: Vec<String> = table
        .value_columns()
        .iter()
        .chain(std::iter::once(&"block_number"))
        .map(|c| format!("{c} = excluded.{c}"))
        .collect();
    format!(
        "{} ON CONFLICT ({}) DO UPDATE SET {}",
        insert_prefix(table, dialect),
        table.key_columns().join(", "),
        sets.join(", ")
    )
}

/// Insert, or overwrite only the columns bound to non-null values.
/// Binds: key parts, values, block_number.
pub fn merge(table: Table, dialect: Dialect) -> String {
    let name = table.name();
    let sets: Vec<String> = table
        .value_columns()
        .iter()
        .map(|c| format!("{c} = COALESCE(excluded.{c}, {name}.{c})"))
        .chain(std::iter::once("block_number = excluded.block_number".to_string()))
        .collect();
    format!(
        "{} ON CONFLICT ({}) DO UPDATE SET {}",
        insert_prefix(table, dialect),
        table.key_columns().join(", "),
        sets.join(", ")
    )
}

/// Insert unless present. Binds: key parts, values, block_number.
pub fn insert_if_absent(table: Table, dialect: Dialect) -> String {
    format!("{} ON CONFLICT DO NOTHING", insert_prefix(table, dialect))
}

/// Binds: key parts.
pub fn delete(table: Table, dialect: Dialect) -> String {
    format!(
        "DELETE FROM {} WHERE {}",
        table.name(),
        key_predicate(table, dialect, 1)
    )
}

/// Selects value columns then `block_number`. Binds: key parts.
pub fn select(table: Table, dialect: Dialect) -> String {
    let mut cols: Vec<&str> = table.value_columns().to_vec();
    cols.push("block_number");
    format!(
        "SELECT {} FROM {} WHERE {}",
        cols.join(", "),
        table.name(),
        key_predicate(table, dialect, 1)
    )
}

pub fn count(table: Table) -> String {
    format!("SELECT COUNT(*) FROM {}", table.name())
}

// ─── Support DML ──────────────────────────────────────────────────────────────

pub fn load_cursor() -> String {
    format!("SELECT cursor, block_number, block_hash, applied FROM {CURSOR_TABLE} WHERE id = 1")
}

/// Binds: cursor, block_number, block_hash, applied, updated_at.
/// Leaves `journal_horizon` alone.
pub fn save_cursor(dialect: Dialect) -> String {
    format!(
        "INSERT INTO {CURSOR_TABLE} (id, cursor, block_number, block_hash, applied, updated_at)
         VALUES (1, {}) ON CONFLICT (id) DO UPDATE SET
            cursor       = excluded.cursor,
            block_number = excluded.block_number,
            block_hash   = excluded.block_hash,
            applied      = excluded.applied,
            updated_at   = excluded.updated_at",
        dialect.placeholders(1, 5).join(", ")
    )
}

pub fn load_horizon() -> String {
    format!("SELECT journal_horizon FROM {CURSOR_TABLE} WHERE id = 1")
}

/// Raise the horizon, never lower it. Binds: below_block (twice).
pub fn raise_horizon(dialect: Dialect) -> String {
    format!(
        "UPDATE {CURSOR_TABLE} SET journal_horizon = {} WHERE id = 1 AND journal_horizon < {}",
        dialect.placeholder(1),
        dialect.placeholder(2)
    )
}

/// Binds: block_number, table_name, key_json, before_json.
pub fn journal_insert(dialect: Dialect) -> String {
    format!(
        "INSERT INTO {JOURNAL_TABLE} (block_number, table_name, key_json, before_json) VALUES ({})",
        dialect.placeholders(1, 4).join(", ")
    )
}

/// Newest entry first. Binds: target block.
pub fn journal_since(dialect: Dialect) -> String {
    format!(
        "SELECT table_name, key_json, before_json FROM {JOURNAL_TABLE}
         WHERE block_number >= {} ORDER BY id DESC",
        dialect.placeholder(1)
    )
}

pub fn journal_delete_since(dialect: Dialect) -> String {
    format!(
        "DELETE FROM {JOURNAL_TABLE} WHERE block_number >= {}",
        dialect.placeholder(1)
    )
}

pub fn journal_prune(dialect: Dialect) -> String {
    format!(
        "DELETE FROM {JOURNAL_TABLE} WHERE block_number < {}",
        dialect.placeholder(1)
    )
}

pub fn cache_get(dialect: Dialect) -> String {
    format!(
        "SELECT uri, json, is_errored FROM {CACHE_TABLE} WHERE uri = {}",
        dialect.placeholder(1)
    )
}

/// Binds: uri, json, is_errored.
pub fn cache_insert(dialect: Dialect) -> String {
    format!(
        "INSERT INTO {CACHE_TABLE} (uri, json, is_errored) VALUES ({}) ON CONFLICT (uri) DO NOTHING",
        dialect.placeholders(1, 3).join(", ")
    )
}

/// Every table `reset` truncates.
pub fn all_table_names() -> Vec<&'static str> {
    let mut names: Vec<&'static str> = Table::ALL.iter().map(|t| t.name()).collect();
    names.extend([JOURNAL_TABLE, CACHE_TABLE, CURSOR_TABLE]);
    names
}
