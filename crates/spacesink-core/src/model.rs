//! Projected row model.
//!
//! Every projected entity is a row in one of the [`Table`]s: a composite text
//! key, a fixed list of nullable text value columns, and the `block_number`
//! that last wrote it. Storage backends derive their DDL and DML from the
//! table definitions here, so the projector never writes SQL.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// ─── Tables ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Spaces,
    Editors,
    Members,
    Subspaces,
    Votes,
    Proposals,
    MembershipRequests,
    Profiles,
    Triples,
    Relations,
}

impl Table {
    pub const ALL: [Table; 10] = [
        Table::Spaces,
        Table::Editors,
        Table::Members,
        Table::Subspaces,
        Table::Votes,
        Table::Proposals,
        Table::MembershipRequests,
        Table::Profiles,
        Table::Triples,
        Table::Relations,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Spaces => "spaces",
            Self::Editors => "space_editors",
            Self::Members => "space_members",
            Self::Subspaces => "subspaces",
            Self::Votes => "proposal_votes",
            Self::Proposals => "proposals",
            Self::MembershipRequests => "membership_requests",
            Self::Profiles => "profiles",
            Self::Triples => "triples",
            Self::Relations => "relations",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.name() == name)
    }

    pub fn key_columns(&self) -> &'static [&'static str] {
        match self {
            Self::Spaces | Self::Proposals => &["id"],
            Self::Editors | Self::Members => &["space_id", "account"],
            Self::Subspaces => &["parent_space_id", "child_space_id"],
            Self::Votes => &["proposal_id", "voter"],
            Self::MembershipRequests | Self::Profiles => &["space_id", "requestor"],
            Self::Triples => &["space_id", "entity_id", "attribute_id"],
            Self::Relations => &["space_id", "from_entity_id", "relation_type_id"],
        }
    }

    pub fn value_columns(&self) -> &'static [&'static str] {
        match self {
            Self::Spaces => &["network", "dao_address", "space_address"],
            Self::Editors | Self::Members => &["plugin_address"],
            Self::Subspaces => &["plugin_address"],
            Self::Votes => &["vote_option", "plugin_address", "onchain_proposal_id"],
            Self::Proposals => &[
                "space_id",
                "plugin_address",
                "onchain_proposal_id",
                "content_uri",
                "edit_id",
                "name",
                "status",
                "authors",
                "creator",
                "start_time",
                "end_time",
            ],
            Self::MembershipRequests => &["dao_address"],
            Self::Profiles => &["profile_id"],
            Self::Triples => &["value_type", "value", "proposal_id"],
            Self::Relations => &["to_entity_id", "proposal_id"],
        }
    }
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ─── Rows ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RowKey {
    pub table: Table,
    /// One entry per [`Table::key_columns`].
    pub parts: Vec<String>,
}

impl RowKey {
    pub fn new(table: Table, parts: Vec<String>) -> Self {
        debug_assert_eq!(parts.len(), table.key_columns().len());
        Self { table, parts }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Row {
    pub key: RowKey,
    /// One entry per [`Table::value_columns`].
    pub values: Vec<Option<String>>,
    /// Block that last wrote this row.
    pub block_number: u64,
}

impl Row {
    pub fn new(key: RowKey, values: Vec<Option<String>>, block_number: u64) -> Self {
        debug_assert_eq!(values.len(), key.table.value_columns().len());
        Self {
            key,
            values,
            block_number,
        }
    }

    /// Value of a named column.
    pub fn get(&self, column: &str) -> Option<&str> {
        let idx = self.key.table.value_columns().iter().position(|c| *c == column)?;
        self.values.get(idx)?.as_deref()
    }
}

/// Previous state of a row, recorded before a write so it can be undone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowImage {
    pub values: Vec<Option<String>>,
    pub block_number: u64,
}

impl From<&Row> for RowImage {
    fn from(row: &Row) -> Self {
        Self {
            values: row.values.clone(),
            block_number: row.block_number,
        }
    }
}

impl RowImage {
    pub fn into_row(self, key: RowKey) -> Row {
        Row {
            key,
            values: self.values,
            block_number: self.block_number,
        }
    }
}

// ─── Writes ───────────────────────────────────────────────────────────────────

/// A single keyed mutation. All projection output is expressed as these, which
/// is what makes re-applying a block idempotent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowWrite {
    /// Insert, or overwrite every value column of the existing row.
    Upsert(Row),
    /// Insert unless a row with the same key exists.
    InsertIfAbsent(Row),
    /// Insert, or overwrite only the value columns that are `Some`.
    Merge(Row),
    Delete(RowKey),
}

impl RowWrite {
    pub fn key(&self) -> &RowKey {
        match self {
            Self::Upsert(row) | Self::InsertIfAbsent(row) | Self::Merge(row) => &row.key,
            Self::Delete(key) => key,
        }
    }
}

/// Journal record: what a key looked like before a write in some block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalEntry {
    pub block_number: u64,
    pub key: RowKey,
    /// `None` when the row did not exist.
    pub before: Option<RowImage>,
}

/// Column-wise merge: `update` wins where it has a value.
pub fn merge_values(existing: &[Option<String>], update: &[Option<String>]) -> Vec<Option<String>> {
    update
        .iter()
        .zip(existing)
        .map(|(new, old)| new.clone().or_else(|| old.clone()))
        .collect()
}

// ─── RowSet ───────────────────────────────────────────────────────────────────

/// An ordered in-memory set of rows with the same write semantics as the
/// relational backends.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowSet {
    rows: BTreeMap<RowKey, Row>,
}

impl RowSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &RowKey) -> Option<&Row> {
        self.rows.get(key)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows of one table, in key order.
    pub fn table(&self, table: Table) -> impl Iterator<Item = &Row> {
        self.rows.values().filter(move |r| r.key.table == table)
    }

    /// Apply a write. Returns the before-image if the write changed anything.
    pub fn apply(&mut self, write: &RowWrite) -> Option<Option<RowImage>> {
        match write {
            RowWrite::Upsert(row) => {
                let before = self.rows.insert(row.key.clone(), row.clone());
                Some(before.as_ref().map(RowImage::from))
            }
            RowWrite::InsertIfAbsent(row) => {
                if self.rows.contains_key(&row.key) {
                    None
                } else {
                    self.rows.insert(row.key.clone(), row.clone());
                    Some(None)
                }
            }
            RowWrite::Merge(row) => {
                let merged = match self.rows.get(&row.key) {
                    Some(existing) => merge_values(&existing.values, &row.values),
                    None => row.values.clone(),
                };
                let next = Row::new(row.key.clone(), merged, row.block_number);
                let before = self.rows.insert(row.key.clone(), next);
                Some(before.as_ref().map(RowImage::from))
            }
            RowWrite::Delete(key) => self.rows.remove(key).map(|old| Some(RowImage::from(&old))),
        }
    }

    /// Restore a journaled before-image.
    pub fn restore(&mut self, key: &RowKey, before: Option<RowImage>) {
        match before {
            Some(image) => {
                self.rows.insert(key.clone(), image.into_row(key.clone()));
            }
            None => {
                self.rows.remove(key);
            }
        }
    }

    pub fn clear(&mut self) {
        self.rows.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vote(option: &str, block: u64) -> Row {
        Row::new(
            RowKey::new(Table::Votes, vec!["p1".into(), "0xabc".into()]),
            vec![Some(option.into()), Some("0xplugin".into()), Some("1".into())],
            block,
        )
    }

    #[test]
    fn table_definitions_are_consistent() {
        for table in Table::ALL {
            assert!(!table.key_columns().is_empty());
            assert!(!table.value_columns().is_empty());
            assert_eq!(Table::from_name(table.name()), Some(table));
        }
    }

    #[test]
    fn upsert_overwrites_and_reports_before_image() {
        let mut set = RowSet::new();
        assert_eq!(set.apply(&RowWrite::Upsert(vote("accept", 1))), Some(None));
        let before = set.apply(&RowWrite::Upsert(vote("reject", 2))).unwrap().unwrap();
        assert_eq!(before.values[0].as_deref(), Some("accept"));
        assert_eq!(set.len(), 1);
        assert_eq!(set.get(&vote("x", 0).key).unwrap().get("vote_option"), Some("reject"));
    }

    #[test]
    fn insert_if_absent_keeps_first() {
        let mut set = RowSet::new();
        set.apply(&RowWrite::InsertIfAbsent(vote("accept", 1)));
        assert_eq!(set.apply(&RowWrite::InsertIfAbsent(vote("reject", 2))), None);
        assert_eq!(set.get(&vote("x", 0).key).unwrap().block_number, 1);
    }

    #[test]
    fn merge_keeps_columns_the_update_leaves_empty() {
        let mut set = RowSet::new();
        let key = vote("x", 0).key;
        set.apply(&RowWrite::Merge(Row::new(
            key.clone(),
            vec![Some("accept".into()), Some("0xplugin".into()), None],
            1,
        )));
        let before = set
            .apply(&RowWrite::Merge(Row::new(key.clone(), vec![None, None, Some("7".into())], 2)))
            .unwrap()
            .unwrap();
        assert_eq!(before.values[2], None);

        let row = set.get(&key).unwrap();
        assert_eq!(row.get("vote_option"), Some("accept"));
        assert_eq!(row.get("onchain_proposal_id"), Some("7"));
        assert_eq!(row.block_number, 2);
    }

    #[test]
    fn delete_missing_is_noop() {
        let mut set = RowSet::new();
        assert_eq!(set.apply(&RowWrite::Delete(vote("x", 0).key)), None);
    }

    #[test]
    fn restore_undoes_writes() {
        let mut set = RowSet::new();
        let key = vote("x", 0).key;
        let b1 = set.apply(&RowWrite::Upsert(vote("accept", 1))).unwrap();
        let b2 = set.apply(&RowWrite::Upsert(vote("reject", 2))).unwrap();
        set.restore(&key, b2);
        assert_eq!(set.get(&key).unwrap().get("vote_option"), Some("accept"));
        set.restore(&key, b1);
        assert!(set.get(&key).is_none());
    }
}
