//! State projector: validated events → keyed row writes for one block.
//!
//! Projection is split in two:
//! - [`StateProjector::project_block`] does the I/O (content resolution,
//!   optional reference checks) for a whole block up front.
//! - [`project_event`] is a pure mapping from one event to its writes.
//!
//! All writes are keyed upserts, merges, insert-if-absent, or deletes, so
//! applying the output twice leaves the same rows as applying it once.
//! Proposal rows are merged so each lifecycle event (created, processed,
//! executed) only fills the columns it knows about.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use futures::{StreamExt, TryStreamExt};

use crate::content::{ContentResolver, EditOp, Resolved, ValueType};
use crate::error::IndexerError;
use crate::event::DomainEvent;
use crate::ids;
use crate::model::{Row, RowKey, RowWrite, Table};
use crate::store::SinkStore;
use crate::types::BlockRef;

/// Proposal status once created on-chain, before it is processed.
pub const STATUS_PROPOSED: &str = "proposed";
/// Proposal status when its edit was applied.
pub const STATUS_ACCEPTED: &str = "accepted";
/// Proposal status after on-chain execution.
pub const STATUS_EXECUTED: &str = "executed";
/// Proposal status when its content is permanently undecodable.
pub const STATUS_CONTENT_UNAVAILABLE: &str = "content_unavailable";

pub struct StateProjector {
    network: String,
    resolver: Arc<ContentResolver>,
    store: Arc<dyn SinkStore>,
    content_concurrency: usize,
    strict_references: bool,
}

impl StateProjector {
    pub fn new(
        network: impl Into<String>,
        resolver: Arc<ContentResolver>,
        store: Arc<dyn SinkStore>,
    ) -> Self {
        Self {
            network: network.into(),
            resolver,
            store,
            content_concurrency: 8,
            strict_references: false,
        }
    }

    pub fn with_content_concurrency(mut self, n: usize) -> Self {
        self.content_concurrency = n.max(1);
        self
    }

    /// Require every event's space to exist before it is projected.
    pub fn with_strict_references(mut self, strict: bool) -> Self {
        self.strict_references = strict;
        self
    }

    pub fn network(&self) -> &str {
        &self.network
    }

    /// Compute all writes for `events` in `block`, in event order.
    pub async fn project_block(
        &self,
        block: &BlockRef,
        events: &[DomainEvent],
    ) -> Result<Vec<RowWrite>, IndexerError> {
        let content = self.resolve_content(events).await?;

        let mut known_spaces = HashSet::new();
        let mut writes = Vec::new();
        for event in events {
            if self.strict_references {
                self.check_space(block, event, &mut known_spaces).await?;
            }
            let resolved = event.content_uri().and_then(|uri| content.get(uri));
            writes.extend(project_event(&self.network, block.number, event, resolved));
        }
        Ok(writes)
    }

    /// Resolve every distinct content uri in the block, bounded in parallel.
    async fn resolve_content(
        &self,
        events: &[DomainEvent],
    ) -> Result<HashMap<String, Resolved>, IndexerError> {
        let uris: BTreeSet<&str> = events.iter().filter_map(|e| e.content_uri()).collect();
        if uris.is_empty() {
            return Ok(HashMap::new());
        }
        tracing::debug!(count = uris.len(), "Resolving block content");

        futures::stream::iter(uris)
            .map(|uri| async move {
                let resolved = self.resolver.resolve(uri).await?;
                Ok::<_, IndexerError>((uri.to_string(), resolved))
            })
            .buffer_unordered(self.content_concurrency)
            .try_collect()
            .await
    }

    async fn check_space(
        &self,
        block: &BlockRef,
        event: &DomainEvent,
        known: &mut HashSet<String>,
    ) -> Result<(), IndexerError> {
        let space = ids::space_id(&self.network, event.dao_address());
        if let DomainEvent::SpaceCreated { .. } = event {
            known.insert(space);
            return Ok(());
        }
        if known.contains(&space) {
            return Ok(());
        }
        let key = RowKey::new(Table::Spaces, vec![space.clone()]);
        if self.store.get_row(&key).await?.is_none() {
            return Err(IndexerError::MissingEntity {
                entity: "space",
                id: space,
                block_number: block.number,
            });
        }
        known.insert(space);
        Ok(())
    }
}

// ─── Pure projection ──────────────────────────────────────────────────────────

/// Map one event to its row writes. `content` is the resolved payload for
/// `ProposalProcessed`; a missing payload is treated as undecodable.
pub fn project_event(
    network: &str,
    block_number: u64,
    event: &DomainEvent,
    content: Option<&Resolved>,
) -> Vec<RowWrite> {
    let space = ids::space_id(network, event.dao_address());
    let row = |table: Table, key: Vec<String>, values: Vec<Option<String>>| {
        Row::new(RowKey::new(table, key), values, block_number)
    };

    match event {
        DomainEvent::SpaceCreated {
            dao_address,
            space_address,
        } => vec![RowWrite::Upsert(row(
            Table::Spaces,
            vec![space],
            vec![
                Some(network.to_string()),
                Some(dao_address.clone()),
                Some(space_address.clone()),
            ],
        ))],

        DomainEvent::ProfileRegistered {
            requestor,
            profile_id,
            ..
        } => vec![RowWrite::Upsert(row(
            Table::Profiles,
            vec![space, requestor.clone()],
            vec![Some(profile_id.clone())],
        ))],

        DomainEvent::EditorAdded(c) | DomainEvent::MemberAdded(c) => {
            let table = permission_table(event);
            vec![RowWrite::Upsert(row(
                table,
                vec![space, c.account.clone()],
                vec![Some(c.plugin_address.clone())],
            ))]
        }

        DomainEvent::EditorRemoved(c) | DomainEvent::MemberRemoved(c) => {
            let table = permission_table(event);
            vec![RowWrite::Delete(RowKey::new(table, vec![space, c.account.clone()]))]
        }

        DomainEvent::SubspaceAdded(c) => vec![RowWrite::Upsert(row(
            Table::Subspaces,
            vec![space, ids::space_id(network, &c.subspace)],
            vec![Some(c.plugin_address.clone())],
        ))],

        DomainEvent::SubspaceRemoved(c) => vec![RowWrite::Delete(RowKey::new(
            Table::Subspaces,
            vec![space, ids::space_id(network, &c.subspace)],
        ))],

        DomainEvent::MembershipRequested {
            dao_address,
            requestor,
        } => vec![RowWrite::InsertIfAbsent(row(
            Table::MembershipRequests,
            vec![space, requestor.clone()],
            vec![Some(dao_address.clone())],
        ))],

        DomainEvent::VoteCast {
            plugin_address,
            onchain_proposal_id,
            voter,
            option,
            ..
        } => vec![RowWrite::Upsert(row(
            Table::Votes,
            vec![ids::proposal_id(plugin_address, onchain_proposal_id), voter.clone()],
            vec![
                Some(option.as_str().to_string()),
                Some(plugin_address.clone()),
                Some(onchain_proposal_id.clone()),
            ],
        ))],

        DomainEvent::ProposalCreated {
            plugin_address,
            onchain_proposal_id,
            creator,
            start_time,
            end_time,
            content_uri,
            ..
        } => vec![RowWrite::Merge(row(
            Table::Proposals,
            vec![ids::proposal_id(plugin_address, onchain_proposal_id)],
            vec![
                Some(space),
                Some(plugin_address.clone()),
                Some(onchain_proposal_id.clone()),
                content_uri.clone(),
                None,
                None,
                Some(STATUS_PROPOSED.to_string()),
                None,
                Some(creator.clone()),
                Some(start_time.to_string()),
                Some(end_time.to_string()),
            ],
        ))],

        DomainEvent::ProposalExecuted {
            plugin_address,
            onchain_proposal_id,
            ..
        } => vec![RowWrite::Merge(row(
            Table::Proposals,
            vec![ids::proposal_id(plugin_address, onchain_proposal_id)],
            vec![
                Some(space),
                Some(plugin_address.clone()),
                Some(onchain_proposal_id.clone()),
                None,
                None,
                None,
                Some(STATUS_EXECUTED.to_string()),
                None,
                None,
                None,
                None,
            ],
        ))],

        DomainEvent::ProposalProcessed {
            plugin_address,
            onchain_proposal_id,
            content_uri,
            ..
        } => {
            let proposal = ids::proposal_id(plugin_address, onchain_proposal_id);
            let edit = content.and_then(Resolved::edit);

            let (edit_id, name, status, authors) = match edit {
                Some(e) => (
                    Some(e.id.clone()),
                    Some(e.name.clone()),
                    STATUS_ACCEPTED,
                    serde_json::to_string(&e.authors).ok(),
                ),
                None => (None, None, STATUS_CONTENT_UNAVAILABLE, None),
            };

            let mut writes = vec![RowWrite::Merge(row(
                Table::Proposals,
                vec![proposal.clone()],
                vec![
                    Some(space.clone()),
                    Some(plugin_address.clone()),
                    Some(onchain_proposal_id.clone()),
                    Some(content_uri.clone()),
                    edit_id,
                    name,
                    Some(status.to_string()),
                    authors,
                    None,
                    None,
                    None,
                ],
            ))];

            if let Some(e) = edit {
                for op in &e.ops {
                    writes.extend(project_op(&space, &proposal, block_number, op));
                }
            }
            writes
        }
    }
}

fn permission_table(event: &DomainEvent) -> Table {
    match event {
        DomainEvent::EditorAdded(_) | DomainEvent::EditorRemoved(_) => Table::Editors,
        _ => Table::Members,
    }
}

/// Writes for one edit op: the triple row, plus the relation row that an
/// entity-typed value implies.
fn project_op(space: &str, proposal: &str, block_number: u64, op: &EditOp) -> Vec<RowWrite> {
    match op {
        EditOp::SetTriple {
            entity_id,
            attribute_id,
            value,
        } => {
            let key = vec![space.to_string(), entity_id.clone(), attribute_id.clone()];
            let triple = RowWrite::Upsert(Row::new(
                RowKey::new(Table::Triples, key.clone()),
                vec![
                    Some(value.value_type.as_str().to_string()),
                    Some(value.value.clone()),
                    Some(proposal.to_string()),
                ],
                block_number,
            ));
            let relation_key = RowKey::new(Table::Relations, key);
            let relation = if value.value_type == ValueType::Entity {
                RowWrite::Upsert(Row::new(
                    relation_key,
                    vec![Some(value.value.clone()), Some(proposal.to_string())],
                    block_number,
                ))
            } else {
                RowWrite::Delete(relation_key)
            };
            vec![triple, relation]
        }
        EditOp::DeleteTriple {
            entity_id,
            attribute_id,
        } => {
            let key = vec![space.to_string(), entity_id.clone(), attribute_id.clone()];
            vec![
                RowWrite::Delete(RowKey::new(Table::Triples, key.clone())),
                RowWrite::Delete(RowKey::new(Table::Relations, key)),
            ]
        }
    }
}
