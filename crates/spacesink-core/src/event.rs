//! Validated domain events.
//!
//! All addresses carried by an event are already EIP-55 checksummed.

use serde::{Deserialize, Serialize};

/// Discriminant of a [`DomainEvent`], used for diagnostics and ordering.
///
/// Variants are declared in the order kinds are applied within a block:
/// spaces first, then everything that references a space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    SpaceCreated,
    ProfileRegistered,
    EditorAdded,
    EditorRemoved,
    MemberAdded,
    MemberRemoved,
    SubspaceAdded,
    SubspaceRemoved,
    MembershipRequested,
    ProposalCreated,
    ProposalProcessed,
    VoteCast,
    ProposalExecuted,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SpaceCreated => "space_created",
            Self::ProfileRegistered => "profile_registered",
            Self::EditorAdded => "editor_added",
            Self::EditorRemoved => "editor_removed",
            Self::MemberAdded => "member_added",
            Self::MemberRemoved => "member_removed",
            Self::SubspaceAdded => "subspace_added",
            Self::SubspaceRemoved => "subspace_removed",
            Self::MembershipRequested => "membership_requested",
            Self::ProposalCreated => "proposal_created",
            Self::ProposalProcessed => "proposal_processed",
            Self::VoteCast => "vote_cast",
            Self::ProposalExecuted => "proposal_executed",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Vote option ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteOption {
    Accept,
    Reject,
}

impl VoteOption {
    /// Parse the on-chain option literal (`"2"` accept, `"3"` reject).
    pub fn from_wire(raw: &str) -> Option<Self> {
        match raw {
            "2" => Some(Self::Accept),
            "3" => Some(Self::Reject),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accept => "accept",
            Self::Reject => "reject",
        }
    }
}

// ─── Events ───────────────────────────────────────────────────────────────────

/// Editor or member set change within a space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionChange {
    pub dao_address: String,
    pub plugin_address: String,
    pub account: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubspaceChange {
    pub dao_address: String,
    pub plugin_address: String,
    /// DAO address of the child space.
    pub subspace: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainEvent {
    SpaceCreated {
        dao_address: String,
        space_address: String,
    },
    ProfileRegistered {
        dao_address: String,
        requestor: String,
        profile_id: String,
    },
    EditorAdded(PermissionChange),
    EditorRemoved(PermissionChange),
    MemberAdded(PermissionChange),
    MemberRemoved(PermissionChange),
    SubspaceAdded(SubspaceChange),
    SubspaceRemoved(SubspaceChange),
    MembershipRequested {
        dao_address: String,
        requestor: String,
    },
    ProposalCreated {
        dao_address: String,
        plugin_address: String,
        onchain_proposal_id: String,
        creator: String,
        start_time: u64,
        end_time: u64,
        /// Proposed content, stored as given and not resolved.
        content_uri: Option<String>,
    },
    ProposalProcessed {
        dao_address: String,
        plugin_address: String,
        onchain_proposal_id: String,
        content_uri: String,
    },
    ProposalExecuted {
        dao_address: String,
        plugin_address: String,
        onchain_proposal_id: String,
    },
    VoteCast {
        dao_address: String,
        plugin_address: String,
        onchain_proposal_id: String,
        voter: String,
        option: VoteOption,
    },
}

impl DomainEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::SpaceCreated { .. } => EventKind::SpaceCreated,
            Self::ProfileRegistered { .. } => EventKind::ProfileRegistered,
            Self::EditorAdded(_) => EventKind::EditorAdded,
            Self::EditorRemoved(_) => EventKind::EditorRemoved,
            Self::MemberAdded(_) => EventKind::MemberAdded,
            Self::MemberRemoved(_) => EventKind::MemberRemoved,
            Self::SubspaceAdded(_) => EventKind::SubspaceAdded,
            Self::SubspaceRemoved(_) => EventKind::SubspaceRemoved,
            Self::MembershipRequested { .. } => EventKind::MembershipRequested,
            Self::ProposalCreated { .. } => EventKind::ProposalCreated,
            Self::ProposalProcessed { .. } => EventKind::ProposalProcessed,
            Self::VoteCast { .. } => EventKind::VoteCast,
            Self::ProposalExecuted { .. } => EventKind::ProposalExecuted,
        }
    }

    /// DAO address of the space the event belongs to.
    pub fn dao_address(&self) -> &str {
        match self {
            Self::SpaceCreated { dao_address, .. }
            | Self::ProfileRegistered { dao_address, .. }
            | Self::MembershipRequested { dao_address, .. }
            | Self::ProposalCreated { dao_address, .. }
            | Self::ProposalProcessed { dao_address, .. }
            | Self::ProposalExecuted { dao_address, .. }
            | Self::VoteCast { dao_address, .. } => dao_address,
            Self::EditorAdded(c) | Self::EditorRemoved(c) | Self::MemberAdded(c) | Self::MemberRemoved(c) => {
                &c.dao_address
            }
            Self::SubspaceAdded(c) | Self::SubspaceRemoved(c) => &c.dao_address,
        }
    }

    /// Content uri to resolve before projection, if any.
    pub fn content_uri(&self) -> Option<&str> {
        match self {
            Self::ProposalProcessed { content_uri, .. } => Some(content_uri),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vote_option_literals() {
        assert_eq!(VoteOption::from_wire("2"), Some(VoteOption::Accept));
        assert_eq!(VoteOption::from_wire("3"), Some(VoteOption::Reject));
        assert_eq!(VoteOption::from_wire("1"), None);
        assert_eq!(VoteOption::from_wire("accept"), None);
    }

    #[test]
    fn kinds_order_spaces_first() {
        assert!(EventKind::SpaceCreated < EventKind::EditorAdded);
        assert!(EventKind::ProposalCreated < EventKind::ProposalProcessed);
        assert!(EventKind::ProposalProcessed < EventKind::VoteCast);
        assert!(EventKind::VoteCast < EventKind::ProposalExecuted);
    }
}
