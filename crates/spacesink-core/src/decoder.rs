//! Block payload decoder.
//!
//! Turns a `SinkOutput` payload into validated [`DomainEvent`]s. Each entry
//! is decoded and validated on its own; failures are collected as
//! [`DecodeError`] values and reported, never raised.

use std::sync::Arc;

use prost::Message;

use crate::address;
use crate::content::is_supported_uri;
use crate::error::DecodeError;
use crate::event::{DomainEvent, EventKind, PermissionChange, SubspaceChange, VoteOption};
use crate::reporter::{NoopReporter, Reporter};
use crate::wire;

/// Result of decoding one block.
#[derive(Debug, Default)]
pub struct DecodedBlock {
    /// Valid events in application order.
    pub events: Vec<DomainEvent>,
    /// Entries that failed decoding or validation.
    pub invalid: Vec<DecodeError>,
}

pub struct EventDecoder {
    reporter: Arc<dyn Reporter>,
}

impl Default for EventDecoder {
    fn default() -> Self {
        Self::new(Arc::new(NoopReporter))
    }
}

impl EventDecoder {
    pub fn new(reporter: Arc<dyn Reporter>) -> Self {
        Self { reporter }
    }

    /// Decode a block payload.
    ///
    /// Event kinds are emitted in [`EventKind`] order; entries of the same kind
    /// keep their wire order.
    pub fn decode_block(&self, block_number: u64, payload: &[u8]) -> DecodedBlock {
        let mut out = DecodedBlock::default();

        if payload.is_empty() {
            return out;
        }

        let output = match wire::SinkOutput::decode(payload) {
            Ok(o) => o,
            Err(e) => {
                tracing::warn!(block = block_number, error = %e, "Undecodable block payload");
                return out;
            }
        };

        let lists: [(EventKind, &[Vec<u8>]); 13] = [
            (EventKind::SpaceCreated, output.spaces_created.as_slice()),
            (EventKind::ProfileRegistered, output.profiles_registered.as_slice()),
            (EventKind::EditorAdded, output.editors_added.as_slice()),
            (EventKind::EditorRemoved, output.editors_removed.as_slice()),
            (EventKind::MemberAdded, output.members_added.as_slice()),
            (EventKind::MemberRemoved, output.members_removed.as_slice()),
            (EventKind::SubspaceAdded, output.subspaces_added.as_slice()),
            (EventKind::SubspaceRemoved, output.subspaces_removed.as_slice()),
            (EventKind::MembershipRequested, output.membership_requests.as_slice()),
            (EventKind::ProposalCreated, output.proposals_created.as_slice()),
            (EventKind::ProposalProcessed, output.proposals_processed.as_slice()),
            (EventKind::VoteCast, output.votes_cast.as_slice()),
            (EventKind::ProposalExecuted, output.proposals_executed.as_slice()),
        ];

        for (kind, entries) in lists {
            for raw in entries {
                match decode_entry(kind, raw) {
                    Ok(event) => out.events.push(event),
                    Err(err) => {
                        self.reporter.invalid_event(block_number, &err);
                        out.invalid.push(err);
                    }
                }
            }
        }

        if !out.invalid.is_empty() {
            tracing::warn!(
                block = block_number,
                valid = out.events.len(),
                invalid = out.invalid.len(),
                "Block contained invalid events"
            );
        }
        out
    }
}

/// Decode and validate a single entry of the given kind.
pub fn decode_entry(kind: EventKind, raw: &[u8]) -> Result<DomainEvent, DecodeError> {
    match kind {
        EventKind::SpaceCreated => {
            let m: wire::SpaceCreated = decode_msg(kind, raw)?;
            Ok(DomainEvent::SpaceCreated {
                dao_address: require_address(kind, "dao_address", &m.dao_address)?,
                space_address: require_address(kind, "space_address", &m.space_address)?,
            })
        }
        EventKind::ProfileRegistered => {
            let m: wire::ProfileRegistered = decode_msg(kind, raw)?;
            Ok(DomainEvent::ProfileRegistered {
                dao_address: require_address(kind, "space", &m.space)?,
                requestor: require_address(kind, "requestor", &m.requestor)?,
                profile_id: require(kind, "id", &m.id)?,
            })
        }
        EventKind::EditorAdded
        | EventKind::EditorRemoved
        | EventKind::MemberAdded
        | EventKind::MemberRemoved => {
            let m: wire::PermissionChanged = decode_msg(kind, raw)?;
            let change = PermissionChange {
                dao_address: require_address(kind, "dao_address", &m.dao_address)?,
                plugin_address: require_address(kind, "plugin_address", &m.plugin_address)?,
                account: require_address(kind, "account", &m.account)?,
            };
            Ok(match kind {
                EventKind::EditorAdded => DomainEvent::EditorAdded(change),
                EventKind::EditorRemoved => DomainEvent::EditorRemoved(change),
                EventKind::MemberAdded => DomainEvent::MemberAdded(change),
                _ => DomainEvent::MemberRemoved(change),
            })
        }
        EventKind::SubspaceAdded | EventKind::SubspaceRemoved => {
            let m: wire::SubspaceChanged = decode_msg(kind, raw)?;
            let expected = if kind == EventKind::SubspaceAdded { "added" } else { "removed" };
            if m.change_type != expected {
                return Err(DecodeError::InvalidLiteral {
                    kind,
                    field: "change_type",
                    value: m.change_type,
                });
            }
            let change = SubspaceChange {
                dao_address: require_address(kind, "dao_address", &m.dao_address)?,
                plugin_address: require_address(kind, "plugin_address", &m.plugin_address)?,
                subspace: require_address(kind, "subspace", &m.subspace)?,
            };
            Ok(if kind == EventKind::SubspaceAdded {
                DomainEvent::SubspaceAdded(change)
            } else {
                DomainEvent::SubspaceRemoved(change)
            })
        }
        EventKind::MembershipRequested => {
            let m: wire::MembershipRequested = decode_msg(kind, raw)?;
            Ok(DomainEvent::MembershipRequested {
                dao_address: require_address(kind, "dao_address", &m.dao_address)?,
                requestor: require_address(kind, "requestor", &m.requestor)?,
            })
        }
        EventKind::ProposalCreated => {
            let m: wire::ProposalCreated = decode_msg(kind, raw)?;
            let start_time = require_timestamp(kind, "start_time", &m.start_time)?;
            let end_time = require_timestamp(kind, "end_time", &m.end_time)?;
            if end_time < start_time {
                return Err(DecodeError::InvalidLiteral {
                    kind,
                    field: "end_time",
                    value: m.end_time,
                });
            }
            let content_uri = match m.content_uri.trim() {
                "" => None,
                uri if is_supported_uri(uri) => Some(uri.to_string()),
                uri => {
                    return Err(DecodeError::InvalidLiteral {
                        kind,
                        field: "content_uri",
                        value: uri.to_string(),
                    })
                }
            };
            Ok(DomainEvent::ProposalCreated {
                dao_address: require_address(kind, "dao_address", &m.dao_address)?,
                plugin_address: require_address(kind, "plugin_address", &m.plugin_address)?,
                onchain_proposal_id: require_uint(kind, "onchain_proposal_id", &m.onchain_proposal_id)?,
                creator: require_address(kind, "creator", &m.creator)?,
                start_time,
                end_time,
                content_uri,
            })
        }
        EventKind::ProposalExecuted => {
            let m: wire::ProposalExecuted = decode_msg(kind, raw)?;
            Ok(DomainEvent::ProposalExecuted {
                dao_address: require_address(kind, "dao_address", &m.dao_address)?,
                plugin_address: require_address(kind, "plugin_address", &m.plugin_address)?,
                onchain_proposal_id: require_uint(kind, "onchain_proposal_id", &m.onchain_proposal_id)?,
            })
        }
        EventKind::ProposalProcessed => {
            let m: wire::ProposalProcessed = decode_msg(kind, raw)?;
            let content_uri = require(kind, "content_uri", &m.content_uri)?;
            if !is_supported_uri(&content_uri) {
                return Err(DecodeError::InvalidLiteral {
                    kind,
                    field: "content_uri",
                    value: content_uri,
                });
            }
            Ok(DomainEvent::ProposalProcessed {
                dao_address: require_address(kind, "dao_address", &m.dao_address)?,
                plugin_address: require_address(kind, "plugin_address", &m.plugin_address)?,
                onchain_proposal_id: require_uint(kind, "onchain_proposal_id", &m.onchain_proposal_id)?,
                content_uri,
            })
        }
        EventKind::VoteCast => {
            let m: wire::VoteCast = decode_msg(kind, raw)?;
            let option = VoteOption::from_wire(&m.vote_option).ok_or_else(|| {
                DecodeError::InvalidLiteral {
                    kind,
                    field: "vote_option",
                    value: m.vote_option.clone(),
                }
            })?;
            Ok(DomainEvent::VoteCast {
                dao_address: require_address(kind, "dao_address", &m.dao_address)?,
                plugin_address: require_address(kind, "plugin_address", &m.plugin_address)?,
                onchain_proposal_id: require_uint(kind, "onchain_proposal_id", &m.onchain_proposal_id)?,
                voter: require_address(kind, "voter", &m.voter)?,
                option,
            })
        }
    }
}

// ─── Field validation ─────────────────────────────────────────────────────────

fn decode_msg<M: Message + Default>(kind: EventKind, raw: &[u8]) -> Result<M, DecodeError> {
    M::decode(raw).map_err(|e| DecodeError::Malformed {
        kind,
        reason: e.to_string(),
    })
}

fn require(kind: EventKind, field: &'static str, value: &str) -> Result<String, DecodeError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(DecodeError::MissingField { kind, field });
    }
    Ok(trimmed.to_string())
}

fn require_address(kind: EventKind, field: &'static str, value: &str) -> Result<String, DecodeError> {
    let raw = require(kind, field, value)?;
    address::checksum(&raw).ok_or(DecodeError::InvalidAddress {
        kind,
        field,
        value: raw,
    })
}

/// Decimal uint256 literal, as emitted for on-chain proposal ids.
///
/// Leading zeros are stripped so `"007"` and `"7"` derive the same ids.
fn require_uint(kind: EventKind, field: &'static str, value: &str) -> Result<String, DecodeError> {
    let raw = require(kind, field, value)?;
    if !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(DecodeError::InvalidLiteral { kind, field, value: raw });
    }
    let digits = raw.trim_start_matches('0');
    if digits.len() > 78 {
        return Err(DecodeError::InvalidLiteral { kind, field, value: raw });
    }
    Ok(if digits.is_empty() { "0".to_string() } else { digits.to_string() })
}

/// Unix timestamp in seconds.
fn require_timestamp(kind: EventKind, field: &'static str, value: &str) -> Result<u64, DecodeError> {
    let raw = require(kind, field, value)?;
    raw.parse::<u64>()
        .map_err(|_| DecodeError::InvalidLiteral { kind, field, value: raw })
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAO: &str = "0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed";
    const PLUGIN: &str = "0xfb6916095ca1df60bb79ce92ce3ea74c37c5d359";
    const VOTER: &str = "0xdbf03b407c01e7cd3cbea99509d93f8dddc8c6fb";

    fn vote(option: &str) -> Vec<u8> {
        wire::VoteCast {
            dao_address: DAO.into(),
            plugin_address: PLUGIN.into(),
            onchain_proposal_id: "12".into(),
            voter: VOTER.into(),
            vote_option: option.into(),
        }
        .encode_to_vec()
    }

    fn editor() -> Vec<u8> {
        wire::PermissionChanged {
            dao_address: DAO.into(),
            plugin_address: PLUGIN.into(),
            account: VOTER.into(),
        }
        .encode_to_vec()
    }

    #[test]
    fn three_valid_one_malformed() {
        let output = wire::SinkOutput {
            editors_added: vec![editor()],
            votes_cast: vec![vote("2"), vec![0xff, 0xff, 0xff], vote("3")],
            ..Default::default()
        };
        let decoded = EventDecoder::default().decode_block(1, &output.encode_to_vec());
        assert_eq!(decoded.events.len(), 3);
        assert_eq!(decoded.invalid.len(), 1);
        assert!(matches!(decoded.invalid[0], DecodeError::Malformed { kind: EventKind::VoteCast, .. }));
    }

    #[test]
    fn events_are_ordered_by_kind_then_wire_order() {
        let output = wire::SinkOutput {
            votes_cast: vec![vote("2"), vote("3")],
            editors_added: vec![editor()],
            ..Default::default()
        };
        let decoded = EventDecoder::default().decode_block(1, &output.encode_to_vec());
        let kinds: Vec<_> = decoded.events.iter().map(|e| e.kind()).collect();
        assert_eq!(kinds, vec![EventKind::EditorAdded, EventKind::VoteCast, EventKind::VoteCast]);
        match &decoded.events[2] {
            DomainEvent::VoteCast { option, .. } => assert_eq!(*option, VoteOption::Reject),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn addresses_are_checksummed() {
        let ev = decode_entry(EventKind::EditorAdded, &editor()).unwrap();
        match ev {
            DomainEvent::EditorAdded(c) => {
                assert_eq!(c.dao_address, "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn invalid_vote_option_rejected() {
        let err = decode_entry(EventKind::VoteCast, &vote("1")).unwrap_err();
        assert!(matches!(err, DecodeError::InvalidLiteral { field: "vote_option", .. }));
    }

    #[test]
    fn missing_field_rejected() {
        let raw = wire::MembershipRequested {
            dao_address: DAO.into(),
            requestor: String::new(),
        }
        .encode_to_vec();
        let err = decode_entry(EventKind::MembershipRequested, &raw).unwrap_err();
        assert_eq!(
            err,
            DecodeError::MissingField { kind: EventKind::MembershipRequested, field: "requestor" }
        );
    }

    #[test]
    fn subspace_change_type_must_match_list() {
        let raw = wire::SubspaceChanged {
            dao_address: DAO.into(),
            plugin_address: PLUGIN.into(),
            subspace: VOTER.into(),
            change_type: "removed".into(),
        }
        .encode_to_vec();
        assert!(decode_entry(EventKind::SubspaceAdded, &raw).is_err());
        assert!(matches!(
            decode_entry(EventKind::SubspaceRemoved, &raw),
            Ok(DomainEvent::SubspaceRemoved(_))
        ));
    }

    #[test]
    fn proposal_requires_ipfs_or_inline_uri() {
        let mut msg = wire::ProposalProcessed {
            dao_address: DAO.into(),
            plugin_address: PLUGIN.into(),
            onchain_proposal_id: "1".into(),
            content_uri: "https://example.com/edit".into(),
        };
        assert!(decode_entry(EventKind::ProposalProcessed, &msg.encode_to_vec()).is_err());
        msg.content_uri = "data:text/plain;base64,aGk=".into();
        assert!(decode_entry(EventKind::ProposalProcessed, &msg.encode_to_vec()).is_err());
        msg.content_uri = "ipfs://bafkreia".into();
        assert!(decode_entry(EventKind::ProposalProcessed, &msg.encode_to_vec()).is_ok());
        msg.content_uri = "data:application/json;base64,eyJpZCI6ImUxIn0=".into();
        match decode_entry(EventKind::ProposalProcessed, &msg.encode_to_vec()) {
            Ok(DomainEvent::ProposalProcessed { content_uri, .. }) => {
                assert_eq!(content_uri, "data:application/json;base64,eyJpZCI6ImUxIn0=");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn proposal_ids_drop_leading_zeros() {
        let padded = wire::VoteCast {
            onchain_proposal_id: "0012".into(),
            ..wire::VoteCast::decode(vote("2").as_slice()).unwrap()
        };
        let a = decode_entry(EventKind::VoteCast, &padded.encode_to_vec()).unwrap();
        let b = decode_entry(EventKind::VoteCast, &vote("2")).unwrap();
        assert_eq!(a, b);

        let zero = wire::VoteCast { onchain_proposal_id: "000".into(), ..padded.clone() };
        match decode_entry(EventKind::VoteCast, &zero.encode_to_vec()).unwrap() {
            DomainEvent::VoteCast { onchain_proposal_id, .. } => assert_eq!(onchain_proposal_id, "0"),
            other => panic!("unexpected {other:?}"),
        }

        let long = wire::VoteCast { onchain_proposal_id: format!("{}1", "0".repeat(90)), ..padded };
        assert!(decode_entry(EventKind::VoteCast, &long.encode_to_vec()).is_ok());
    }

    fn created(start: &str, end: &str) -> wire::ProposalCreated {
        wire::ProposalCreated {
            dao_address: DAO.into(),
            plugin_address: PLUGIN.into(),
            onchain_proposal_id: "03".into(),
            creator: VOTER.into(),
            start_time: start.into(),
            end_time: end.into(),
            content_uri: String::new(),
        }
    }

    #[test]
    fn proposal_created_carries_voting_window() {
        let ev = decode_entry(EventKind::ProposalCreated, &created("100", "200").encode_to_vec()).unwrap();
        match ev {
            DomainEvent::ProposalCreated {
                onchain_proposal_id,
                creator,
                start_time,
                end_time,
                content_uri,
                ..
            } => {
                assert_eq!(onchain_proposal_id, "3");
                assert_eq!(creator, "0xdbF03B407c01E7cD3CBea99509d93f8DDDC8C6FB");
                assert_eq!((start_time, end_time), (100, 200));
                assert_eq!(content_uri, None);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn proposal_created_rejects_bad_window_and_uri() {
        let backwards = created("200", "100").encode_to_vec();
        assert!(matches!(
            decode_entry(EventKind::ProposalCreated, &backwards),
            Err(DecodeError::InvalidLiteral { field: "end_time", .. })
        ));
        let not_a_time = created("soon", "100").encode_to_vec();
        assert!(matches!(
            decode_entry(EventKind::ProposalCreated, &not_a_time),
            Err(DecodeError::InvalidLiteral { field: "start_time", .. })
        ));
        let mut msg = created("1", "2");
        msg.content_uri = "https://example.com".into();
        assert!(decode_entry(EventKind::ProposalCreated, &msg.encode_to_vec()).is_err());
        msg.content_uri = "ipfs://bafyproposal".into();
        assert!(decode_entry(EventKind::ProposalCreated, &msg.encode_to_vec()).is_ok());
    }

    #[test]
    fn lifecycle_events_decode_in_apply_order() {
        let executed = wire::ProposalExecuted {
            dao_address: DAO.into(),
            plugin_address: PLUGIN.into(),
            onchain_proposal_id: "3".into(),
        };
        let output = wire::SinkOutput {
            proposals_executed: vec![executed.encode_to_vec()],
            votes_cast: vec![vote("2")],
            proposals_created: vec![created("1", "2").encode_to_vec()],
            ..Default::default()
        };
        let decoded = EventDecoder::default().decode_block(1, &output.encode_to_vec());
        let kinds: Vec<_> = decoded.events.iter().map(|e| e.kind()).collect();
        assert_eq!(
            kinds,
            vec![EventKind::ProposalCreated, EventKind::VoteCast, EventKind::ProposalExecuted]
        );
    }

    #[test]
    fn garbage_payload_yields_nothing() {
        let decoded = EventDecoder::default().decode_block(9, &[0xff, 0x01]);
        assert!(decoded.events.is_empty());
    }

    #[test]
    fn empty_payload_yields_nothing() {
        let decoded = EventDecoder::default().decode_block(9, &[]);
        assert!(decoded.events.is_empty());
        assert!(decoded.invalid.is_empty());
    }
}
