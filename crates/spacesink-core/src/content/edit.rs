//! Decoding of off-chain edit payloads.

use prost::Message;
use serde::{Deserialize, Serialize};

use crate::error::ContentError;
use crate::wire;

/// Value type of a triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValueType {
    Text,
    Number,
    Entity,
    Collection,
    Checkbox,
    Url,
    Time,
    GeoLocation,
}

impl ValueType {
    fn from_wire(raw: i32) -> Option<Self> {
        match wire::ValueType::try_from(raw).ok()? {
            wire::ValueType::Unknown => None,
            wire::ValueType::Text => Some(Self::Text),
            wire::ValueType::Number => Some(Self::Number),
            wire::ValueType::Entity => Some(Self::Entity),
            wire::ValueType::Collection => Some(Self::Collection),
            wire::ValueType::Checkbox => Some(Self::Checkbox),
            wire::ValueType::Url => Some(Self::Url),
            wire::ValueType::Time => Some(Self::Time),
            wire::ValueType::GeoLocation => Some(Self::GeoLocation),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "TEXT",
            Self::Number => "NUMBER",
            Self::Entity => "ENTITY",
            Self::Collection => "COLLECTION",
            Self::Checkbox => "CHECKBOX",
            Self::Url => "URL",
            Self::Time => "TIME",
            Self::GeoLocation => "GEO_LOCATION",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TripleValue {
    #[serde(rename = "type")]
    pub value_type: ValueType,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "opType", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EditOp {
    #[serde(rename_all = "camelCase")]
    SetTriple {
        entity_id: String,
        attribute_id: String,
        value: TripleValue,
    },
    #[serde(rename_all = "camelCase")]
    DeleteTriple {
        entity_id: String,
        attribute_id: String,
    },
}

/// A validated edit, as stored in the content cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedEdit {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub ops: Vec<EditOp>,
    pub authors: Vec<String>,
}

/// Decode raw edit bytes. Individually invalid ops are dropped; a payload that
/// is not an `Edit` at all, or has no id, is an error.
pub fn decode_edit(bytes: &[u8]) -> Result<DecodedEdit, ContentError> {
    let edit = wire::Edit::decode(bytes).map_err(|e| ContentError::Undecodable(e.to_string()))?;
    if edit.id.trim().is_empty() {
        return Err(ContentError::MissingEditId);
    }

    let total = edit.ops.len();
    let ops: Vec<EditOp> = edit.ops.into_iter().filter_map(validate_op).collect();
    if ops.len() < total {
        tracing::warn!(
            edit = %edit.id,
            dropped = total - ops.len(),
            kept = ops.len(),
            "Dropped invalid edit ops"
        );
    }

    Ok(DecodedEdit {
        id: edit.id,
        name: edit.name,
        version: edit.version.filter(|v| !v.is_empty()),
        ops,
        authors: edit.authors.into_iter().filter(|a| !a.is_empty()).collect(),
    })
}

/// Edit document carried inline as JSON.
#[derive(Deserialize)]
struct JsonEdit {
    #[serde(default)]
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    ops: Vec<serde_json::Value>,
    #[serde(default)]
    authors: Vec<String>,
}

/// Decode an edit carried as JSON, in the same shape the cache stores.
/// Ops that do not parse, or name no entity or attribute, are dropped.
pub fn decode_edit_json(bytes: &[u8]) -> Result<DecodedEdit, ContentError> {
    let edit: JsonEdit =
        serde_json::from_slice(bytes).map_err(|e| ContentError::Undecodable(e.to_string()))?;
    if edit.id.trim().is_empty() {
        return Err(ContentError::MissingEditId);
    }

    let total = edit.ops.len();
    let ops: Vec<EditOp> = edit
        .ops
        .into_iter()
        .filter_map(|op| serde_json::from_value::<EditOp>(op).ok())
        .filter(|op| {
            let (entity, attribute) = match op {
                EditOp::SetTriple { entity_id, attribute_id, .. }
                | EditOp::DeleteTriple { entity_id, attribute_id } => (entity_id, attribute_id),
            };
            !entity.is_empty() && !attribute.is_empty()
        })
        .collect();
    if ops.len() < total {
        tracing::warn!(
            edit = %edit.id,
            dropped = total - ops.len(),
            kept = ops.len(),
            "Dropped invalid edit ops"
        );
    }

    Ok(DecodedEdit {
        id: edit.id,
        name: edit.name,
        version: edit.version.filter(|v| !v.is_empty()),
        ops,
        authors: edit.authors.into_iter().filter(|a| !a.is_empty()).collect(),
    })
}

fn validate_op(op: wire::Op) -> Option<EditOp> {
    let triple = op.triple?;
    if triple.entity.is_empty() || triple.attribute.is_empty() {
        return None;
    }
    match wire::OpType::try_from(op.op_type).ok()? {
        wire::OpType::SetTriple => {
            let value = triple.value?;
            Some(EditOp::SetTriple {
                entity_id: triple.entity,
                attribute_id: triple.attribute,
                value: TripleValue {
                    value_type: ValueType::from_wire(value.value_type)?,
                    value: value.value,
                },
            })
        }
        wire::OpType::DeleteTriple => Some(EditOp::DeleteTriple {
            entity_id: triple.entity,
            attribute_id: triple.attribute,
        }),
        wire::OpType::None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(entity: &str, attr: &str, vt: wire::ValueType, value: &str) -> wire::Op {
        wire::Op {
            op_type: wire::OpType::SetTriple as i32,
            triple: Some(wire::Triple {
                entity: entity.into(),
                attribute: attr.into(),
                value: Some(wire::Value {
                    value_type: vt as i32,
                    value: value.into(),
                }),
            }),
        }
    }

    #[test]
    fn decodes_valid_edit() {
        let edit = wire::Edit {
            id: "edit-1".into(),
            name: "Add names".into(),
            ops: vec![
                set("e1", "name", wire::ValueType::Text, "Alice"),
                wire::Op {
                    op_type: wire::OpType::DeleteTriple as i32,
                    triple: Some(wire::Triple {
                        entity: "e2".into(),
                        attribute: "name".into(),
                        value: None,
                    }),
                },
            ],
            authors: vec!["0xabc".into()],
            version: None,
        };
        let decoded = decode_edit(&edit.encode_to_vec()).unwrap();
        assert_eq!(decoded.id, "edit-1");
        assert_eq!(decoded.ops.len(), 2);
        assert!(matches!(decoded.ops[1], EditOp::DeleteTriple { .. }));
    }

    #[test]
    fn invalid_ops_are_filtered() {
        let edit = wire::Edit {
            id: "edit-2".into(),
            ops: vec![
                set("e1", "name", wire::ValueType::Text, "ok"),
                set("", "name", wire::ValueType::Text, "no entity"),
                set("e1", "age", wire::ValueType::Unknown, "no type"),
                wire::Op { op_type: wire::OpType::SetTriple as i32, triple: None },
                wire::Op { op_type: 99, triple: None },
            ],
            ..Default::default()
        };
        let decoded = decode_edit(&edit.encode_to_vec()).unwrap();
        assert_eq!(decoded.ops.len(), 1);
    }

    #[test]
    fn missing_id_is_error() {
        let edit = wire::Edit::default();
        assert_eq!(decode_edit(&edit.encode_to_vec()), Err(ContentError::MissingEditId));
    }

    #[test]
    fn garbage_is_undecodable() {
        assert!(matches!(decode_edit(b"\xff\xff\xff"), Err(ContentError::Undecodable(_))));
    }

    #[test]
    fn inline_json_edit_defaults_missing_fields() {
        let decoded = decode_edit_json(br#"{"id":"e1"}"#).unwrap();
        assert_eq!(decoded.id, "e1");
        assert!(decoded.name.is_empty());
        assert!(decoded.ops.is_empty());
    }

    #[test]
    fn inline_json_edit_drops_bad_ops() {
        let raw = br#"{
            "id": "e2",
            "name": "inline",
            "ops": [
                {"opType": "SET_TRIPLE", "entityId": "a", "attributeId": "name",
                 "value": {"type": "TEXT", "value": "Alice"}},
                {"opType": "DELETE_TRIPLE", "entityId": "", "attributeId": "name"},
                {"opType": "MOVE_TRIPLE"}
            ]
        }"#;
        let decoded = decode_edit_json(raw).unwrap();
        assert_eq!(decoded.ops.len(), 1);
        assert_eq!(decode_edit_json(br#"{"name":"x"}"#), Err(ContentError::MissingEditId));
        assert!(matches!(decode_edit_json(b"not json"), Err(ContentError::Undecodable(_))));
    }

    #[test]
    fn json_shape_is_stable() {
        let decoded = DecodedEdit {
            id: "e".into(),
            name: "n".into(),
            version: None,
            ops: vec![EditOp::SetTriple {
                entity_id: "a".into(),
                attribute_id: "b".into(),
                value: TripleValue { value_type: ValueType::GeoLocation, value: "1,2".into() },
            }],
            authors: vec![],
        };
        let json = serde_json::to_value(&decoded).unwrap();
        assert_eq!(json["ops"][0]["opType"], "SET_TRIPLE");
        assert_eq!(json["ops"][0]["entityId"], "a");
        assert_eq!(json["ops"][0]["value"]["type"], "GEO_LOCATION");
        let back: DecodedEdit = serde_json::from_value(json).unwrap();
        assert_eq!(back, decoded);
    }
}
