//! Text encodings for journal and cache columns shared by the SQL backends.

use spacesink_core::error::IndexerError;
use spacesink_core::model::{RowImage, RowKey, Table};

fn storage_err(context: &str, e: impl std::fmt::Display) -> IndexerError {
    IndexerError::Storage(format!("{context}: {e}"))
}

pub fn encode_key(key: &RowKey) -> Result<String, IndexerError> {
    serde_json::to_string(&key.parts).map_err(|e| storage_err("encode journal key", e))
}

pub fn decode_key(table_name: &str, key_json: &str) -> Result<RowKey, IndexerError> {
    let table = Table::from_name(table_name)
        .ok_or_else(|| IndexerError::Storage(format!("journal references unknown table {table_name}")))?;
    let parts: Vec<String> =
        serde_json::from_str(key_json).map_err(|e| storage_err("decode journal key", e))?;
    if parts.len() != table.key_columns().len() {
        return Err(IndexerError::Storage(format!(
            "journal key for {table_name} has {} parts, expected {}",
            parts.len(),
            table.key_columns().len()
        )));
    }
    Ok(RowKey { table, parts })
}

pub fn encode_image(image: Option<&RowImage>) -> Result<Option<String>, IndexerError> {
    image
        .map(|i| serde_json::to_string(i).map_err(|e| storage_err("encode journal image", e)))
        .transpose()
}

pub fn decode_image(json: Option<&str>) -> Result<Option<RowImage>, IndexerError> {
    json.map(|j| serde_json::from_str(j).map_err(|e| storage_err("decode journal image", e)))
        .transpose()
}

pub fn encode_content(json: Option<&serde_json::Value>) -> Option<String> {
    json.map(|v| v.to_string())
}

pub fn decode_content(text: Option<&str>) -> Result<Option<serde_json::Value>, IndexerError> {
    text.map(|t| serde_json::from_str(t).map_err(|e| storage_err("decode cached content", e)))
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_round_trip_checks_arity() {
        let key = RowKey::new(Table::Votes, vec!["p".into(), "0xv".into()]);
        let json = encode_key(&key).unwrap();
        assert_eq!(decode_key("proposal_votes", &json).unwrap(), key);
        assert!(decode_key("spaces", &json).is_err());
        assert!(decode_key("nope", &json).is_err());
    }

    #[test]
    fn absent_image_stays_null() {
        assert_eq!(encode_image(None).unwrap(), None);
        assert_eq!(decode_image(None).unwrap(), None);
    }
}
