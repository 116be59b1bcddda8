//! Row (de)serialization for `facts`: embedding blob encoding and the `rusqlite::Row` →
//! [`Fact`] conversion, grounded on the teacher's row-conversion-helper pattern.

use rusqlite::Row;

use crate::models::{Category, Fact, FactId};
use crate::{Error, Result};

/// Encodes a vector of `f32` as a little-endian IEEE-754 blob, per the persisted-schema
/// contract: `embedding` length is always `4 * D`.
pub(crate) fn encode_embedding(embedding: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(embedding.len() * 4);
    for value in embedding {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Decodes a little-endian IEEE-754 blob back into a vector of `f32`.
///
/// Returns [`Error::InvalidInput`] if the blob length is not a multiple of 4 (a corrupt or
/// foreign blob), rather than panicking on a misaligned chunk.
pub(crate) fn decode_embedding(bytes: &[u8]) -> Result<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(Error::InvalidInput(format!(
            "embedding blob length {} is not a multiple of 4",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| {
            let mut arr = [0u8; 4];
            arr.copy_from_slice(chunk);
            f32::from_le_bytes(arr)
        })
        .collect())
}

/// Encodes `source_turn_ids` as JSON for storage in a `TEXT` column.
pub(crate) fn encode_source_turn_ids(ids: &[String]) -> String {
    serde_json::to_string(ids).unwrap_or_else(|_| "[]".to_string())
}

fn decode_source_turn_ids(text: &str) -> Vec<String> {
    serde_json::from_str(text).unwrap_or_default()
}

/// Builds a [`Fact`] from a `facts` row. Column order matches `SELECT` statements in
/// `fact_store.rs`: `id, text, category, importance, embedding, created_at, last_accessed,
/// access_count, is_obsolete, superseded_by, source_turn_ids`.
pub(crate) fn build_fact_from_row(row: &Row<'_>) -> rusqlite::Result<Fact> {
    let id: i64 = row.get(0)?;
    let text: String = row.get(1)?;
    let category_str: String = row.get(2)?;
    let importance: f32 = row.get(3)?;
    let embedding_blob: Option<Vec<u8>> = row.get(4)?;
    let created_at: i64 = row.get(5)?;
    let last_accessed: i64 = row.get(6)?;
    let access_count: i64 = row.get(7)?;
    let is_obsolete: bool = row.get(8)?;
    let superseded_by: Option<i64> = row.get(9)?;
    let source_turn_ids_str: String = row.get(10)?;

    let embedding = match embedding_blob {
        Some(bytes) => decode_embedding(&bytes).ok(),
        None => None,
    };

    Ok(Fact {
        id: FactId(id),
        text,
        category: Category::parse(&category_str),
        importance,
        embedding,
        created_at: created_at.max(0) as u64,
        last_accessed: last_accessed.max(0) as u64,
        access_count: access_count.max(0) as u64,
        is_obsolete,
        superseded_by: superseded_by.map(FactId),
        source_turn_ids: decode_source_turn_ids(&source_turn_ids_str),
    })
}

/// Columns selected by every `facts` read query, in the order [`build_fact_from_row`] expects.
pub(crate) const FACT_COLUMNS: &str = "id, text, category, importance, embedding, created_at, \
     last_accessed, access_count, is_obsolete, superseded_by, source_turn_ids";

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn embedding_round_trips() {
        let original = vec![0.1_f32, -0.5, 2.25, 0.0];
        let encoded = encode_embedding(&original);
        assert_eq!(encoded.len(), original.len() * 4);
        let decoded = decode_embedding(&encoded).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn decode_rejects_misaligned_blob() {
        let bytes = vec![0u8, 1, 2];
        assert!(decode_embedding(&bytes).is_err());
    }

    #[test]
    fn empty_embedding_round_trips_to_empty() {
        let encoded = encode_embedding(&[]);
        assert!(encoded.is_empty());
        assert_eq!(decode_embedding(&encoded).unwrap(), Vec::<f32>::new());
    }

    #[test]
    fn source_turn_ids_round_trip() {
        let ids = vec!["t1".to_string(), "t2".to_string()];
        let encoded = encode_source_turn_ids(&ids);
        assert_eq!(decode_source_turn_ids(&encoded), ids);
    }

    #[test]
    fn malformed_source_turn_ids_default_to_empty() {
        assert_eq!(decode_source_turn_ids("not json"), Vec::<String>::new());
    }
}
