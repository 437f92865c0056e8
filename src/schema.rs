//! Tabular trie exchange format.
//!
//! Each row describes one trie node. Ids are contiguous from 0 and equal
//! the row position; every ancestor precedes its descendants, and roots
//! name themselves as ancestor. The `dstream_*` fields locate the packed
//! stratum bits of the node's source annotation.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{HstratError, Result};

pub const REQUIRED_TRIE_FIELDS: [&str; 9] = [
    "id",
    "ancestor_id",
    "dstream_algo",
    "dstream_storage_bitoffset",
    "dstream_storage_bitwidth",
    "dstream_T_bitoffset",
    "dstream_T_bitwidth",
    "dstream_S",
    "hstrat_rank",
];

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrieRow {
    pub id: u64,
    pub ancestor_id: u64,
    pub dstream_algo: String,
    pub dstream_storage_bitoffset: u64,
    pub dstream_storage_bitwidth: u64,
    #[serde(rename = "dstream_T_bitoffset")]
    pub dstream_t_bitoffset: u64,
    #[serde(rename = "dstream_T_bitwidth")]
    pub dstream_t_bitwidth: u64,
    #[serde(rename = "dstream_S")]
    pub dstream_s: u64,
    pub hstrat_rank: u64,
}

impl TrieRow {
    pub fn is_root(&self) -> bool {
        self.id == self.ancestor_id
    }
}

fn get_u64(row: usize, object: &serde_json::Map<String, Value>, field: &'static str) -> Result<u64> {
    let value = object
        .get(field)
        .ok_or(HstratError::MissingSchemaField { row, field })?;
    value.as_u64().ok_or_else(|| HstratError::InvalidSchemaField {
        row,
        field,
        reason: format!("must be a non-negative integer, got {value}"),
    })
}

/// Check every structural rule on `rows`, stopping at the first violation.
pub fn validate_trie_records(rows: &[Value]) -> Result<()> {
    for (row, record) in rows.iter().enumerate() {
        let object = record.as_object().ok_or_else(|| HstratError::InvalidSchemaField {
            row,
            field: "id",
            reason: "row is not an object".to_string(),
        })?;
        if let Some(&field) = REQUIRED_TRIE_FIELDS
            .iter()
            .find(|field| !object.contains_key(**field))
        {
            return Err(HstratError::MissingSchemaField { row, field });
        }

        let id = get_u64(row, object, "id")?;
        if id != row as u64 {
            return Err(HstratError::NonContiguousTrieIds { row, id });
        }
        let ancestor_id = get_u64(row, object, "ancestor_id")?;
        if ancestor_id > id {
            return Err(HstratError::UnsortedTrieRows {
                row,
                id,
                ancestor_id,
            });
        }

        if !object["dstream_algo"].is_string() {
            return Err(HstratError::InvalidSchemaField {
                row,
                field: "dstream_algo",
                reason: "must be a string".to_string(),
            });
        }
        for &field in &REQUIRED_TRIE_FIELDS[3..] {
            get_u64(row, object, field)?;
        }
    }
    Ok(())
}

/// Validate, then deserialize rows into [`TrieRow`]s.
pub fn parse_trie_records(rows: &[Value]) -> Result<Vec<TrieRow>> {
    validate_trie_records(rows)?;
    rows.iter()
        .map(|row| TrieRow::deserialize(row).map_err(HstratError::from))
        .collect()
}
