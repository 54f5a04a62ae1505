//! Blob encoding for stored records.
//!
//! Every record is one pretty-printed JSON blob. Bookkeeping fields use an
//! underscore prefix so they never collide with entity fields:
//!
//! ```text
//! {
//!   "_pk": "01hx5...",
//!   "_version": 3,
//!   "_created_at": "2024-05-01T10:00:00+00:00",
//!   "_updated_at": "2024-05-02T08:30:00+00:00",
//!   "label": "About",
//!   "order_index": 2
//! }
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::types::{BlobId, RecordId};

/// A stored record: entity fields plus the metadata the store maintains.
///
/// `version`, `created_at` and `updated_at` belong to the store. Callers
/// only ever hand in `fields`; `Row::new` and `Row::with_fields` stamp the
/// rest.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    /// primary key, matches the blob's file name without `.json`
    pub id: RecordId,
    /// bumped on every update
    pub version: u64,
    /// RFC 3339 creation timestamp
    pub created_at: String,
    /// RFC 3339 timestamp of the last update
    pub updated_at: String,
    pub fields: BTreeMap<String, Value>,
}

impl Row {
    /// A fresh row at version 1, stamped with the current time.
    pub fn new(id: RecordId, fields: BTreeMap<String, Value>) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            id,
            version: 1,
            created_at: now.clone(),
            updated_at: now,
            fields,
        }
    }

    /// Build a row from a JSON object.
    pub fn from_value(id: RecordId, value: Value) -> StorageResult<Self> {
        match value {
            Value::Object(map) => Ok(Self::new(id, map.into_iter().collect())),
            _ => Err(StorageError::SchemaViolation(
                "record fields must be a JSON object".to_string(),
            )),
        }
    }

    /// Replace the fields, keeping identity and creation time.
    pub fn with_fields(self, fields: BTreeMap<String, Value>) -> Self {
        Self {
            id: self.id,
            version: self.version + 1,
            created_at: self.created_at,
            updated_at: chrono::Utc::now().to_rfc3339(),
            fields,
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// The fields as one JSON object, ready for typed deserialization.
    pub fn fields_value(&self) -> Value {
        Value::Object(self.fields.clone().into_iter().collect())
    }
}

#[derive(Serialize, Deserialize)]
struct RowJson {
    #[serde(rename = "_pk")]
    pk: String,
    #[serde(rename = "_version")]
    version: u64,
    #[serde(rename = "_created_at")]
    created_at: String,
    #[serde(rename = "_updated_at")]
    updated_at: String,
    #[serde(flatten)]
    fields: BTreeMap<String, Value>,
}

/// serialize a row to JSON bytes
///
/// BTreeMap keeps key order stable, so identical records hash to identical blobs.
pub fn serialize_row(row: &Row) -> StorageResult<Vec<u8>> {
    let json = RowJson {
        pk: row.id.as_str().to_string(),
        version: row.version,
        created_at: row.created_at.clone(),
        updated_at: row.updated_at.clone(),
        fields: row.fields.clone(),
    };

    Ok(serde_json::to_vec_pretty(&json)?)
}

/// deserialize a row from JSON bytes
///
/// the primary key inside the blob must match the file it was read from
pub fn deserialize_row(bytes: &[u8], expected_id: &RecordId) -> StorageResult<Row> {
    let json: RowJson = serde_json::from_slice(bytes)?;

    if json.pk != expected_id.as_str() {
        return Err(StorageError::CorruptedData {
            path: format!("{}.json", expected_id).into(),
            reason: format!(
                "primary key mismatch: file name suggests '{}' but content has '{}'",
                expected_id, json.pk
            ),
        });
    }

    Ok(Row {
        id: expected_id.clone(),
        version: json.version,
        created_at: json.created_at,
        updated_at: json.updated_at,
        fields: json.fields,
    })
}

/// write a row as a blob, returning its id
pub fn write_blob(repo: &git2::Repository, row: &Row) -> StorageResult<BlobId> {
    let bytes = serialize_row(row)?;
    let oid = repo.blob(&bytes)?;
    Ok(BlobId::new(oid))
}

pub fn read_blob(repo: &git2::Repository, blob_id: BlobId) -> StorageResult<Vec<u8>> {
    let blob = repo.find_blob(blob_id.raw())?;
    Ok(blob.content().to_vec())
}
