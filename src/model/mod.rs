//! Entities stored by the content backend.
//!
//! Each entity maps to one [`Row`] in its [`Collection`]. The row carries the
//! store-maintained metadata (version and timestamps); entity fields go
//! through serde.

mod content;
mod navigation;

pub use content::{ContentBlock, ContentBlockPatch, NewContentBlock};
pub use navigation::{NavigationItem, NavigationNode, NavigationPatch, NewNavigationItem, MAX_LABEL_LEN};

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::gateway::RecordReader;
use crate::ordering::{EngineError, EngineResult};
use crate::storage::{Collection, RecordId, RecordPath, Row, StorageError, StorageResult};

/// An entity persisted as a row.
pub trait Record: Sized {
    const COLLECTION: Collection;

    fn id(&self) -> &RecordId;

    fn from_row(row: &Row) -> StorageResult<Self>;

    /// Entity fields as stored, without row metadata.
    fn to_fields(&self) -> StorageResult<BTreeMap<String, Value>>;

    /// `row` with this entity's fields, one version later.
    fn write_to(&self, row: Row) -> StorageResult<Row> {
        Ok(row.with_fields(self.to_fields()?))
    }
}

/// Load one entity, `None` if absent.
pub fn load<E, R>(reader: &R, id: &RecordId) -> EngineResult<Option<(E, Row)>>
where
    E: Record,
    R: RecordReader + ?Sized,
{
    match reader.get(E::COLLECTION, id)? {
        Some(row) => Ok(Some((E::from_row(&row)?, row))),
        None => Ok(None),
    }
}

/// Load one entity or fail with `not-found`.
pub fn require<E, R>(reader: &R, id: &RecordId) -> EngineResult<(E, Row)>
where
    E: Record,
    R: RecordReader + ?Sized,
{
    load(reader, id)?.ok_or_else(|| EngineError::not_found(E::COLLECTION, id))
}

/// Every entity of a collection, unordered.
pub fn load_all<E, R>(reader: &R) -> EngineResult<Vec<E>>
where
    E: Record,
    R: RecordReader + ?Sized,
{
    reader
        .scan(E::COLLECTION)?
        .iter()
        .map(|row| E::from_row(row).map_err(EngineError::from))
        .collect()
}

pub(crate) fn fields_to_map<T: Serialize>(fields: &T) -> StorageResult<BTreeMap<String, Value>> {
    match serde_json::to_value(fields)? {
        Value::Object(map) => Ok(map.into_iter().collect()),
        _ => Err(StorageError::SchemaViolation(
            "entity fields must serialize to a JSON object".to_string(),
        )),
    }
}

pub(crate) fn fields_from_row<T: DeserializeOwned>(collection: Collection, row: &Row) -> StorageResult<T> {
    serde_json::from_value(row.fields_value()).map_err(|e| StorageError::CorruptedData {
        path: RecordPath::new(collection, row.id.clone()).to_path_buf(),
        reason: e.to_string(),
    })
}

pub(crate) fn parse_timestamp(collection: Collection, row: &Row, value: &str) -> StorageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| StorageError::CorruptedData {
            path: RecordPath::new(collection, row.id.clone()).to_path_buf(),
            reason: format!("bad timestamp '{}': {}", value, e),
        })
}
