//! Page content blocks.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::{fields_from_row, fields_to_map, parse_timestamp, Record};
use crate::ordering::{OrderedEntity, ValidationError};
use crate::storage::{Collection, RecordId, Row, StorageResult};

/// One block of a page body.
///
/// `data` is owned by the block type and never interpreted here. Pages live
/// outside this store, so `page_id` is only a key.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentBlock {
    pub id: RecordId,
    pub page_id: RecordId,
    pub block_type: String,
    pub data: Value,
    /// position on the page
    pub order_index: i64,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ContentFields {
    page_id: RecordId,
    block_type: String,
    #[serde(default)]
    data: Value,
    order_index: i64,
}

fn validate_block_type(block_type: &str) -> Result<(), ValidationError> {
    if block_type.trim().is_empty() {
        return Err(ValidationError::BlankBlockType);
    }
    Ok(())
}

impl Record for ContentBlock {
    const COLLECTION: Collection = Collection::ContentBlocks;

    fn id(&self) -> &RecordId {
        &self.id
    }

    fn from_row(row: &Row) -> StorageResult<Self> {
        let fields: ContentFields = fields_from_row(Self::COLLECTION, row)?;
        Ok(Self {
            id: row.id.clone(),
            page_id: fields.page_id,
            block_type: fields.block_type,
            data: fields.data,
            order_index: fields.order_index,
            version: row.version,
            created_at: parse_timestamp(Self::COLLECTION, row, &row.created_at)?,
            updated_at: parse_timestamp(Self::COLLECTION, row, &row.updated_at)?,
        })
    }

    fn to_fields(&self) -> StorageResult<BTreeMap<String, Value>> {
        fields_to_map(&ContentFields {
            page_id: self.page_id.clone(),
            block_type: self.block_type.clone(),
            data: self.data.clone(),
            order_index: self.order_index,
        })
    }
}

impl OrderedEntity for ContentBlock {
    type Scope = RecordId;

    fn scope(&self) -> &RecordId {
        &self.page_id
    }

    fn set_scope(&mut self, scope: RecordId) {
        self.page_id = scope;
    }

    fn order_index(&self) -> i64 {
        self.order_index
    }

    fn set_order_index(&mut self, order_index: i64) {
        self.order_index = order_index;
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn describe_scope(scope: &RecordId) -> String {
        format!("page {}", scope)
    }
}

/// Input for creating a content block.
#[derive(Debug, Clone, PartialEq)]
pub struct NewContentBlock {
    pub page_id: RecordId,
    pub block_type: String,
    pub data: Value,
    pub order_index: Option<i64>,
}

impl NewContentBlock {
    pub fn new(page_id: RecordId, block_type: impl Into<String>) -> Self {
        Self {
            page_id,
            block_type: block_type.into(),
            data: Value::Null,
            order_index: None,
        }
    }

    pub fn data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    pub fn order_index(mut self, order_index: i64) -> Self {
        self.order_index = Some(order_index);
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_block_type(&self.block_type)
    }

    pub(crate) fn into_row(self, id: RecordId, order_index: i64) -> StorageResult<Row> {
        let fields = fields_to_map(&ContentFields {
            page_id: self.page_id,
            block_type: self.block_type,
            data: self.data,
            order_index,
        })?;
        Ok(Row::new(id, fields))
    }
}

/// Partial update of a content block. Page changes go through relocate.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContentBlockPatch {
    pub block_type: Option<String>,
    pub data: Option<Value>,
    pub order_index: Option<i64>,
}

impl ContentBlockPatch {
    pub fn validate(&self) -> Result<(), ValidationError> {
        match &self.block_type {
            Some(block_type) => validate_block_type(block_type),
            None => Ok(()),
        }
    }

    pub(crate) fn apply(&self, block: &mut ContentBlock) -> bool {
        let before = block.clone();
        if let Some(block_type) = &self.block_type {
            block.block_type = block_type.clone();
        }
        if let Some(data) = &self.data {
            block.data = data.clone();
        }
        if let Some(order_index) = self.order_index {
            block.order_index = order_index;
        }
        *block != before
    }
}
