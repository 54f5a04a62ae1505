//! Navigation menu items.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::{fields_from_row, fields_to_map, parse_timestamp, Record};
use crate::ordering::{OrderedEntity, ValidationError};
use crate::storage::{Collection, RecordId, Row, StorageResult};

/// Longest label a menu item may carry, in characters.
pub const MAX_LABEL_LEN: usize = 50;

/// A node of the navigation tree.
///
/// Children are never stored: they are the items whose `parent_id` points
/// here.
#[derive(Debug, Clone, PartialEq)]
pub struct NavigationItem {
    pub id: RecordId,
    pub label: String,
    pub url: Option<String>,
    /// `None` for root items
    pub parent_id: Option<RecordId>,
    /// position among siblings
    pub order_index: i64,
    pub is_active: bool,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct NavigationFields {
    label: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    parent_id: Option<RecordId>,
    order_index: i64,
    #[serde(default = "default_active")]
    is_active: bool,
}

fn default_active() -> bool {
    true
}

pub(crate) fn validate_label(label: &str) -> Result<(), ValidationError> {
    if label.trim().is_empty() {
        return Err(ValidationError::BlankLabel);
    }
    let len = label.chars().count();
    if len > MAX_LABEL_LEN {
        return Err(ValidationError::LabelTooLong {
            len,
            max: MAX_LABEL_LEN,
        });
    }
    Ok(())
}

impl Record for NavigationItem {
    const COLLECTION: Collection = Collection::Navigation;

    fn id(&self) -> &RecordId {
        &self.id
    }

    fn from_row(row: &Row) -> StorageResult<Self> {
        let fields: NavigationFields = fields_from_row(Self::COLLECTION, row)?;
        Ok(Self {
            id: row.id.clone(),
            label: fields.label,
            url: fields.url,
            parent_id: fields.parent_id,
            order_index: fields.order_index,
            is_active: fields.is_active,
            version: row.version,
            created_at: parse_timestamp(Self::COLLECTION, row, &row.created_at)?,
            updated_at: parse_timestamp(Self::COLLECTION, row, &row.updated_at)?,
        })
    }

    fn to_fields(&self) -> StorageResult<BTreeMap<String, Value>> {
        fields_to_map(&NavigationFields {
            label: self.label.clone(),
            url: self.url.clone(),
            parent_id: self.parent_id.clone(),
            order_index: self.order_index,
            is_active: self.is_active,
        })
    }
}

impl OrderedEntity for NavigationItem {
    type Scope = Option<RecordId>;

    fn scope(&self) -> &Option<RecordId> {
        &self.parent_id
    }

    fn set_scope(&mut self, scope: Option<RecordId>) {
        self.parent_id = scope;
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

    fn describe_scope(scope: &Option<RecordId>) -> String {
        match scope {
            Some(parent) => format!("parent {}", parent),
            None => "the root level".to_string(),
        }
    }
}

/// Input for creating a navigation item.
#[derive(Debug, Clone, PartialEq)]
pub struct NewNavigationItem {
    pub label: String,
    pub url: Option<String>,
    pub parent_id: Option<RecordId>,
    /// explicit position; the next free index when `None`
    pub order_index: Option<i64>,
    pub is_active: bool,
}

impl NewNavigationItem {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            url: None,
            parent_id: None,
            order_index: None,
            is_active: true,
        }
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn parent(mut self, parent_id: RecordId) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    pub fn order_index(mut self, order_index: i64) -> Self {
        self.order_index = Some(order_index);
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_label(&self.label)
    }

    /// A fresh row for this input at the resolved position.
    pub(crate) fn into_row(self, id: RecordId, order_index: i64) -> StorageResult<Row> {
        let fields = fields_to_map(&NavigationFields {
            label: self.label,
            url: self.url,
            parent_id: self.parent_id,
            order_index,
            is_active: self.is_active,
        })?;
        Ok(Row::new(id, fields))
    }
}

/// Partial update of a navigation item. Parent changes go through reparent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NavigationPatch {
    pub label: Option<String>,
    /// `Some(None)` clears the link
    pub url: Option<Option<String>>,
    pub is_active: Option<bool>,
    pub order_index: Option<i64>,
}

impl NavigationPatch {
    pub fn validate(&self) -> Result<(), ValidationError> {
        match &self.label {
            Some(label) => validate_label(label),
            None => Ok(()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Apply to `item`; returns whether anything changed.
    pub(crate) fn apply(&self, item: &mut NavigationItem) -> bool {
        let before = item.clone();
        if let Some(label) = &self.label {
            item.label = label.clone();
        }
        if let Some(url) = &self.url {
            item.url = url.clone();
        }
        if let Some(is_active) = self.is_active {
            item.is_active = is_active;
        }
        if let Some(order_index) = self.order_index {
            item.order_index = order_index;
        }
        *item != before
    }
}

/// A navigation item with its children, in display order.
#[derive(Debug, Clone, PartialEq)]
pub struct NavigationNode {
    pub item: NavigationItem,
    pub children: Vec<NavigationNode>,
}

impl NavigationNode {
    /// Number of items in this subtree, the node included.
    pub fn size(&self) -> usize {
        1 + self.children.iter().map(NavigationNode::size).sum::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_label_validation() {
        assert!(validate_label("Home").is_ok());
        assert_eq!(validate_label("   "), Err(ValidationError::BlankLabel));

        let long = "x".repeat(MAX_LABEL_LEN + 1);
        assert!(matches!(validate_label(&long), Err(ValidationError::LabelTooLong { len: 51, .. })));
        assert!(validate_label(&"é".repeat(MAX_LABEL_LEN)).is_ok());
    }

    #[test]
    fn test_row_round_trip_keeps_metadata() {
        let id = RecordId::new("home").unwrap();
        let row = NewNavigationItem::new("Home").url("/").into_row(id.clone(), 1).unwrap();

        let item = NavigationItem::from_row(&row).unwrap();
        assert_eq!(item.id, id);
        assert_eq!(item.parent_id, None);
        assert_eq!(item.order_index, 1);
        assert!(item.is_active);
        assert_eq!(item.version, 1);

        let mut moved = item.clone();
        moved.parent_id = Some(RecordId::new("root").unwrap());
        let updated = moved.write_to(row).unwrap();
        assert_eq!(updated.version, 2);
        assert_eq!(updated.get("parent_id"), Some(&json!("root")));
    }

    #[test]
    fn test_missing_optional_fields_use_defaults() {
        let row = Row::from_value(
            RecordId::new("legacy").unwrap(),
            json!({"label": "Legacy", "order_index": 3}),
        )
        .unwrap();

        let item = NavigationItem::from_row(&row).unwrap();
        assert!(item.is_active);
        assert_eq!(item.url, None);
    }

    #[test]
    fn test_malformed_row_is_corrupted_data() {
        let row = Row::from_value(RecordId::new("bad").unwrap(), json!({"label": 42})).unwrap();
        let err = NavigationItem::from_row(&row).unwrap_err();
        assert!(err.to_string().contains("navigation_items/bad.json"));
    }

    #[test]
    fn test_patch_reports_changes() {
        let row = NewNavigationItem::new("Home")
            .into_row(RecordId::new("home").unwrap(), 1)
            .unwrap();
        let mut item = NavigationItem::from_row(&row).unwrap();

        let noop = NavigationPatch {
            label: Some("Home".to_string()),
            ..Default::default()
        };
        assert!(!noop.apply(&mut item));

        let patch = NavigationPatch {
            url: Some(Some("/start".to_string())),
            is_active: Some(false),
            ..Default::default()
        };
        assert!(patch.apply(&mut item));
        assert_eq!(item.url.as_deref(), Some("/start"));
        assert!(!item.is_active);
    }
}
