//! Scope index: scope key to member ids in display order.

use std::collections::HashMap;

use crate::ordering::entity::{display_order, OrderedEntity};
use crate::storage::RecordId;

/// Adjacency lookup built from a flat list of entities.
///
/// For navigation items the key is the parent, so `members(&Some(id))` are
/// the children of `id` and `members(&None)` the roots.
#[derive(Debug, Clone)]
pub struct SiblingIndex<K> {
    members: HashMap<K, Vec<RecordId>>,
}

impl<K> SiblingIndex<K>
where
    K: Clone + Eq + std::hash::Hash,
{
    pub fn build<E>(items: &[E]) -> Self
    where
        E: OrderedEntity<Scope = K>,
    {
        let mut sorted: Vec<&E> = items.iter().collect();
        sorted.sort_by(|a, b| display_order(*a, *b));

        let mut members: HashMap<K, Vec<RecordId>> = HashMap::new();
        for item in sorted {
            members.entry(item.scope().clone()).or_default().push(item.id().clone());
        }
        Self { members }
    }

    pub fn members(&self, scope: &K) -> &[RecordId] {
        self.members.get(scope).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn count(&self, scope: &K) -> usize {
        self.members(scope).len()
    }

    pub fn scopes(&self) -> impl Iterator<Item = &K> {
        self.members.keys()
    }
}

impl SiblingIndex<Option<RecordId>> {
    pub fn children(&self, parent: &RecordId) -> &[RecordId] {
        self.members(&Some(parent.clone()))
    }

    pub fn roots(&self) -> &[RecordId] {
        self.members(&None)
    }
}
