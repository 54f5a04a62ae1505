//! The ordered-entity abstraction shared by both stores.

use std::cmp::Ordering;
use std::fmt::Debug;
use std::hash::Hash;

use chrono::{DateTime, Utc};

use crate::model::Record;

/// A record with a position inside a scope.
///
/// The scope is the sibling group: the parent for navigation items, the page
/// for content blocks. Order indices only mean something within one scope.
pub trait OrderedEntity: Record + Clone + PartialEq {
    type Scope: Clone + Eq + Hash + Debug;

    fn scope(&self) -> &Self::Scope;

    fn set_scope(&mut self, scope: Self::Scope);

    fn order_index(&self) -> i64;

    fn set_order_index(&mut self, order_index: i64);

    fn created_at(&self) -> DateTime<Utc>;

    /// Human readable scope, used in error messages.
    fn describe_scope(scope: &Self::Scope) -> String;
}

/// Display order: order index, then creation time, then id.
pub fn display_order<E: OrderedEntity>(a: &E, b: &E) -> Ordering {
    a.order_index()
        .cmp(&b.order_index())
        .then_with(|| a.created_at().cmp(&b.created_at()))
        .then_with(|| a.id().cmp(b.id()))
}

/// Members of `scope`, sorted for display.
pub fn in_scope<E: OrderedEntity>(items: Vec<E>, scope: &E::Scope) -> Vec<E> {
    let mut members: Vec<E> = items.into_iter().filter(|item| item.scope() == scope).collect();
    members.sort_by(display_order);
    members
}
