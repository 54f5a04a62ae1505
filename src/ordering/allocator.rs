//! Order-index allocation.
//!
//! A new member goes after the current last one of its scope. The read of
//! the maximum and the write of the new row must share one transaction; the
//! gateway then refuses to commit if another writer got in between.

use tracing::trace;

use crate::gateway::RecordReader;
use crate::model::load_all;
use crate::ordering::entity::OrderedEntity;
use crate::ordering::error::EngineResult;
use crate::storage::RecordId;

/// Index used for the first member of an empty scope.
pub const FIRST_ORDER_INDEX: i64 = 1;

/// `max(order_index) + 1` over `scope`, or [`FIRST_ORDER_INDEX`] when the
/// scope is empty. `exclude` is left out of the maximum.
pub fn next_order_index<E, R>(reader: &R, scope: &E::Scope, exclude: Option<&RecordId>) -> EngineResult<i64>
where
    E: OrderedEntity,
    R: RecordReader + ?Sized,
{
    let max = load_all::<E, _>(reader)?
        .iter()
        .filter(|item| item.scope() == scope)
        .filter(|item| Some(item.id()) != exclude)
        .map(OrderedEntity::order_index)
        .max();

    let next = max.map_or(FIRST_ORDER_INDEX, |max| max.saturating_add(1));
    trace!(scope = ?scope, next, "allocated order index");
    Ok(next)
}

/// The caller's explicit index when given, otherwise the next free one.
///
/// Explicit indices are taken as-is: duplicates are allowed and only go
/// away through a reorder.
pub fn resolve_order_index<E, R>(
    reader: &R,
    scope: &E::Scope,
    explicit: Option<i64>,
    exclude: Option<&RecordId>,
) -> EngineResult<i64>
where
    E: OrderedEntity,
    R: RecordReader + ?Sized,
{
    match explicit {
        Some(order_index) => Ok(order_index),
        None => next_order_index::<E, R>(reader, scope, exclude),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{Gateway, MemoryGateway};
    use crate::model::{ContentBlock, NavigationItem, NewContentBlock, NewNavigationItem, Record};
    use crate::ordering::EngineError;

    fn id(s: &str) -> RecordId {
        RecordId::new(s).unwrap()
    }

    fn seed_navigation(gateway: &MemoryGateway, entries: &[(&str, Option<&str>, i64)]) {
        gateway
            .transaction(|tx| {
                for (key, parent, order_index) in entries {
                    let mut draft = NewNavigationItem::new(*key);
                    if let Some(parent) = parent {
                        draft = draft.parent(id(parent));
                    }
                    tx.insert(NavigationItem::COLLECTION, draft.into_row(id(key), *order_index)?)?;
                }
                Ok::<_, EngineError>(())
            })
            .unwrap();
    }

    #[test]
    fn test_empty_scope_starts_at_one() {
        let gateway = MemoryGateway::new();
        let next: EngineResult<i64> = gateway.read(|r| next_order_index::<NavigationItem, _>(r, &None, None));
        assert_eq!(next.unwrap(), FIRST_ORDER_INDEX);
    }

    #[test]
    fn test_next_is_max_plus_one_within_scope() {
        let gateway = MemoryGateway::new();
        seed_navigation(
            &gateway,
            &[("home", None, 1), ("about", None, 7), ("team", Some("about"), 3)],
        );

        let root: EngineResult<i64> = gateway.read(|r| next_order_index::<NavigationItem, _>(r, &None, None));
        assert_eq!(root.unwrap(), 8);

        let under_about: EngineResult<i64> =
            gateway.read(|r| next_order_index::<NavigationItem, _>(r, &Some(id("about")), None));
        assert_eq!(under_about.unwrap(), 4);

        let under_home: EngineResult<i64> =
            gateway.read(|r| next_order_index::<NavigationItem, _>(r, &Some(id("home")), None));
        assert_eq!(under_home.unwrap(), 1);
    }

    #[test]
    fn test_exclude_and_explicit() {
        let gateway = MemoryGateway::new();
        gateway
            .transaction(|tx| {
                let row = NewContentBlock::new(id("p1"), "hero").into_row(id("hero"), 5)?;
                tx.insert(ContentBlock::COLLECTION, row)?;
                Ok::<_, EngineError>(())
            })
            .unwrap();

        let without_self: EngineResult<i64> =
            gateway.read(|r| next_order_index::<ContentBlock, _>(r, &id("p1"), Some(&id("hero"))));
        assert_eq!(without_self.unwrap(), 1);

        let explicit: EngineResult<i64> =
            gateway.read(|r| resolve_order_index::<ContentBlock, _>(r, &id("p1"), Some(5), None));
        assert_eq!(explicit.unwrap(), 5);
    }
}
