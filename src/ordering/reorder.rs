//! Batch reindexing and scope moves.
//!
//! Everything here writes through a [`RecordStore`], so the caller decides
//! the transaction boundary. The stores in `db` wrap each call in exactly one
//! gateway transaction, which is what makes a batch all-or-nothing.

use tracing::{debug, instrument};

use crate::gateway::RecordStore;
use crate::model::{load_all, require};
use crate::ordering::allocator::resolve_order_index;
use crate::ordering::entity::{in_scope, OrderedEntity};
use crate::ordering::error::{EngineError, EngineResult, PreconditionError};
use crate::storage::RecordId;

/// One position assignment of a reorder batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReorderEntry {
    pub id: RecordId,
    pub order_index: i64,
    /// New parent for navigation items: `Some(None)` moves to the root,
    /// `None` keeps the current parent. Ignored for content blocks.
    pub parent_id: Option<Option<RecordId>>,
}

impl ReorderEntry {
    pub fn new(id: RecordId, order_index: i64) -> Self {
        Self {
            id,
            order_index,
            parent_id: None,
        }
    }

    pub fn with_parent(mut self, parent_id: Option<RecordId>) -> Self {
        self.parent_id = Some(parent_id);
        self
    }
}

/// Apply `entries` in order.
///
/// Every entry must currently belong to `scope`. `prepare` runs on each
/// loaded entity before its new index is set and may veto the entry. The
/// first failure is returned as `batch-aborted` carrying the entry's
/// position; earlier writes are left for the caller's transaction to
/// discard. Returns the number of rows written.
pub fn apply_batch<E, S, P>(store: &mut S, scope: &E::Scope, entries: &[ReorderEntry], mut prepare: P) -> EngineResult<usize>
where
    E: OrderedEntity,
    S: RecordStore + ?Sized,
    P: FnMut(&S, &mut E, &ReorderEntry) -> EngineResult<()>,
{
    let mut written = 0;
    for (index, entry) in entries.iter().enumerate() {
        let changed = apply_entry(store, scope, entry, &mut prepare)
            .map_err(|source| EngineError::batch_aborted(index, &entry.id, source))?;
        if changed {
            written += 1;
        }
    }
    debug!(entries = entries.len(), written, "reorder batch applied");
    Ok(written)
}

fn apply_entry<E, S, P>(store: &mut S, scope: &E::Scope, entry: &ReorderEntry, prepare: &mut P) -> EngineResult<bool>
where
    E: OrderedEntity,
    S: RecordStore + ?Sized,
    P: FnMut(&S, &mut E, &ReorderEntry) -> EngineResult<()>,
{
    let (mut item, row) = require::<E, S>(store, &entry.id)?;

    if item.scope() != scope {
        return Err(PreconditionError::ScopeMismatch {
            id: entry.id.clone(),
            expected: E::describe_scope(scope),
            found: E::describe_scope(item.scope()),
        }
        .into());
    }

    let before = item.clone();
    prepare(store, &mut item, entry)?;
    item.set_order_index(entry.order_index);

    if item == before {
        return Ok(false);
    }
    store.update(E::COLLECTION, item.write_to(row)?)?;
    Ok(true)
}

/// Renumber `scope` to `1..=n` in its current display order.
#[instrument(level = "debug", skip(store))]
pub fn renumber<E, S>(store: &mut S, scope: &E::Scope) -> EngineResult<usize>
where
    E: OrderedEntity,
    S: RecordStore + ?Sized,
{
    let members = in_scope(load_all::<E, S>(store)?, scope);

    let mut written = 0;
    for (position, member) in members.into_iter().enumerate() {
        let target = position as i64 + 1;
        if member.order_index() == target {
            continue;
        }
        let (mut item, row) = require::<E, S>(store, member.id())?;
        item.set_order_index(target);
        store.update(E::COLLECTION, item.write_to(row)?)?;
        written += 1;
    }
    Ok(written)
}

/// Move `id` into `scope` at `explicit` or at the scope's next free index.
///
/// The entity itself is left out when computing the next index, so moving
/// within the same scope does not skip a slot.
#[instrument(level = "debug", skip(store))]
pub fn relocate<E, S>(store: &mut S, id: &RecordId, scope: E::Scope, explicit: Option<i64>) -> EngineResult<E>
where
    E: OrderedEntity,
    S: RecordStore + ?Sized,
{
    let (mut item, row) = require::<E, S>(store, id)?;
    let order_index = resolve_order_index::<E, S>(store, &scope, explicit, Some(id))?;

    let before = item.clone();
    item.set_scope(scope);
    item.set_order_index(order_index);
    if item == before {
        return Ok(item);
    }

    let row = item.write_to(row)?;
    store.update(E::COLLECTION, row.clone())?;
    Ok(E::from_row(&row)?)
}
