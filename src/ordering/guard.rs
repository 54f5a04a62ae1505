//! Delete guard for navigation items.

use tracing::debug;

use crate::gateway::RecordReader;
use crate::model::{load_all, require, NavigationItem};
use crate::ordering::error::{EngineResult, PreconditionError};
use crate::storage::{RecordId, Row};

/// Ensure `id` exists and has no children, returning it.
///
/// Existence is checked first, so a missing item reports `not-found` even
/// if stale rows still point at it.
pub fn ensure_deletable<R>(reader: &R, id: &RecordId) -> EngineResult<(NavigationItem, Row)>
where
    R: RecordReader + ?Sized,
{
    let found = require::<NavigationItem, R>(reader, id)?;

    let count = load_all::<NavigationItem, R>(reader)?
        .iter()
        .filter(|item| item.parent_id.as_ref() == Some(id))
        .count();

    if count > 0 {
        debug!(%id, count, "refusing to delete item with children");
        return Err(PreconditionError::HasChildren { id: id.clone(), count }.into());
    }

    Ok(found)
}
