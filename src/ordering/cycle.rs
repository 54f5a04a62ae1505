//! Cycle guard for navigation reparenting.

use tracing::{instrument, warn};

use crate::gateway::RecordReader;
use crate::model::{load, NavigationItem};
use crate::ordering::error::{EngineResult, PreconditionError};
use crate::storage::RecordId;

/// Default bound on the ancestor walk.
pub const DEFAULT_MAX_DEPTH: usize = 50;

/// Rejects parent changes that would make a node its own ancestor.
///
/// The walk goes upward from the proposed parent one hop at a time and
/// never recurses. Running past `max_depth` hops is treated as a cycle, so
/// corrupted parent chains cannot stall a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleGuard {
    max_depth: usize,
}

impl Default for CycleGuard {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DEPTH)
    }
}

impl CycleGuard {
    pub fn new(max_depth: usize) -> Self {
        Self { max_depth }
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Check moving `node` under `new_parent` against the store.
    ///
    /// Moving to the root (`None`) is always allowed.
    #[instrument(level = "debug", skip(self, reader))]
    pub fn check<R>(&self, reader: &R, node: &RecordId, new_parent: Option<&RecordId>) -> EngineResult<()>
    where
        R: RecordReader + ?Sized,
    {
        self.walk(node, new_parent, |id| {
            Ok(load::<NavigationItem, R>(reader, id)?.map(|(item, _)| item.parent_id))
        })
    }

    /// The walk itself. `parent_of` returns `None` for a missing node and
    /// `Some(parent)` otherwise.
    pub fn walk<F>(&self, node: &RecordId, new_parent: Option<&RecordId>, mut parent_of: F) -> EngineResult<()>
    where
        F: FnMut(&RecordId) -> EngineResult<Option<Option<RecordId>>>,
    {
        let Some(new_parent) = new_parent else {
            return Ok(());
        };

        if new_parent == node {
            return Err(PreconditionError::SelfParent { id: node.clone() }.into());
        }

        let Some(mut current) = parent_of(new_parent)? else {
            return Err(PreconditionError::ParentNotFound {
                parent: new_parent.clone(),
            }
            .into());
        };

        let mut hops = 0;
        while let Some(ancestor) = current {
            if &ancestor == node {
                return Err(PreconditionError::CircularReference {
                    id: node.clone(),
                    parent: new_parent.clone(),
                }
                .into());
            }

            hops += 1;
            if hops > self.max_depth {
                warn!(%node, %new_parent, max_depth = self.max_depth, "ancestor walk exceeded depth bound");
                return Err(PreconditionError::DepthExceeded {
                    parent: new_parent.clone(),
                    max_depth: self.max_depth,
                }
                .into());
            }

            // a dangling reference ends the chain like a root would
            current = parent_of(&ancestor)?.flatten();
        }

        Ok(())
    }
}
