//! The hierarchical ordering engine.
//!
//! Algorithms shared by the navigation tree and the content-block lists:
//!
//! - [`allocator`]: next order index for a scope
//! - [`cycle`]: ancestor walk guarding reparent operations
//! - [`guard`]: refuse to delete navigation items that still have children
//! - [`reorder`]: atomic batch reindex, renumbering and scope relocation
//! - [`index`]: scope to members lookup for building trees
//!
//! Nothing here holds state between calls. Every function reads from and
//! writes to the gateway view it is handed.

pub mod allocator;
pub mod cycle;
pub mod entity;
mod error;
pub mod guard;
pub mod index;
pub mod reorder;

pub use allocator::{next_order_index, resolve_order_index, FIRST_ORDER_INDEX};
pub use cycle::{CycleGuard, DEFAULT_MAX_DEPTH};
pub use entity::{display_order, in_scope, OrderedEntity};
pub use error::{EngineError, EngineResult, ErrorCategory, PreconditionError, ValidationError};
pub use guard::ensure_deletable;
pub use index::SiblingIndex;
pub use reorder::{apply_batch, relocate, renumber, ReorderEntry};

/// How reorder batches treat entries that carry a new parent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BatchReparentPolicy {
    /// Run the cycle guard on every parent change, against the batch's own
    /// earlier writes included.
    #[default]
    Validate,
    /// Apply parent changes unchecked. For callers that already validated
    /// the whole batch.
    Trusted,
}

/// Tunables of the ordering engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderingOptions {
    /// Bound on the ancestor walk.
    pub max_depth: usize,
    pub batch_reparent: BatchReparentPolicy,
}

impl Default for OrderingOptions {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            batch_reparent: BatchReparentPolicy::default(),
        }
    }
}

impl OrderingOptions {
    pub fn max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn batch_reparent(mut self, policy: BatchReparentPolicy) -> Self {
        self.batch_reparent = policy;
        self
    }

    pub fn cycle_guard(&self) -> CycleGuard {
        CycleGuard::new(self.max_depth)
    }
}
