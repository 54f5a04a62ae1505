//! Ordering engine error types.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::storage::{Collection, InvalidNameError, RecordId, StorageError};
use crate::transaction::TransactionError;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Input rejected before the store is touched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("label must not be blank")]
    BlankLabel,

    #[error("label is {len} characters long, at most {max} allowed")]
    LabelTooLong { len: usize, max: usize },

    #[error("block type must not be blank")]
    BlankBlockType,

    #[error("invalid id: {0}")]
    InvalidId(#[from] InvalidNameError),
}

impl ValidationError {
    pub fn code(&self) -> &'static str {
        match self {
            ValidationError::BlankLabel => "blank-label",
            ValidationError::LabelTooLong { .. } => "label-too-long",
            ValidationError::BlankBlockType => "blank-block-type",
            ValidationError::InvalidId(_) => "invalid-id",
        }
    }
}

/// A rule the current store state does not allow.
///
/// Raised after reading, always before any write.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PreconditionError {
    #[error("item {id} cannot be its own parent")]
    SelfParent { id: RecordId },

    #[error("moving {id} under {parent} would create a cycle")]
    CircularReference { id: RecordId, parent: RecordId },

    /// The ancestor walk did not reach a root within the depth bound.
    #[error("ancestors of {parent} exceed {max_depth} levels")]
    DepthExceeded { parent: RecordId, max_depth: usize },

    #[error("parent {parent} does not exist")]
    ParentNotFound { parent: RecordId },

    #[error("item {id} still has {count} children")]
    HasChildren { id: RecordId, count: usize },

    #[error("item {id} belongs to {found}, not {expected}")]
    ScopeMismatch {
        id: RecordId,
        expected: String,
        found: String,
    },
}

impl PreconditionError {
    pub fn code(&self) -> &'static str {
        match self {
            PreconditionError::SelfParent { .. } => "self-parent",
            PreconditionError::CircularReference { .. } | PreconditionError::DepthExceeded { .. } => {
                "circular-reference"
            }
            PreconditionError::ParentNotFound { .. } => "parent-not-found",
            PreconditionError::HasChildren { .. } => "has-children",
            PreconditionError::ScopeMismatch { .. } => "scope-mismatch",
        }
    }
}

/// Coarse classification callers can branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    Precondition,
    /// the store changed under the caller or lacks the entity
    Consistency,
    /// a batch was rolled back
    Transactional,
    /// storage failure unrelated to the request
    Storage,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCategory::Validation => "validation",
            ErrorCategory::Precondition => "precondition",
            ErrorCategory::Consistency => "consistency",
            ErrorCategory::Transactional => "transactional",
            ErrorCategory::Storage => "storage",
        };
        f.write_str(name)
    }
}

/// Errors returned by the ordering engine and the stores built on it.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid input: {0}")]
    Validation(#[from] ValidationError),

    #[error("rejected: {0}")]
    Precondition(#[from] PreconditionError),

    #[error("{collection}/{id} not found")]
    NotFound { collection: Collection, id: RecordId },

    /// Another writer committed first.
    #[error("concurrent modification: {}", conflict_display(.paths))]
    Conflict { paths: Vec<PathBuf> },

    /// The entry at `index` failed and the whole batch was rolled back.
    #[error("batch aborted at entry {index} ({id}): {source}")]
    BatchAborted {
        index: usize,
        id: RecordId,
        #[source]
        source: Box<EngineError>,
    },

    #[error(transparent)]
    Transaction(TransactionError),
}

fn conflict_display(paths: &[PathBuf]) -> String {
    if paths.is_empty() {
        return "store changed since the operation began".to_string();
    }
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl EngineError {
    pub fn not_found(collection: Collection, id: &RecordId) -> Self {
        EngineError::NotFound {
            collection,
            id: id.clone(),
        }
    }

    pub fn batch_aborted(index: usize, id: &RecordId, source: EngineError) -> Self {
        EngineError::BatchAborted {
            index,
            id: id.clone(),
            source: Box::new(source),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            EngineError::Validation(_) => ErrorCategory::Validation,
            EngineError::Precondition(_) => ErrorCategory::Precondition,
            EngineError::NotFound { .. } | EngineError::Conflict { .. } => ErrorCategory::Consistency,
            EngineError::BatchAborted { .. } => ErrorCategory::Transactional,
            EngineError::Transaction(_) => ErrorCategory::Storage,
        }
    }

    /// Stable, machine-readable reason.
    pub fn reason_code(&self) -> &'static str {
        match self {
            EngineError::Validation(e) => e.code(),
            EngineError::Precondition(e) => e.code(),
            EngineError::NotFound { .. } => "not-found",
            EngineError::Conflict { .. } => "conflict",
            EngineError::BatchAborted { .. } => "batch-aborted",
            EngineError::Transaction(_) => "storage",
        }
    }

    /// The error behind a batch abort, or `self` for every other error.
    pub fn root_cause(&self) -> &EngineError {
        let mut current = self;
        while let EngineError::BatchAborted { source, .. } = current {
            current = source;
        }
        current
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self.root_cause(), EngineError::Conflict { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.root_cause(), EngineError::NotFound { .. })
    }
}

impl From<TransactionError> for EngineError {
    fn from(e: TransactionError) -> Self {
        match e {
            TransactionError::Conflict { paths } => EngineError::Conflict { paths },
            TransactionError::Storage(StorageError::RecordNotFound { collection, id }) => {
                EngineError::NotFound { collection, id }
            }
            other => EngineError::Transaction(other),
        }
    }
}

impl From<StorageError> for EngineError {
    fn from(e: StorageError) -> Self {
        TransactionError::from(e).into()
    }
}

impl From<InvalidNameError> for EngineError {
    fn from(e: InvalidNameError) -> Self {
        EngineError::Validation(e.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> RecordId {
        RecordId::new(s).unwrap()
    }

    #[test]
    fn test_reason_codes() {
        let cycle: EngineError = PreconditionError::CircularReference {
            id: id("a"),
            parent: id("c"),
        }
        .into();
        assert_eq!(cycle.reason_code(), "circular-reference");
        assert_eq!(cycle.category(), ErrorCategory::Precondition);

        let depth: EngineError = PreconditionError::DepthExceeded {
            parent: id("c"),
            max_depth: 50,
        }
        .into();
        assert_eq!(depth.reason_code(), "circular-reference");

        let blank: EngineError = ValidationError::BlankLabel.into();
        assert_eq!(blank.reason_code(), "blank-label");
        assert_eq!(blank.category(), ErrorCategory::Validation);
    }

    #[test]
    fn test_transaction_errors_are_classified() {
        let conflict: EngineError = TransactionError::conflict(Vec::new()).into();
        assert_eq!(conflict.reason_code(), "conflict");
        assert_eq!(conflict.category(), ErrorCategory::Consistency);

        let missing: EngineError = StorageError::RecordNotFound {
            collection: Collection::Navigation,
            id: id("ghost"),
        }
        .into();
        assert!(missing.is_not_found());

        let io: EngineError = StorageError::Internal("disk".to_string()).into();
        assert_eq!(io.category(), ErrorCategory::Storage);
    }

    #[test]
    fn test_batch_abort_keeps_cause() {
        let cause = EngineError::not_found(Collection::ContentBlocks, &id("ghost"));
        let batch = EngineError::batch_aborted(2, &id("ghost"), cause);

        assert_eq!(batch.reason_code(), "batch-aborted");
        assert_eq!(batch.category(), ErrorCategory::Transactional);
        assert_eq!(batch.root_cause().reason_code(), "not-found");
        assert!(batch.to_string().contains("entry 2"));
    }
}
