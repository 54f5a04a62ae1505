//! Storage layer error types
//!
//! All errors that can occur during storage operations are defined here.

use std::path::PathBuf;

use thiserror::Error;

use crate::storage::types::{Collection, InvalidNameError, RecordId};

/// the main error type for storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    /// error from the underlying Git library
    #[error("git error: {0}")]
    Git(#[from] git2::Error),

    /// the requested record was not found
    #[error("record not found: {collection}/{id}")]
    RecordNotFound { collection: Collection, id: RecordId },

    /// the collection directory is missing from the tree
    #[error("collection not found: {0}")]
    CollectionNotFound(Collection),

    /// a record with the same id already exists
    #[error("record already exists: {collection}/{id}")]
    RecordAlreadyExists { collection: Collection, id: RecordId },

    /// the collection directory already exists
    #[error("collection already exists: {0}")]
    CollectionAlreadyExists(Collection),

    #[error("invalid name: {0}")]
    InvalidName(#[from] InvalidNameError),

    /// JSON serialization or deserialization failed
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// the specified branch/ref was not found
    #[error("ref not found: {0}")]
    RefNotFound(String),

    /// stored content does not match what the reader expects
    #[error("corrupted data at {path}: {reason}")]
    CorruptedData { path: PathBuf, reason: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("repository not initialized: {0}")]
    NotInitialized(PathBuf),

    #[error("repository is empty: no commits found")]
    EmptyRepository,

    #[error("commit not found: {0}")]
    CommitNotFound(String),

    /// the tree entry has an unexpected type
    #[error("unexpected entry type at {path}: expected {expected}, found {found}")]
    UnexpectedEntryType {
        path: PathBuf,
        expected: String,
        found: String,
    },

    #[error("branch already exists: {0}")]
    BranchAlreadyExists(String),

    /// branch update failed due to concurrent modification
    #[error("concurrent modification: branch {branch} was updated by another transaction")]
    ConcurrentModification { branch: String },

    /// record content is not shaped like a row
    #[error("schema violation: {0}")]
    SchemaViolation(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl StorageError {
    /// check if this error indicates the resource doesn't exist
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StorageError::RecordNotFound { .. }
                | StorageError::CollectionNotFound(_)
                | StorageError::RefNotFound(_)
                | StorageError::CommitNotFound(_)
        )
    }

    /// check if this error is a conflict
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            StorageError::RecordAlreadyExists { .. }
                | StorageError::CollectionAlreadyExists(_)
                | StorageError::ConcurrentModification { .. }
        )
    }

    /// check if this error is recoverable by retry
    pub fn is_retriable(&self) -> bool {
        matches!(self, StorageError::ConcurrentModification { .. })
    }
}

/// result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let not_found = StorageError::CollectionNotFound(Collection::Navigation);
        assert!(not_found.is_not_found());
        assert!(!not_found.is_conflict());

        let conflict = StorageError::RecordAlreadyExists {
            collection: Collection::ContentBlocks,
            id: RecordId::new("hero").unwrap(),
        };
        assert!(!conflict.is_not_found());
        assert!(conflict.is_conflict());
        assert!(!conflict.is_retriable());

        let moved = StorageError::ConcurrentModification { branch: "main".into() };
        assert!(moved.is_retriable());
    }

    #[test]
    fn test_error_messages_name_the_record() {
        let err = StorageError::RecordNotFound {
            collection: Collection::Navigation,
            id: RecordId::new("about").unwrap(),
        };
        assert_eq!(err.to_string(), "record not found: navigation_items/about");
    }
}
