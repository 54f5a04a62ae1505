//! Transaction error types.

use std::path::PathBuf;

use thiserror::Error;

use crate::storage::StorageError;

/// Result type for transaction operations.
pub type TransactionResult<T> = Result<T, TransactionError>;

/// Errors that can occur during transaction operations.
#[derive(Debug, Error)]
pub enum TransactionError {
    /// Storage layer error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// `main` moved after the transaction began.
    ///
    /// `paths` lists records both sides touched; it may be empty when the
    /// concurrent commit changed unrelated records.
    #[error("transaction conflict on paths: {}", paths_display(.paths))]
    Conflict { paths: Vec<PathBuf> },

    /// Internal error.
    #[error("internal transaction error: {0}")]
    Internal(String),
}

fn paths_display(paths: &[PathBuf]) -> String {
    if paths.is_empty() {
        return "(store changed concurrently)".to_string();
    }
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl TransactionError {
    /// Whether running the same unit of work again may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            TransactionError::Conflict { .. } => true,
            TransactionError::Storage(e) => e.is_retriable(),
            TransactionError::Internal(_) => false,
        }
    }

    pub fn conflict(paths: Vec<PathBuf>) -> Self {
        Self::Conflict { paths }
    }
}
