//! Transaction context using typestate pattern.
//!
//! The typestate pattern ensures at compile time that transactions
//! are used correctly:
//! - Only active transactions can perform operations
//! - Committed/aborted transactions cannot be reused

use std::marker::PhantomData;

use tracing::debug;

use crate::storage::{BranchName, Collection, CommitId, GitRepository, RecordId, Row, StorageError};
use crate::transaction::error::{TransactionError, TransactionResult};

/// Marker type for active transactions.
#[derive(Debug)]
pub struct TxActive;

/// Marker type for committed transactions.
#[derive(Debug)]
pub struct TxCommitted;

/// Marker type for aborted transactions.
#[derive(Debug)]
pub struct TxAborted;

/// Transaction metadata stored in the manager.
#[derive(Debug, Clone)]
pub struct TransactionMetadata {
    pub tx_id: String,
    pub branch: BranchName,
    /// tip of `main` when the transaction began
    pub base_commit: CommitId,
    /// head of the transaction branch
    pub current_commit: CommitId,
    pub started_at: chrono::DateTime<chrono::Utc>,
}

/// A unit of work on its own `tx/` branch.
///
/// Reads see the snapshot taken at begin plus the transaction's own writes.
/// Nothing is visible on `main` until [`Transaction::commit`].
pub struct Transaction<State> {
    pub(crate) metadata: TransactionMetadata,
    pub(crate) repo: GitRepository,
    _state: PhantomData<State>,
}

impl<State> Transaction<State> {
    pub fn id(&self) -> &str {
        &self.metadata.tx_id
    }

    pub fn base_commit(&self) -> CommitId {
        self.metadata.base_commit
    }

    pub fn branch(&self) -> &BranchName {
        &self.metadata.branch
    }

    fn into_state<Next>(self) -> Transaction<Next> {
        Transaction {
            metadata: self.metadata,
            repo: self.repo,
            _state: PhantomData,
        }
    }
}

impl Transaction<TxActive> {
    pub(crate) fn new(repo: GitRepository, tx_id: String, branch: BranchName, base_commit: CommitId) -> Self {
        Self {
            metadata: TransactionMetadata {
                tx_id,
                branch,
                base_commit,
                current_commit: base_commit,
                started_at: chrono::Utc::now(),
            },
            repo,
            _state: PhantomData,
        }
    }

    pub fn current_commit(&self) -> CommitId {
        self.metadata.current_commit
    }

    /// Whether the transaction has written anything yet.
    pub fn has_writes(&self) -> bool {
        self.metadata.current_commit != self.metadata.base_commit
    }

    fn advance(&mut self, new_commit: CommitId) -> TransactionResult<()> {
        self.metadata.current_commit = new_commit;
        self.repo
            .update_branch(&self.metadata.branch, new_commit)
            .map_err(TransactionError::from)
    }

    // ==================== Collections ====================

    pub fn create_collection(&mut self, collection: Collection) -> TransactionResult<()> {
        let new_commit =
            self.repo
                .create_collection(collection, self.metadata.current_commit, Some(&self.metadata.tx_id))?;
        self.advance(new_commit)
    }

    pub fn collection_exists(&self, collection: Collection) -> TransactionResult<bool> {
        Ok(self.repo.collection_exists(collection, self.metadata.current_commit)?)
    }

    // ==================== Records ====================

    pub fn insert(&mut self, collection: Collection, row: Row) -> TransactionResult<()> {
        let new_commit =
            self.repo
                .insert_record(collection, row, self.metadata.current_commit, Some(&self.metadata.tx_id))?;
        self.advance(new_commit)
    }

    pub fn update(&mut self, collection: Collection, row: Row) -> TransactionResult<()> {
        let new_commit =
            self.repo
                .update_record(collection, row, self.metadata.current_commit, Some(&self.metadata.tx_id))?;
        self.advance(new_commit)
    }

    pub fn delete(&mut self, collection: Collection, id: &RecordId) -> TransactionResult<()> {
        let new_commit =
            self.repo
                .delete_record(collection, id, self.metadata.current_commit, Some(&self.metadata.tx_id))?;
        self.advance(new_commit)
    }

    pub fn read(&self, collection: Collection, id: &RecordId) -> TransactionResult<Option<Row>> {
        Ok(self.repo.read_record(collection, id, self.metadata.current_commit)?)
    }

    pub fn scan(&self, collection: Collection) -> TransactionResult<Vec<Row>> {
        Ok(self.repo.scan_collection(collection, self.metadata.current_commit)?)
    }

    // ==================== Transaction Control ====================

    fn discard_branch(&self) {
        if let Err(e) = self.repo.delete_transaction_branch(&self.metadata.tx_id) {
            debug!(tx_id = %self.metadata.tx_id, error = %e, "failed to delete transaction branch");
        }
    }

    /// Publish the transaction's writes by fast-forwarding `main`.
    ///
    /// First committer wins: if `main` moved since this transaction began,
    /// the commit fails with a retryable [`TransactionError::Conflict`] and
    /// nothing is published. A transaction without writes commits trivially.
    pub fn commit(self) -> TransactionResult<Transaction<TxCommitted>> {
        if !self.has_writes() {
            self.discard_branch();
            return Ok(self.into_state());
        }

        let main_head = self.repo.head()?;
        if main_head != self.metadata.base_commit {
            let paths = self.repo.detect_conflicts(&self.metadata.branch, main_head)?;
            self.discard_branch();
            return Err(TransactionError::conflict(paths));
        }

        match self.repo.fast_forward_main(&self.metadata.branch, self.metadata.base_commit) {
            Ok(_) => {}
            Err(StorageError::ConcurrentModification { .. }) => {
                let main_head = self.repo.head()?;
                let paths = self.repo.detect_conflicts(&self.metadata.branch, main_head)?;
                self.discard_branch();
                return Err(TransactionError::conflict(paths));
            }
            Err(e) => {
                self.discard_branch();
                return Err(TransactionError::Storage(e));
            }
        }

        self.discard_branch();
        Ok(self.into_state())
    }

    /// Discard every write made in this transaction.
    pub fn rollback(self) -> Transaction<TxAborted> {
        self.discard_branch();
        self.into_state()
    }
}

impl Transaction<TxCommitted> {
    /// Tip of `main` after the commit; the base commit if nothing was written.
    pub fn final_commit(&self) -> CommitId {
        self.metadata.current_commit
    }
}
