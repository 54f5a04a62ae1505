//! Transaction manager - coordinates all transaction operations.
//!
//! The TransactionManager is the main entry point for transactions.
//! It handles:
//! - Transaction creation and lifecycle
//! - Tracking active transactions
//! - Serializing commits to main
//! - Cleanup of abandoned transactions

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, instrument, warn};
use ulid::Ulid;

use crate::storage::{CommitId, GitRepository};
use crate::transaction::context::{Transaction, TransactionMetadata, TxActive};
use crate::transaction::error::{TransactionError, TransactionResult};

/// Age after which an unknown `tx/` branch counts as abandoned.
///
/// Younger branches may belong to another handle on the same store.
pub const ABANDONED_AFTER: Duration = Duration::from_secs(15 * 60);

/// When the transaction behind `tx_id` began, if the id is a ULID.
fn started_at(tx_id: &str) -> Option<SystemTime> {
    Ulid::from_string(&tx_id.to_uppercase()).ok().map(|ulid| ulid.datetime())
}

/// Transaction manager - coordinates all transaction operations.
///
/// Thread-safe: can be shared across threads via Clone (uses Arc internally).
#[derive(Clone)]
pub struct TransactionManager {
    inner: Arc<TransactionManagerInner>,
}

struct TransactionManagerInner {
    repo: GitRepository,
    active: RwLock<HashMap<String, TransactionMetadata>>,
    /// serializes fast-forwards of main
    commit_lock: Mutex<()>,
}

impl TransactionManager {
    pub fn new(repo: GitRepository) -> Self {
        Self {
            inner: Arc::new(TransactionManagerInner {
                repo,
                active: RwLock::new(HashMap::new()),
                commit_lock: Mutex::new(()),
            }),
        }
    }

    pub fn repo(&self) -> &GitRepository {
        &self.inner.repo
    }

    /// Begin a transaction on a snapshot of the current `main`.
    pub fn begin(&self) -> TransactionResult<Transaction<TxActive>> {
        let tx_id = Ulid::new().to_string().to_lowercase();
        let base_commit = self.inner.repo.head()?;
        let branch = self.inner.repo.create_transaction_branch(&tx_id, base_commit)?;

        let tx = Transaction::new(self.inner.repo.clone(), tx_id.clone(), branch, base_commit);
        self.inner.active.write().insert(tx_id.clone(), tx.metadata.clone());

        debug!(%tx_id, base = %base_commit.short(), "transaction started");
        Ok(tx)
    }

    pub fn active_count(&self) -> usize {
        self.inner.active.read().len()
    }

    pub fn is_active(&self, tx_id: &str) -> bool {
        self.inner.active.read().contains_key(tx_id)
    }

    fn mark_completed(&self, tx_id: &str) {
        self.inner.active.write().remove(tx_id);
    }

    /// Commit a transaction; commits to `main` happen one at a time.
    pub fn commit_transaction(&self, tx: Transaction<TxActive>) -> TransactionResult<CommitId> {
        let _guard = self.inner.commit_lock.lock();
        let tx_id = tx.id().to_string();

        let result = tx.commit();
        self.mark_completed(&tx_id);

        match result {
            Ok(committed) => {
                debug!(%tx_id, head = %committed.final_commit().short(), "transaction committed");
                Ok(committed.final_commit())
            }
            Err(e) => {
                warn!(%tx_id, error = %e, "transaction commit failed");
                Err(e)
            }
        }
    }

    pub fn rollback_transaction(&self, tx: Transaction<TxActive>) {
        let tx_id = tx.id().to_string();
        tx.rollback();
        self.mark_completed(&tx_id);
        debug!(%tx_id, "transaction rolled back");
    }

    /// Remove `tx/` branches left over by dead processes.
    ///
    /// A branch is removed when no transaction of this manager owns it and
    /// it is older than [`ABANDONED_AFTER`]. Branches whose name carries no
    /// timestamp were not created here and are always removed.
    pub fn cleanup_abandoned(&self) -> TransactionResult<usize> {
        self.cleanup_older_than(ABANDONED_AFTER)
    }

    pub fn cleanup_older_than(&self, max_age: Duration) -> TransactionResult<usize> {
        let active_ids: HashSet<String> = self.inner.active.read().keys().cloned().collect();
        let branches = self.inner.repo.list_transaction_branches()?;
        let now = SystemTime::now();

        let mut cleaned = 0;
        for branch in branches {
            let Some(tx_id) = branch.transaction_id() else {
                continue;
            };
            if active_ids.contains(tx_id) {
                continue;
            }
            if let Some(started) = started_at(tx_id) {
                let age = now.duration_since(started).unwrap_or_default();
                if age < max_age {
                    debug!(%tx_id, ?age, "keeping recent transaction branch");
                    continue;
                }
            }
            match self.inner.repo.delete_transaction_branch(tx_id) {
                Ok(()) => cleaned += 1,
                Err(e) => warn!(%tx_id, error = %e, "could not remove abandoned transaction branch"),
            }
        }

        if cleaned > 0 {
            info!(cleaned, "removed abandoned transaction branches");
        }
        Ok(cleaned)
    }

    /// Run `f` inside a transaction.
    ///
    /// Commits when `f` returns `Ok`, rolls back when it returns `Err`. The
    /// caller's error type only needs to absorb [`TransactionError`].
    #[instrument(level = "trace", skip(self, f))]
    pub fn with_transaction<F, T, E>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut Transaction<TxActive>) -> Result<T, E>,
        E: From<TransactionError>,
    {
        let mut tx = self.begin()?;

        match f(&mut tx) {
            Ok(result) => {
                self.commit_transaction(tx)?;
                Ok(result)
            }
            Err(e) => {
                self.rollback_transaction(tx);
                Err(e)
            }
        }
    }

    /// Like [`with_transaction`](Self::with_transaction), but a commit that
    /// loses a race re-runs `f` on a fresh snapshot of `main`, up to
    /// `max_attempts` runs in total.
    #[instrument(level = "trace", skip(self, f))]
    pub fn with_retry<F, T, E>(&self, max_attempts: u32, mut f: F) -> Result<T, E>
    where
        F: FnMut(&mut Transaction<TxActive>) -> Result<T, E>,
        E: From<TransactionError>,
    {
        let mut attempt = 1;
        loop {
            let mut tx = self.begin()?;

            let result = match f(&mut tx) {
                Ok(result) => result,
                Err(e) => {
                    self.rollback_transaction(tx);
                    return Err(e);
                }
            };

            match self.commit_transaction(tx) {
                Ok(_) => return Ok(result),
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    debug!(attempt, error = %e, "retrying transaction");
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    pub fn head(&self) -> TransactionResult<CommitId> {
        self.inner.repo.head().map_err(TransactionError::from)
    }
}

impl std::fmt::Debug for TransactionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionManager")
            .field("active_count", &self.active_count())
            .finish()
    }
}
