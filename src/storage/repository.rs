//! Core Git repository wrapper.
//!
//! This is the central component of the storage layer. It wraps
//! `git2::Repository` behind a mutex and exposes record-level operations
//! that each produce a new commit on top of a given parent.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use git2::Repository;
use parking_lot::Mutex;

use crate::storage::blob::{self, Row};
use crate::storage::commit::{self, CommitBuilder, CommitInfo, CommitMessage};
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::refs;
use crate::storage::tree::TreeMutator;
use crate::storage::types::{BranchName, Collection, CommitId, GitSignature, RecordId};

/// Thread-safe handle to the store's Git repository.
///
/// Cheap to clone; clones share the same underlying repository.
#[derive(Clone)]
pub struct GitRepository {
    inner: Arc<GitRepositoryInner>,
}

struct GitRepositoryInner {
    repo: Mutex<Repository>,
    path: PathBuf,
    signature: GitSignature,
}

impl GitRepository {
    /// Open an existing repository.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        Self::open_with_signature(path, GitSignature::cmsdb())
    }

    pub fn open_with_signature(path: impl AsRef<Path>, signature: GitSignature) -> StorageResult<Self> {
        let path = path.as_ref();
        let repo = Repository::open(path).map_err(|_| StorageError::NotInitialized(path.to_path_buf()))?;
        Ok(Self::wrap(repo, path, signature))
    }

    /// Initialize a new repository with an empty root commit on `main`.
    pub fn init(path: impl AsRef<Path>) -> StorageResult<Self> {
        Self::init_with_signature(path, GitSignature::cmsdb())
    }

    pub fn init_with_signature(path: impl AsRef<Path>, signature: GitSignature) -> StorageResult<Self> {
        let path = path.as_ref();
        let storage = Self::wrap(Repository::init(path)?, path, signature);

        storage.with_repo(|repo| {
            let commit_id = commit::create_initial_commit(repo, &storage.inner.signature)?;
            refs::init_main(repo, commit_id)
        })?;

        Ok(storage)
    }

    /// Open the repository at `path`, initializing it first if needed.
    pub fn open_or_init(path: impl AsRef<Path>, signature: GitSignature) -> StorageResult<Self> {
        let path = path.as_ref();
        if path.join(".git").exists() {
            Self::open_with_signature(path, signature)
        } else {
            Self::init_with_signature(path, signature)
        }
    }

    fn wrap(repo: Repository, path: &Path, signature: GitSignature) -> Self {
        Self {
            inner: Arc::new(GitRepositoryInner {
                repo: Mutex::new(repo),
                path: path.to_path_buf(),
                signature,
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Run `f` with exclusive access to the repository.
    pub fn with_repo<F, T>(&self, f: F) -> StorageResult<T>
    where
        F: FnOnce(&Repository) -> StorageResult<T>,
    {
        let repo = self.inner.repo.lock();
        f(&repo)
    }

    /// stage one change on top of `at` and commit it
    fn commit_change<F>(&self, at: CommitId, message: String, stage: F) -> StorageResult<CommitId>
    where
        F: FnOnce(&Repository, &mut TreeMutator<'_>) -> StorageResult<()>,
    {
        self.with_repo(|repo| {
            let tree = commit::get_tree_at_commit(repo, at)?;
            let mut mutator = TreeMutator::from_tree(repo, &tree)?;
            stage(repo, &mut mutator)?;
            let new_tree_id = mutator.write()?;

            CommitBuilder::new(repo)
                .tree(new_tree_id)
                .parent(at)
                .message(message)
                .signature(self.inner.signature.clone())
                .commit()
        })
    }

    // ==================== History ====================

    /// Current tip of `main`.
    pub fn head(&self) -> StorageResult<CommitId> {
        self.with_repo(refs::head)
    }

    pub fn history(&self, from: CommitId, limit: Option<usize>) -> StorageResult<Vec<CommitInfo>> {
        self.with_repo(|repo| {
            let iter = commit::history(repo, from)?;
            match limit {
                Some(n) => iter.take(n).collect(),
                None => iter.collect(),
            }
        })
    }

    // ==================== Collections ====================

    pub fn list_collections(&self, at: CommitId) -> StorageResult<Vec<Collection>> {
        self.with_repo(|repo| Ok(commit::get_tree_at_commit(repo, at)?.list_collections()))
    }

    pub fn collection_exists(&self, collection: Collection, at: CommitId) -> StorageResult<bool> {
        self.with_repo(|repo| Ok(commit::get_tree_at_commit(repo, at)?.collection_exists(collection)))
    }

    pub fn create_collection(
        &self,
        collection: Collection,
        at: CommitId,
        tx_id: Option<&str>,
    ) -> StorageResult<CommitId> {
        let message = CommitMessage::create_collection(collection, tx_id);
        self.commit_change(at, message, |_, mutator| mutator.create_collection(collection))
    }

    // ==================== Records ====================

    pub fn read_record(&self, collection: Collection, id: &RecordId, at: CommitId) -> StorageResult<Option<Row>> {
        self.with_repo(|repo| {
            let tree = commit::get_tree_at_commit(repo, at)?;
            let Some(blob_id) = tree.get_record_blob_id(repo, collection, id)? else {
                return Ok(None);
            };

            let bytes = blob::read_blob(repo, blob_id)?;
            Ok(Some(blob::deserialize_row(&bytes, id)?))
        })
    }

    /// Read every record of a collection.
    pub fn scan_collection(&self, collection: Collection, at: CommitId) -> StorageResult<Vec<Row>> {
        self.with_repo(|repo| {
            let tree = commit::get_tree_at_commit(repo, at)?;
            let ids = tree.list_records(repo, collection)?;

            let mut rows = Vec::with_capacity(ids.len());
            for id in ids {
                let blob_id = tree
                    .get_record_blob_id(repo, collection, &id)?
                    .ok_or_else(|| StorageError::RecordNotFound {
                        collection,
                        id: id.clone(),
                    })?;
                let bytes = blob::read_blob(repo, blob_id)?;
                rows.push(blob::deserialize_row(&bytes, &id)?);
            }

            Ok(rows)
        })
    }

    /// Insert a record; fails if the id is taken.
    pub fn insert_record(
        &self,
        collection: Collection,
        row: Row,
        at: CommitId,
        tx_id: Option<&str>,
    ) -> StorageResult<CommitId> {
        let message = CommitMessage::insert(collection, &row.id, tx_id);
        self.commit_change(at, message, |repo, mutator| {
            let tree = commit::get_tree_at_commit(repo, at)?;
            if tree.record_exists(repo, collection, &row.id)? {
                return Err(StorageError::RecordAlreadyExists {
                    collection,
                    id: row.id.clone(),
                });
            }

            let blob_id = blob::write_blob(repo, &row)?;
            mutator.upsert_record(collection, &row.id, blob_id)
        })
    }

    /// Replace an existing record; fails if it is missing.
    pub fn update_record(
        &self,
        collection: Collection,
        row: Row,
        at: CommitId,
        tx_id: Option<&str>,
    ) -> StorageResult<CommitId> {
        let message = CommitMessage::update(collection, &row.id, tx_id);
        self.commit_change(at, message, |repo, mutator| {
            let tree = commit::get_tree_at_commit(repo, at)?;
            if !tree.record_exists(repo, collection, &row.id)? {
                return Err(StorageError::RecordNotFound {
                    collection,
                    id: row.id.clone(),
                });
            }

            let blob_id = blob::write_blob(repo, &row)?;
            mutator.upsert_record(collection, &row.id, blob_id)
        })
    }

    pub fn delete_record(
        &self,
        collection: Collection,
        id: &RecordId,
        at: CommitId,
        tx_id: Option<&str>,
    ) -> StorageResult<CommitId> {
        let message = CommitMessage::delete(collection, id, tx_id);
        self.commit_change(at, message, |_, mutator| mutator.delete_record(collection, id))
    }

    // ==================== Branches ====================

    pub fn update_branch(&self, branch: &BranchName, target: CommitId) -> StorageResult<()> {
        self.with_repo(|repo| refs::set_tip(repo, branch, target))
    }

    pub fn create_transaction_branch(&self, tx_id: &str, base: CommitId) -> StorageResult<BranchName> {
        self.with_repo(|repo| refs::open_tx_branch(repo, tx_id, base))
    }

    pub fn delete_transaction_branch(&self, tx_id: &str) -> StorageResult<()> {
        self.with_repo(|repo| refs::close_tx_branch(repo, tx_id))
    }

    pub fn list_transaction_branches(&self) -> StorageResult<Vec<BranchName>> {
        self.with_repo(refs::tx_branches)
    }

    /// Fast-forward `main` to a transaction branch.
    ///
    /// Only succeeds if `main` still points at `expected_main`.
    pub fn fast_forward_main(&self, tx_branch: &BranchName, expected_main: CommitId) -> StorageResult<CommitId> {
        self.with_repo(|repo| {
            let tx_commit = refs::tip(repo, tx_branch)?;
            refs::advance_main(repo, expected_main, tx_commit)?;
            Ok(tx_commit)
        })
    }

    /// Paths changed both on the transaction branch and on `main` since they diverged.
    pub fn detect_conflicts(&self, tx_branch: &BranchName, main_head: CommitId) -> StorageResult<Vec<PathBuf>> {
        self.with_repo(|repo| {
            let tx_commit = refs::tip(repo, tx_branch)?;
            commit::detect_conflicts(repo, tx_commit, main_head)
        })
    }

    // ==================== Statistics ====================

    pub fn stats(&self, at: CommitId) -> StorageResult<RepositoryStats> {
        self.with_repo(|repo| {
            let tree = commit::get_tree_at_commit(repo, at)?;

            let mut navigation_items = 0;
            let mut content_blocks = 0;
            for collection in tree.list_collections() {
                let count = tree.list_records(repo, collection)?.len();
                match collection {
                    Collection::Navigation => navigation_items = count,
                    Collection::ContentBlocks => content_blocks = count,
                }
            }

            let commits = commit::history(repo, at)?.count();
            let open_transactions = refs::tx_branches(repo)?.len();

            Ok(RepositoryStats {
                navigation_items,
                content_blocks,
                commits,
                open_transactions,
            })
        })
    }
}

impl std::fmt::Debug for GitRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitRepository").field("path", &self.inner.path).finish()
    }
}

/// Record counts and repository bookkeeping at one commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryStats {
    pub navigation_items: usize,
    pub content_blocks: usize,
    pub commits: usize,
    pub open_transactions: usize,
}

impl std::fmt::Display for RepositoryStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Content store statistics:")?;
        writeln!(f, "  Navigation items: {}", self.navigation_items)?;
        writeln!(f, "  Content blocks: {}", self.content_blocks)?;
        writeln!(f, "  Commits: {}", self.commits)?;
        write!(f, "  Open transactions: {}", self.open_transactions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn setup() -> (TempDir, GitRepository, CommitId) {
        let dir = TempDir::new().unwrap();
        let repo = GitRepository::init(dir.path()).unwrap();
        let head = repo.head().unwrap();
        let head = repo.create_collection(Collection::Navigation, head, None).unwrap();
        (dir, repo, head)
    }

    fn row(id: &str, order_index: i64) -> Row {
        Row::from_value(RecordId::new(id).unwrap(), json!({"order_index": order_index})).unwrap()
    }

    #[test]
    fn test_init_and_open() {
        let dir = TempDir::new().unwrap();
        let head1 = GitRepository::init(dir.path()).unwrap().head().unwrap();

        let reopened = GitRepository::open_or_init(dir.path(), GitSignature::cmsdb()).unwrap();
        assert_eq!(reopened.head().unwrap(), head1);
    }

    #[test]
    fn test_open_missing_repository() {
        let dir = TempDir::new().unwrap();
        let result = GitRepository::open(dir.path().join("nope"));
        assert!(matches!(result, Err(StorageError::NotInitialized(_))));
    }

    #[test]
    fn test_record_crud() {
        let (_dir, repo, head) = setup();
        let id = RecordId::new("home").unwrap();

        let head = repo.insert_record(Collection::Navigation, row("home", 1), head, None).unwrap();
        let stored = repo.read_record(Collection::Navigation, &id, head).unwrap().unwrap();
        assert_eq!(stored.get("order_index"), Some(&json!(1)));

        let mut fields = BTreeMap::new();
        fields.insert("order_index".to_string(), json!(4));
        let head = repo
            .update_record(Collection::Navigation, stored.with_fields(fields), head, None)
            .unwrap();
        let stored = repo.read_record(Collection::Navigation, &id, head).unwrap().unwrap();
        assert_eq!(stored.version, 2);
        assert_eq!(stored.get("order_index"), Some(&json!(4)));

        let head = repo.delete_record(Collection::Navigation, &id, head, None).unwrap();
        assert!(repo.read_record(Collection::Navigation, &id, head).unwrap().is_none());
    }

    #[test]
    fn test_insert_duplicate_fails() {
        let (_dir, repo, head) = setup();
        let head = repo.insert_record(Collection::Navigation, row("home", 1), head, None).unwrap();

        let result = repo.insert_record(Collection::Navigation, row("home", 2), head, None);
        assert!(matches!(result, Err(StorageError::RecordAlreadyExists { .. })));
    }

    #[test]
    fn test_update_and_delete_missing_fail() {
        let (_dir, repo, head) = setup();
        let ghost = RecordId::new("ghost").unwrap();

        let update = repo.update_record(Collection::Navigation, row("ghost", 1), head, None);
        assert!(matches!(update, Err(StorageError::RecordNotFound { .. })));

        let delete = repo.delete_record(Collection::Navigation, &ghost, head, None);
        assert!(matches!(delete, Err(StorageError::RecordNotFound { .. })));
    }

    #[test]
    fn test_scan_collection() {
        let (_dir, repo, mut head) = setup();
        for i in 0..4 {
            head = repo
                .insert_record(Collection::Navigation, row(&format!("item{}", i), i), head, None)
                .unwrap();
        }

        assert_eq!(repo.scan_collection(Collection::Navigation, head).unwrap().len(), 4);
        let missing = repo.scan_collection(Collection::ContentBlocks, head);
        assert!(matches!(missing, Err(StorageError::CollectionNotFound(_))));
    }

    #[test]
    fn test_writes_do_not_move_main() {
        let (_dir, repo, head) = setup();
        let main_before = repo.head().unwrap();

        repo.insert_record(Collection::Navigation, row("home", 1), head, None).unwrap();
        assert_eq!(repo.head().unwrap(), main_before);
    }

    #[test]
    fn test_fast_forward_and_concurrent_modification() {
        let (_dir, repo, head) = setup();
        let main = repo.head().unwrap();

        let branch = repo.create_transaction_branch("tx001", main).unwrap();
        repo.update_branch(&branch, head).unwrap();
        repo.fast_forward_main(&branch, main).unwrap();
        assert_eq!(repo.head().unwrap(), head);

        let stale = repo.create_transaction_branch("tx002", main).unwrap();
        let result = repo.fast_forward_main(&stale, main);
        assert!(matches!(result, Err(StorageError::ConcurrentModification { .. })));
    }

    #[test]
    fn test_history_and_stats() {
        let (_dir, repo, head) = setup();
        let head = repo.insert_record(Collection::Navigation, row("home", 1), head, None).unwrap();

        let history = repo.history(head, Some(10)).unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].id, head);
        assert!(history[0].summary().starts_with("[INSERT] navigation_items/home"));

        let stats = repo.stats(head).unwrap();
        assert_eq!(stats.navigation_items, 1);
        assert_eq!(stats.content_blocks, 0);
        assert_eq!(stats.commits, 3);
    }
}
