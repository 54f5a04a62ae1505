//! Commit creation and history traversal.
//!
//! Every write to the store is a commit. Transactions stack their commits on
//! a `tx/` branch; conflict detection compares what two lines of history
//! touched since their common ancestor.

use std::collections::HashSet;
use std::path::PathBuf;

use chrono::{DateTime, TimeZone, Utc};
use git2::{Delta, DiffOptions, Repository, Revwalk, Sort};

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::tree::TreeHandle;
use crate::storage::types::{Change, ChangeStatus, Collection, CommitId, GitSignature, RecordId, TreeId};

/// information about a commit
#[derive(Debug, Clone)]
pub struct CommitInfo {
    pub id: CommitId,
    pub tree_id: TreeId,
    pub parent_ids: Vec<CommitId>,
    pub message: String,
    pub author_name: String,
    pub timestamp: DateTime<Utc>,
}

impl CommitInfo {
    pub(crate) fn from_git2(commit: &git2::Commit<'_>) -> Self {
        let timestamp = Utc
            .timestamp_opt(commit.time().seconds(), 0)
            .single()
            .unwrap_or_else(Utc::now);

        Self {
            id: CommitId::new(commit.id()),
            tree_id: TreeId::new(commit.tree_id()),
            parent_ids: commit.parent_ids().map(CommitId::new).collect(),
            message: commit.message().unwrap_or("").to_string(),
            author_name: commit.author().name().unwrap_or("unknown").to_string(),
            timestamp,
        }
    }

    /// first line of the message
    pub fn summary(&self) -> &str {
        self.message.lines().next().unwrap_or(&self.message)
    }
}

/// builder for creating commits with a fluent interface
pub struct CommitBuilder<'a> {
    repo: &'a Repository,
    tree_id: Option<TreeId>,
    parents: Vec<CommitId>,
    message: String,
    signature: GitSignature,
    update_ref: Option<String>,
}

impl<'a> CommitBuilder<'a> {
    pub fn new(repo: &'a Repository) -> Self {
        Self {
            repo,
            tree_id: None,
            parents: Vec::new(),
            message: String::new(),
            signature: GitSignature::cmsdb(),
            update_ref: None,
        }
    }

    pub fn tree(mut self, tree_id: TreeId) -> Self {
        self.tree_id = Some(tree_id);
        self
    }

    pub fn parent(mut self, parent: CommitId) -> Self {
        self.parents.push(parent);
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn signature(mut self, signature: GitSignature) -> Self {
        self.signature = signature;
        self
    }

    /// update a ref (branch) to point to this commit
    pub fn update_ref(mut self, refname: impl Into<String>) -> Self {
        self.update_ref = Some(refname.into());
        self
    }

    pub fn commit(self) -> StorageResult<CommitId> {
        let tree_id = self
            .tree_id
            .ok_or_else(|| StorageError::Internal("commit requires a tree".to_string()))?;

        let tree = self.repo.find_tree(tree_id.raw())?;
        let sig = self.signature.to_git2_signature()?;

        let parent_commits: Vec<git2::Commit<'_>> = self
            .parents
            .iter()
            .map(|id| self.repo.find_commit(id.raw()))
            .collect::<Result<_, _>>()?;
        let parent_refs: Vec<&git2::Commit<'_>> = parent_commits.iter().collect();

        let oid = self.repo.commit(
            self.update_ref.as_deref(),
            &sig,
            &sig,
            &self.message,
            &tree,
            &parent_refs,
        )?;

        Ok(CommitId::new(oid))
    }
}

/// get the tree snapshot at a specific commit
pub fn get_tree_at_commit(repo: &Repository, commit_id: CommitId) -> StorageResult<TreeHandle<'_>> {
    let commit = repo
        .find_commit(commit_id.raw())
        .map_err(|_| StorageError::CommitNotFound(commit_id.to_string()))?;

    Ok(TreeHandle::new(commit.tree()?))
}

/// create the root commit of a new store and point HEAD at it
pub fn create_initial_commit(repo: &Repository, signature: &GitSignature) -> StorageResult<CommitId> {
    let tree_id = crate::storage::tree::create_initial_tree(repo)?;

    CommitBuilder::new(repo)
        .tree(tree_id)
        .message("[cmsdb] Initialize content store")
        .signature(signature.clone())
        .update_ref("HEAD")
        .commit()
}

/// paths changed between two commits
pub fn diff_commits(repo: &Repository, old: CommitId, new: CommitId) -> StorageResult<Vec<Change>> {
    let old_tree = repo.find_commit(old.raw())?.tree()?;
    let new_tree = repo.find_commit(new.raw())?.tree()?;

    let mut opts = DiffOptions::new();
    let diff = repo.diff_tree_to_tree(Some(&old_tree), Some(&new_tree), Some(&mut opts))?;

    let changes = diff
        .deltas()
        .map(|delta| {
            let path = delta
                .new_file()
                .path()
                .or_else(|| delta.old_file().path())
                .map(PathBuf::from)
                .unwrap_or_default();

            let status = match delta.status() {
                Delta::Added => ChangeStatus::Added,
                Delta::Deleted => ChangeStatus::Deleted,
                Delta::Modified => ChangeStatus::Modified,
                Delta::Renamed => ChangeStatus::Renamed,
                Delta::Copied => ChangeStatus::Copied,
                _ => ChangeStatus::Other,
            };

            Change { path, status }
        })
        .collect();

    Ok(changes)
}

/// common ancestor of two commits, if any
pub fn find_merge_base(repo: &Repository, a: CommitId, b: CommitId) -> StorageResult<Option<CommitId>> {
    match repo.merge_base(a.raw(), b.raw()) {
        Ok(oid) => Ok(Some(CommitId::new(oid))),
        Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(None),
        Err(e) => Err(StorageError::Git(e)),
    }
}

/// newest-first walk over history
pub struct HistoryIterator<'repo> {
    repo: &'repo Repository,
    revwalk: Revwalk<'repo>,
}

impl<'repo> HistoryIterator<'repo> {
    pub fn new(repo: &'repo Repository, start: CommitId) -> StorageResult<Self> {
        let mut revwalk = repo.revwalk()?;
        revwalk.push(start.raw())?;
        revwalk.set_sorting(Sort::TIME | Sort::TOPOLOGICAL)?;

        Ok(Self { repo, revwalk })
    }
}

impl<'repo> Iterator for HistoryIterator<'repo> {
    type Item = StorageResult<CommitInfo>;

    fn next(&mut self) -> Option<Self::Item> {
        let oid = match self.revwalk.next()? {
            Ok(oid) => oid,
            Err(e) => return Some(Err(StorageError::Git(e))),
        };

        Some(
            self.repo
                .find_commit(oid)
                .map(|commit| CommitInfo::from_git2(&commit))
                .map_err(StorageError::Git),
        )
    }
}

pub fn history(repo: &Repository, start: CommitId) -> StorageResult<HistoryIterator<'_>> {
    HistoryIterator::new(repo, start)
}

/// Paths touched on both lines of history since their merge base.
pub fn detect_conflicts(repo: &Repository, ours: CommitId, theirs: CommitId) -> StorageResult<Vec<PathBuf>> {
    let base = find_merge_base(repo, ours, theirs)?.ok_or_else(|| {
        StorageError::Internal("no common ancestor found for conflict detection".to_string())
    })?;

    let our_changes = diff_commits(repo, base, ours)?;
    let their_changes = diff_commits(repo, base, theirs)?;

    let our_paths: HashSet<_> = our_changes.iter().map(|c| &c.path).collect();

    Ok(their_changes
        .iter()
        .filter(|c| our_paths.contains(&c.path))
        .map(|c| c.path.clone())
        .collect())
}

/// Commit message formats. The `tx:` suffix ties a commit to its transaction.
pub struct CommitMessage;

impl CommitMessage {
    fn with_tx(body: String, tx_id: Option<&str>) -> String {
        match tx_id {
            Some(id) => format!("{} tx:{}", body, id),
            None => body,
        }
    }

    pub fn insert(collection: Collection, id: &RecordId, tx_id: Option<&str>) -> String {
        Self::with_tx(format!("[INSERT] {}/{}", collection, id), tx_id)
    }

    pub fn update(collection: Collection, id: &RecordId, tx_id: Option<&str>) -> String {
        Self::with_tx(format!("[UPDATE] {}/{}", collection, id), tx_id)
    }

    pub fn delete(collection: Collection, id: &RecordId, tx_id: Option<&str>) -> String {
        Self::with_tx(format!("[DELETE] {}/{}", collection, id), tx_id)
    }

    pub fn create_collection(collection: Collection, tx_id: Option<&str>) -> String {
        Self::with_tx(format!("[CREATE COLLECTION] {}", collection), tx_id)
    }
}
