//! Refs the store relies on.
//!
//! `main` holds the committed state. Every open transaction owns a
//! `tx/<id>` branch; committing moves `main` onto it, and the branch is
//! deleted once the transaction ends.

use git2::{BranchType, ErrorCode, Repository};

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::types::{BranchName, CommitId};

pub(crate) fn tip(repo: &Repository, branch: &BranchName) -> StorageResult<CommitId> {
    repo.find_reference(&branch.as_ref_path())
        .and_then(|r| r.peel_to_commit())
        .map(|c| CommitId::new(c.id()))
        .map_err(|_| StorageError::RefNotFound(branch.to_string()))
}

/// Tip of the branch HEAD points at, which is always `main`.
pub(crate) fn head(repo: &Repository) -> StorageResult<CommitId> {
    match repo.head() {
        Ok(reference) => Ok(CommitId::new(reference.peel_to_commit()?.id())),
        Err(e) if e.code() == ErrorCode::UnbornBranch => Err(StorageError::EmptyRepository),
        Err(e) => Err(e.into()),
    }
}

/// Point HEAD at `main`, creating `main` at `root` first.
pub(crate) fn init_main(repo: &Repository, root: CommitId) -> StorageResult<()> {
    let main = BranchName::main();
    if repo.find_reference(&main.as_ref_path()).is_err() {
        repo.reference(&main.as_ref_path(), root.raw(), false, "init main")?;
    }
    repo.set_head(&main.as_ref_path())?;
    Ok(())
}

/// Unconditionally move `branch` to `target`.
pub(crate) fn set_tip(repo: &Repository, branch: &BranchName, target: CommitId) -> StorageResult<()> {
    let mut reference = repo
        .find_reference(&branch.as_ref_path())
        .map_err(|_| StorageError::RefNotFound(branch.to_string()))?;
    reference.set_target(target.raw(), &format!("{} -> {}", branch, target.short()))?;
    Ok(())
}

/// Move `main` from `expected` to `target` atomically.
///
/// Fails with `ConcurrentModification` if `main` no longer points at
/// `expected`.
pub(crate) fn advance_main(repo: &Repository, expected: CommitId, target: CommitId) -> StorageResult<()> {
    let main = BranchName::main();
    let message = format!("advance main {} -> {}", expected.short(), target.short());

    match repo.reference_matching(&main.as_ref_path(), target.raw(), true, expected.raw(), &message) {
        Ok(_) => Ok(()),
        Err(e) if e.code() == ErrorCode::Modified => Err(StorageError::ConcurrentModification {
            branch: main.to_string(),
        }),
        Err(e) => Err(e.into()),
    }
}

pub(crate) fn open_tx_branch(repo: &Repository, tx_id: &str, base: CommitId) -> StorageResult<BranchName> {
    let branch = BranchName::for_transaction(tx_id);
    let commit = repo.find_commit(base.raw())?;
    repo.branch(branch.as_str(), &commit, false).map_err(|e| {
        if e.code() == ErrorCode::Exists {
            StorageError::BranchAlreadyExists(branch.to_string())
        } else {
            e.into()
        }
    })?;
    Ok(branch)
}

pub(crate) fn close_tx_branch(repo: &Repository, tx_id: &str) -> StorageResult<()> {
    let branch = BranchName::for_transaction(tx_id);
    repo.find_branch(branch.as_str(), BranchType::Local)
        .map_err(|_| StorageError::RefNotFound(branch.to_string()))?
        .delete()?;
    Ok(())
}

/// Every `tx/*` branch, open or abandoned.
pub(crate) fn tx_branches(repo: &Repository) -> StorageResult<Vec<BranchName>> {
    let mut found = Vec::new();
    for entry in repo.branches(Some(BranchType::Local))? {
        let (branch, _) = entry?;
        if let Some(name) = branch.name()? {
            if let Ok(name) = BranchName::new(name) {
                if name.is_transaction_branch() {
                    found.push(name);
                }
            }
        }
    }
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::commit::CommitBuilder;
    use crate::storage::tree::create_initial_tree;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Repository, CommitId) {
        let dir = TempDir::new().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        let root = {
            let tree_id = create_initial_tree(&repo).unwrap();
            CommitBuilder::new(&repo).tree(tree_id).message("root").commit().unwrap()
        };
        init_main(&repo, root).unwrap();
        (dir, repo, root)
    }

    fn child_of(repo: &Repository, parent: CommitId) -> CommitId {
        let tree_id = create_initial_tree(repo).unwrap();
        CommitBuilder::new(repo)
            .tree(tree_id)
            .parent(parent)
            .message("next")
            .commit()
            .unwrap()
    }

    #[test]
    fn test_head_follows_main() {
        let (_dir, repo, root) = setup();
        assert_eq!(head(&repo).unwrap(), root);

        let next = child_of(&repo, root);
        set_tip(&repo, &BranchName::main(), next).unwrap();
        assert_eq!(head(&repo).unwrap(), next);
    }

    #[test]
    fn test_unborn_head_is_empty_repository() {
        let dir = TempDir::new().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        assert!(matches!(head(&repo), Err(StorageError::EmptyRepository)));
    }

    #[test]
    fn test_transaction_branch_lifecycle() {
        let (_dir, repo, root) = setup();

        let first = open_tx_branch(&repo, "tx001", root).unwrap();
        open_tx_branch(&repo, "tx002", root).unwrap();
        assert_eq!(first.transaction_id(), Some("tx001"));
        assert_eq!(tip(&repo, &first).unwrap(), root);
        assert_eq!(tx_branches(&repo).unwrap().len(), 2);
        assert!(matches!(
            open_tx_branch(&repo, "tx001", root),
            Err(StorageError::BranchAlreadyExists(_))
        ));

        close_tx_branch(&repo, "tx001").unwrap();
        assert_eq!(tx_branches(&repo).unwrap(), vec![BranchName::for_transaction("tx002")]);
        assert!(matches!(close_tx_branch(&repo, "tx001"), Err(StorageError::RefNotFound(_))));
    }

    #[test]
    fn test_advance_main_is_compare_and_swap() {
        let (_dir, repo, root) = setup();
        let next = child_of(&repo, root);

        advance_main(&repo, root, next).unwrap();
        assert_eq!(head(&repo).unwrap(), next);

        let stale = advance_main(&repo, root, child_of(&repo, root));
        assert!(matches!(stale, Err(StorageError::ConcurrentModification { .. })));
        assert_eq!(head(&repo).unwrap(), next);
    }
}
