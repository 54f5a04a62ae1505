//! Git-backed gateway.

use tracing::{debug, instrument};

use crate::gateway::{Gateway, RecordReader, RecordStore};
use crate::storage::{Collection, CommitId, GitRepository, RecordId, Row};
use crate::transaction::{Transaction, TransactionError, TransactionManager, TransactionResult, TxActive};

/// Runs of a unit of work before a lost race is reported as a conflict.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Gateway over a [`TransactionManager`].
///
/// Transactions read the snapshot of `main` taken at begin and publish by
/// fast-forwarding `main`; see [`Transaction::commit`]. When another write
/// lands on `main` first, the unit of work runs again on the new state.
#[derive(Debug, Clone)]
pub struct GitGateway {
    manager: TransactionManager,
    max_attempts: u32,
}

impl GitGateway {
    /// Wrap a repository, removing leftover transaction branches and
    /// creating any missing collection.
    #[instrument(level = "debug", skip(repo), fields(path = %repo.path().display()))]
    pub fn open(repo: GitRepository) -> TransactionResult<Self> {
        let manager = TransactionManager::new(repo);
        manager.cleanup_abandoned()?;

        manager.with_transaction(|tx| {
            for collection in Collection::ALL {
                if !tx.collection_exists(collection)? {
                    debug!(%collection, "creating collection");
                    tx.create_collection(collection)?;
                }
            }
            Ok::<_, TransactionError>(())
        })?;

        Ok(Self {
            manager,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        })
    }

    /// Cap the runs per unit of work; `1` reports every lost race.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn manager(&self) -> &TransactionManager {
        &self.manager
    }

    pub fn repo(&self) -> &GitRepository {
        self.manager.repo()
    }
}

/// Committed state at one commit.
struct Snapshot<'a> {
    repo: &'a GitRepository,
    at: CommitId,
}

impl RecordReader for Snapshot<'_> {
    fn get(&self, collection: Collection, id: &RecordId) -> TransactionResult<Option<Row>> {
        Ok(self.repo.read_record(collection, id, self.at)?)
    }

    fn scan(&self, collection: Collection) -> TransactionResult<Vec<Row>> {
        Ok(self.repo.scan_collection(collection, self.at)?)
    }
}

impl RecordReader for Transaction<TxActive> {
    fn get(&self, collection: Collection, id: &RecordId) -> TransactionResult<Option<Row>> {
        Transaction::read(self, collection, id)
    }

    fn scan(&self, collection: Collection) -> TransactionResult<Vec<Row>> {
        Transaction::scan(self, collection)
    }
}

impl RecordStore for Transaction<TxActive> {
    fn insert(&mut self, collection: Collection, row: Row) -> TransactionResult<()> {
        Transaction::insert(self, collection, row)
    }

    fn update(&mut self, collection: Collection, row: Row) -> TransactionResult<()> {
        Transaction::update(self, collection, row)
    }

    fn delete(&mut self, collection: Collection, id: &RecordId) -> TransactionResult<()> {
        Transaction::delete(self, collection, id)
    }
}

impl Gateway for GitGateway {
    fn read<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&dyn RecordReader) -> Result<T, E>,
        E: From<TransactionError>,
    {
        let at = self.manager.head()?;
        f(&Snapshot {
            repo: self.manager.repo(),
            at,
        })
    }

    fn transaction<T, E, F>(&self, mut f: F) -> Result<T, E>
    where
        F: FnMut(&mut dyn RecordStore) -> Result<T, E>,
        E: From<TransactionError>,
    {
        self.manager.with_retry(self.max_attempts, |tx| f(tx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn setup() -> (TempDir, GitGateway) {
        let dir = TempDir::new().unwrap();
        let repo = GitRepository::init(dir.path()).unwrap();
        (dir, GitGateway::open(repo).unwrap())
    }

    fn row(id: &str) -> Row {
        Row::from_value(RecordId::new(id).unwrap(), json!({"order_index": 1})).unwrap()
    }

    #[test]
    fn test_open_creates_collections_once() {
        let (dir, gateway) = setup();
        let head = gateway.repo().head().unwrap();
        assert_eq!(gateway.repo().list_collections(head).unwrap().len(), 2);

        let reopened = GitGateway::open(GitRepository::open(dir.path()).unwrap()).unwrap();
        assert_eq!(reopened.repo().head().unwrap(), head);
    }

    #[test]
    fn test_open_removes_abandoned_branches() {
        let (dir, gateway) = setup();
        let head = gateway.repo().head().unwrap();
        gateway.repo().create_transaction_branch("crashed", head).unwrap();

        let reopened = GitGateway::open(GitRepository::open(dir.path()).unwrap()).unwrap();
        assert!(reopened.repo().list_transaction_branches().unwrap().is_empty());
    }

    #[test]
    fn test_second_open_keeps_live_transaction() {
        let (dir, gateway) = setup();

        gateway
            .transaction(|tx| {
                tx.insert(Collection::Navigation, row("a"))?;
                let other = GitGateway::open(GitRepository::open(dir.path()).unwrap()).unwrap();
                assert_eq!(other.repo().list_transaction_branches().unwrap().len(), 1);
                tx.insert(Collection::Navigation, row("b"))
            })
            .unwrap();

        let head = gateway.repo().head().unwrap();
        assert_eq!(gateway.repo().scan_collection(Collection::Navigation, head).unwrap().len(), 2);
    }

    #[test]
    fn test_unrelated_write_does_not_fail_transaction() {
        let (_dir, gateway) = setup();
        let other = gateway.clone();
        let mut runs = 0;

        gateway
            .transaction(|tx| {
                runs += 1;
                let seen = tx.scan(Collection::Navigation)?.len();
                if runs == 1 {
                    other.transaction(|o| o.insert(Collection::ContentBlocks, row("hero")))?;
                }
                tx.insert(Collection::Navigation, row(&format!("item{}", seen)))
            })
            .unwrap();

        assert_eq!(runs, 2);
        let head = gateway.repo().head().unwrap();
        assert_eq!(gateway.repo().scan_collection(Collection::Navigation, head).unwrap().len(), 1);
        assert_eq!(gateway.repo().scan_collection(Collection::ContentBlocks, head).unwrap().len(), 1);
    }

    #[test]
    fn test_single_attempt_reports_conflict() {
        let (_dir, gateway) = setup();
        let gateway = gateway.with_max_attempts(1);
        let other = gateway.clone();

        let result: TransactionResult<()> = gateway.transaction(|tx| {
            tx.insert(Collection::Navigation, row("home"))?;
            other.transaction(|o| o.insert(Collection::ContentBlocks, row("hero")))
        });

        assert!(matches!(result, Err(TransactionError::Conflict { .. })));
    }

    #[test]
    fn test_transaction_commits_on_ok() {
        let (_dir, gateway) = setup();
        gateway
            .transaction(|tx| tx.insert(Collection::Navigation, row("home")))
            .unwrap();

        let found: TransactionResult<Option<Row>> =
            gateway.read(|r| r.get(Collection::Navigation, &RecordId::new("home").unwrap()));
        assert!(found.unwrap().is_some());
    }

    #[test]
    fn test_transaction_discards_on_err() {
        let (_dir, gateway) = setup();
        let head = gateway.repo().head().unwrap();

        let result: TransactionResult<()> = gateway.transaction(|tx| {
            tx.insert(Collection::ContentBlocks, row("hero"))?;
            tx.insert(Collection::ContentBlocks, row("hero"))
        });

        assert!(result.is_err());
        assert_eq!(gateway.repo().head().unwrap(), head);
    }
}
