//! Database API - the on-disk content store.

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use thiserror::Error;
use tracing::{info, instrument};

use crate::db::content::ContentBlocks;
use crate::db::navigation::NavigationTree;
use crate::gateway::GitGateway;
use crate::ordering::{EngineError, OrderingOptions};
use crate::storage::{CommitInfo, GitRepository, GitSignature, RepositoryStats, StorageError};
use crate::transaction::TransactionError;

/// Result type for database operations.
pub type DatabaseResult<T> = Result<T, DatabaseError>;

/// Database errors.
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("transaction error: {0}")]
    Transaction(#[from] TransactionError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("invalid command: {0}")]
    InvalidCommand(String),

    #[error("database not found: {0}")]
    NotFound(PathBuf),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Database configuration options.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Path to the database directory.
    pub path: PathBuf,
    /// Create if doesn't exist.
    pub create_if_missing: bool,
    /// Author and committer of every commit.
    pub signature: GitSignature,
    pub ordering: OrderingOptions,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(".cmsdb"),
            create_if_missing: true,
            signature: GitSignature::cmsdb(),
            ordering: OrderingOptions::default(),
        }
    }
}

impl DatabaseConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    pub fn signature(mut self, signature: GitSignature) -> Self {
        self.signature = signature;
        self
    }

    pub fn ordering(mut self, ordering: OrderingOptions) -> Self {
        self.ordering = ordering;
        self
    }
}

/// The main database handle.
///
/// Cheap to hand out stores from: [`navigation`](Self::navigation) and
/// [`content`](Self::content) share the underlying repository.
#[derive(Debug)]
pub struct Database {
    config: DatabaseConfig,
    gateway: GitGateway,
    // keeps the directory of `in_memory` databases alive
    _temp: Option<TempDir>,
}

impl Database {
    /// Open or create a database at the given path.
    pub fn open(path: impl AsRef<Path>) -> DatabaseResult<Self> {
        Self::open_with_config(DatabaseConfig::new(path.as_ref()))
    }

    #[instrument(level = "debug", skip(config), fields(path = %config.path.display()))]
    pub fn open_with_config(config: DatabaseConfig) -> DatabaseResult<Self> {
        let repo = if config.create_if_missing {
            GitRepository::open_or_init(&config.path, config.signature.clone())?
        } else if config.path.exists() {
            GitRepository::open_with_signature(&config.path, config.signature.clone())?
        } else {
            return Err(DatabaseError::NotFound(config.path.clone()));
        };

        let gateway = GitGateway::open(repo)?;
        info!(path = %config.path.display(), "database opened");

        Ok(Self {
            config,
            gateway,
            _temp: None,
        })
    }

    /// A database in a temporary directory, removed on drop.
    pub fn in_memory() -> DatabaseResult<Self> {
        let dir = TempDir::new()?;
        let mut db = Self::open(dir.path())?;
        db._temp = Some(dir);
        Ok(db)
    }

    pub fn navigation(&self) -> NavigationTree<GitGateway> {
        NavigationTree::with_options(self.gateway.clone(), self.config.ordering)
    }

    pub fn content(&self) -> ContentBlocks<GitGateway> {
        ContentBlocks::new(self.gateway.clone())
    }

    pub fn gateway(&self) -> &GitGateway {
        &self.gateway
    }

    /// Commits on `main`, newest first.
    pub fn history(&self, limit: Option<usize>) -> DatabaseResult<Vec<CommitInfo>> {
        let repo = self.gateway.repo();
        Ok(repo.history(repo.head()?, limit)?)
    }

    pub fn stats(&self) -> DatabaseResult<RepositoryStats> {
        let repo = self.gateway.repo();
        Ok(repo.stats(repo.head()?)?)
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }
}
