//! storage layer for cmsdb
//!
//! this module provides a complete abstraction over git for record storage.
//! The upper layers (transaction manager, gateway) use this API and never
//! touch git2 directly.
//!
//!  # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     GitRepository                           │
//! │ (High-level API: collections, records, branches, history)   │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!        ┌─────────────────────┼─────────────────────┐
//!        │                     │                     │
//!        ▼                     ▼                     ▼
//!  ┌─────────────┐       ┌─────────────┐       ┌─────────────┐
//!  │    tree     │       │    blob     │       │    refs     │
//!  │(collections)│       │  (records)  │       │ (branches)  │
//!  └─────────────┘       └─────────────┘       └─────────────┘
//!         │                     │                     │
//!         └─────────────────────┼─────────────────────┘
//!                               │
//!                               ▼
//!                        ┌─────────────┐
//!                        │   commit    │
//!                        │  (history)  │
//!                        └─────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use cmsdb::storage::{Collection, GitRepository, GitSignature, RecordId, Row};
//!
//! let repo = GitRepository::open_or_init("./content", GitSignature::cmsdb())?;
//! let head = repo.head()?;
//!
//! let head = repo.create_collection(Collection::Navigation, head, None)?;
//!
//! let id = RecordId::generate();
//! let row = Row::from_value(id.clone(), json!({"label": "Home", "order_index": 1}))?;
//! let head = repo.insert_record(Collection::Navigation, row, head, None)?;
//!
//! let home = repo.read_record(Collection::Navigation, &id, head)?;
//! ```

mod blob;
mod commit;
mod error;
mod refs;
mod repository;
mod tree;
mod types;

pub use blob::Row;
pub use commit::{CommitInfo, CommitMessage};
pub use error::{StorageError, StorageResult};
pub use repository::{GitRepository, RepositoryStats};
pub use types::{
    BlobId, BranchName, Change, ChangeStatus, Collection, CommitId, GitSignature, InvalidNameError, RecordId,
    RecordPath, TreeId,
};
