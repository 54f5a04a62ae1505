//! Transaction management for cmsdb.
//!
//! Each transaction gets its own branch (`tx/{ulid}`) where changes accumulate.
//! On commit, `main` is fast-forwarded to the branch; on rollback, the branch
//! is deleted. A transaction whose base is no longer the tip of `main` fails
//! to commit and can be retried from scratch.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   TransactionManager                        │
//! │  (Coordinates transactions, tracks active tx, serializes)   │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//!                       ┌─────────────┐
//!                       │ Transaction │
//!                       │  (Context)  │
//!                       └─────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use cmsdb::transaction::TransactionManager;
//!
//! let manager = TransactionManager::new(repo);
//!
//! manager.with_transaction(|tx| {
//!     tx.insert(Collection::Navigation, row)?;
//!     tx.update(Collection::Navigation, other)?;
//!     Ok(())
//! })?;
//! ```

mod context;
mod error;
mod manager;

pub use context::{Transaction, TransactionMetadata, TxAborted, TxActive, TxCommitted};
pub use error::{TransactionError, TransactionResult};
pub use manager::TransactionManager;
