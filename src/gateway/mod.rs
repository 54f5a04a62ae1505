//! Persistence gateway.
//!
//! The ordering engine never talks to a concrete store. It is handed a
//! [`Gateway`] and works through two narrow views of it:
//!
//! - [`RecordReader`] for reads, used by [`Gateway::read`]
//! - [`RecordStore`] for reads and writes, used by [`Gateway::transaction`]
//!
//! Two implementations ship with the crate: [`GitGateway`] persists every
//! committed change as a commit on `main`, [`MemoryGateway`] keeps tables in
//! process memory.

mod git;
mod memory;

pub use git::{GitGateway, DEFAULT_MAX_ATTEMPTS};
pub use memory::MemoryGateway;

use crate::storage::{Collection, RecordId, Row};
use crate::transaction::{TransactionError, TransactionResult};

/// Read access to stored records.
pub trait RecordReader {
    fn get(&self, collection: Collection, id: &RecordId) -> TransactionResult<Option<Row>>;

    /// Every record of a collection, in no particular order.
    fn scan(&self, collection: Collection) -> TransactionResult<Vec<Row>>;
}

/// Write access inside a transaction.
///
/// `insert` fails if the id is taken; `update` and `delete` fail if it is
/// missing. Writes are visible to later reads of the same transaction.
pub trait RecordStore: RecordReader {
    fn insert(&mut self, collection: Collection, row: Row) -> TransactionResult<()>;

    fn update(&mut self, collection: Collection, row: Row) -> TransactionResult<()>;

    fn delete(&mut self, collection: Collection, id: &RecordId) -> TransactionResult<()>;
}

/// An injected, transactional record store.
pub trait Gateway: Clone {
    /// Run `f` against the latest committed state.
    fn read<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&dyn RecordReader) -> Result<T, E>,
        E: From<TransactionError>;

    /// Run `f` in one transaction: committed if it returns `Ok`, discarded
    /// otherwise.
    ///
    /// An implementation may run `f` again on fresh state when its commit
    /// loses a race, so `f` must not act outside the store it is handed. A
    /// race still lost after the last attempt fails with
    /// [`TransactionError::Conflict`].
    fn transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnMut(&mut dyn RecordStore) -> Result<T, E>,
        E: From<TransactionError>;
}
