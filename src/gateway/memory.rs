//! In-memory gateway.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::gateway::{Gateway, RecordReader, RecordStore};
use crate::storage::{Collection, RecordId, Row, StorageError};
use crate::transaction::{TransactionError, TransactionResult};

type Tables = BTreeMap<Collection, BTreeMap<RecordId, Row>>;

fn empty_tables() -> Tables {
    Collection::ALL.into_iter().map(|c| (c, BTreeMap::new())).collect()
}

/// Gateway keeping every collection in process memory.
///
/// Transactions are serialized by one mutex and run against a working copy
/// that replaces the live tables only when the unit of work succeeds.
#[derive(Debug, Clone)]
pub struct MemoryGateway {
    tables: Arc<Mutex<Tables>>,
}

impl Default for MemoryGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self {
            tables: Arc::new(Mutex::new(empty_tables())),
        }
    }

    /// Number of stored records in a collection.
    pub fn len(&self, collection: Collection) -> usize {
        self.tables.lock().get(&collection).map_or(0, BTreeMap::len)
    }

    pub fn is_empty(&self) -> bool {
        self.tables.lock().values().all(BTreeMap::is_empty)
    }
}

struct MemoryTx<'a> {
    tables: &'a mut Tables,
}

fn table(tables: &Tables, collection: Collection) -> TransactionResult<&BTreeMap<RecordId, Row>> {
    tables
        .get(&collection)
        .ok_or(TransactionError::Storage(StorageError::CollectionNotFound(collection)))
}

impl RecordReader for Tables {
    fn get(&self, collection: Collection, id: &RecordId) -> TransactionResult<Option<Row>> {
        Ok(table(self, collection)?.get(id).cloned())
    }

    fn scan(&self, collection: Collection) -> TransactionResult<Vec<Row>> {
        Ok(table(self, collection)?.values().cloned().collect())
    }
}

impl MemoryTx<'_> {
    fn table_mut(&mut self, collection: Collection) -> TransactionResult<&mut BTreeMap<RecordId, Row>> {
        self.tables
            .get_mut(&collection)
            .ok_or(TransactionError::Storage(StorageError::CollectionNotFound(collection)))
    }
}

impl RecordReader for MemoryTx<'_> {
    fn get(&self, collection: Collection, id: &RecordId) -> TransactionResult<Option<Row>> {
        RecordReader::get(&*self.tables, collection, id)
    }

    fn scan(&self, collection: Collection) -> TransactionResult<Vec<Row>> {
        RecordReader::scan(&*self.tables, collection)
    }
}

impl RecordStore for MemoryTx<'_> {
    fn insert(&mut self, collection: Collection, row: Row) -> TransactionResult<()> {
        let table = self.table_mut(collection)?;
        if table.contains_key(&row.id) {
            return Err(StorageError::RecordAlreadyExists { collection, id: row.id }.into());
        }
        table.insert(row.id.clone(), row);
        Ok(())
    }

    fn update(&mut self, collection: Collection, row: Row) -> TransactionResult<()> {
        let table = self.table_mut(collection)?;
        match table.get_mut(&row.id) {
            Some(slot) => {
                *slot = row;
                Ok(())
            }
            None => Err(StorageError::RecordNotFound { collection, id: row.id }.into()),
        }
    }

    fn delete(&mut self, collection: Collection, id: &RecordId) -> TransactionResult<()> {
        let table = self.table_mut(collection)?;
        match table.remove(id) {
            Some(_) => Ok(()),
            None => Err(StorageError::RecordNotFound {
                collection,
                id: id.clone(),
            }
            .into()),
        }
    }
}

impl Gateway for MemoryGateway {
    fn read<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&dyn RecordReader) -> Result<T, E>,
        E: From<TransactionError>,
    {
        let tables = self.tables.lock();
        f(&*tables)
    }

    fn transaction<T, E, F>(&self, mut f: F) -> Result<T, E>
    where
        F: FnMut(&mut dyn RecordStore) -> Result<T, E>,
        E: From<TransactionError>,
    {
        let mut live = self.tables.lock();
        let mut working = live.clone();

        let result = f(&mut MemoryTx { tables: &mut working })?;
        *live = working;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(id: &str, order_index: i64) -> Row {
        Row::from_value(RecordId::new(id).unwrap(), json!({"order_index": order_index})).unwrap()
    }

    #[test]
    fn test_commit_on_ok() {
        let gateway = MemoryGateway::new();
        assert!(gateway.is_empty());

        gateway
            .transaction(|tx| {
                tx.insert(Collection::ContentBlocks, row("hero", 1))?;
                tx.insert(Collection::ContentBlocks, row("seo", 2))
            })
            .unwrap();

        assert_eq!(gateway.len(Collection::ContentBlocks), 2);
        assert_eq!(gateway.len(Collection::Navigation), 0);
    }

    #[test]
    fn test_discard_on_err() {
        let gateway = MemoryGateway::new();
        gateway
            .transaction(|tx| tx.insert(Collection::Navigation, row("home", 1)))
            .unwrap();

        let result: TransactionResult<()> = gateway.transaction(|tx| {
            tx.update(Collection::Navigation, row("home", 5))?;
            tx.delete(Collection::Navigation, &RecordId::new("ghost").unwrap())
        });
        assert!(result.is_err());

        let home = gateway
            .read(|r| r.get(Collection::Navigation, &RecordId::new("home").unwrap()))
            .map_err(|e: TransactionError| e)
            .unwrap()
            .unwrap();
        assert_eq!(home.get("order_index"), Some(&json!(1)));
    }

    #[test]
    fn test_writes_visible_within_transaction() {
        let gateway = MemoryGateway::new();
        gateway
            .transaction(|tx| {
                tx.insert(Collection::Navigation, row("home", 1))?;
                assert_eq!(tx.scan(Collection::Navigation)?.len(), 1);
                Ok::<_, TransactionError>(())
            })
            .unwrap();
    }

    #[test]
    fn test_duplicate_insert_and_missing_update() {
        let gateway = MemoryGateway::new();
        let result: TransactionResult<()> = gateway.transaction(|tx| {
            tx.insert(Collection::Navigation, row("home", 1))?;
            tx.insert(Collection::Navigation, row("home", 2))
        });
        assert!(matches!(
            result,
            Err(TransactionError::Storage(StorageError::RecordAlreadyExists { .. }))
        ));

        let result: TransactionResult<()> = gateway.transaction(|tx| tx.update(Collection::Navigation, row("nope", 1)));
        assert!(matches!(
            result,
            Err(TransactionError::Storage(StorageError::RecordNotFound { .. }))
        ));
    }
}
