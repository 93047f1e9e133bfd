use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::traits::TableStore;
use crate::types::{Row, StorageBackend};

type Table = BTreeMap<Vec<u8>, Vec<u8>>;

/// In-process table store. Contents are lost when the last clone is dropped.
#[derive(Debug, Clone, Default)]
pub struct MemoryTableStore {
    tables: Arc<RwLock<HashMap<String, Table>>>,
}

impl MemoryTableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows in `table`.
    pub async fn len(&self, table: &str) -> usize {
        self.tables.read().await.get(table).map_or(0, BTreeMap::len)
    }
}

#[async_trait]
impl TableStore for MemoryTableStore {
    async fn put(&self, table: &str, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        tables
            .entry(table.to_string())
            .or_default()
            .insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    async fn get(&self, table: &str, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.get(table).and_then(|t| t.get(key)).cloned())
    }

    async fn get_all(&self, table: &str) -> Result<Vec<Row>, StoreError> {
        let tables = self.tables.read().await;
        let rows = tables
            .get(table)
            .map(|t| t.iter().map(|(k, v)| Row::new(k.clone(), v.clone())).collect())
            .unwrap_or_default();
        Ok(rows)
    }

    async fn delete(&self, table: &str, key: &[u8]) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().await;
        Ok(tables.get_mut(table).is_some_and(|t| t.remove(key).is_some()))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    fn backend(&self) -> StorageBackend {
        StorageBackend::Memory
    }
}
