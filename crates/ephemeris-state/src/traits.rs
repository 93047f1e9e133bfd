use async_trait::async_trait;

use crate::error::StoreError;
use crate::types::{Row, StorageBackend};

/// Namespaced key/value storage shared by every persisted table.
///
/// Tables are created implicitly on first write. Keys and values are opaque
/// bytes. Every backend must behave identically for every operation; callers
/// never branch on [`TableStore::backend`].
#[async_trait]
pub trait TableStore: Send + Sync {
    /// Inserts or overwrites the value stored under `key`.
    async fn put(&self, table: &str, key: &[u8], value: &[u8]) -> Result<(), StoreError>;

    /// Returns the value stored under `key`, or `None` if absent.
    async fn get(&self, table: &str, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    /// Returns every row of `table`, ordered by key bytes.
    async fn get_all(&self, table: &str) -> Result<Vec<Row>, StoreError>;

    /// Removes `key`. Returns whether a value was present.
    async fn delete(&self, table: &str, key: &[u8]) -> Result<bool, StoreError>;

    /// Checks that the backend is reachable.
    async fn ping(&self) -> Result<(), StoreError>;

    fn backend(&self) -> StorageBackend;
}
