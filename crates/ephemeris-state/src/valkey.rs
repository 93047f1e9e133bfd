//! Valkey/Redis table store.
//!
//! Each table is one hash, `<namespace>:table:<TABLE>`, whose fields are the
//! row keys. All tables share one connection pool.

use std::collections::BTreeMap;

use async_trait::async_trait;
use deadpool_redis::{Config, Connection, Pool, Runtime};
use redis::{AsyncCommands, ErrorKind, RedisError};
use tracing::{debug, warn};

use crate::config::ValkeyConfig;
use crate::error::StoreError;
use crate::traits::TableStore;
use crate::types::{Row, StorageBackend};

/// Table store backed by an external Valkey/Redis server.
#[derive(Clone)]
pub struct ValkeyTableStore {
    pool: Pool,
    namespace: String,
}

impl ValkeyTableStore {
    /// Builds the pool and waits until the server answers `PING`.
    ///
    /// Connection is attempted `connect_attempts` times with
    /// `retry_delay_ms` between attempts. Individual table operations are
    /// never retried.
    pub async fn connect(config: &ValkeyConfig, namespace: impl Into<String>) -> Result<Self, StoreError> {
        let namespace = namespace.into();
        let url = config.url().map_err(|e| StoreError::Connection(e.to_string()))?;
        let pool = Config::from_url(url)
            .builder()
            .map_err(|e| StoreError::Connection(e.to_string()))?
            .max_size(config.pool_size.max(1))
            .runtime(Runtime::Tokio1)
            .build()
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        let store = Self { pool, namespace };
        let attempts = config.connect_attempts.max(1);
        let mut attempt = 1;
        loop {
            match store.ping().await {
                Ok(()) => {
                    debug!(namespace = %store.namespace, attempt, "connected to valkey");
                    return Ok(store);
                }
                Err(e) if attempt < attempts => {
                    warn!(attempt, attempts, error = %e, "valkey not reachable, retrying");
                    tokio::time::sleep(config.retry_delay()).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn table_key(&self, table: &str) -> String {
        format!("{}:table:{}", self.namespace, table)
    }

    async fn conn(&self) -> Result<Connection, StoreError> {
        self.pool
            .get()
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))
    }
}

fn map_redis(e: RedisError) -> StoreError {
    if e.is_timeout() {
        StoreError::Timeout
    } else if e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal() {
        StoreError::Connection(e.to_string())
    } else if e.kind() == ErrorKind::TypeError {
        StoreError::Serialisation(e.to_string())
    } else {
        StoreError::Backend(e.to_string())
    }
}

#[async_trait]
impl TableStore for ValkeyTableStore {
    async fn put(&self, table: &str, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        conn.hset::<_, _, _, ()>(self.table_key(table), key, value)
            .await
            .map_err(map_redis)
    }

    async fn get(&self, table: &str, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        let mut conn = self.conn().await?;
        conn.hget::<_, _, Option<Vec<u8>>>(self.table_key(table), key)
            .await
            .map_err(map_redis)
    }

    async fn get_all(&self, table: &str) -> Result<Vec<Row>, StoreError> {
        let mut conn = self.conn().await?;
        // BTreeMap gives the same key order as the memory backend.
        let rows: BTreeMap<Vec<u8>, Vec<u8>> = conn.hgetall(self.table_key(table)).await.map_err(map_redis)?;
        Ok(rows.into_iter().map(|(key, value)| Row { key, value }).collect())
    }

    async fn delete(&self, table: &str, key: &[u8]) -> Result<bool, StoreError> {
        let mut conn = self.conn().await?;
        let removed: i64 = conn.hdel(self.table_key(table), key).await.map_err(map_redis)?;
        Ok(removed > 0)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        redis::cmd("PING")
            .query_async::<String>(&mut *conn)
            .await
            .map_err(map_redis)?;
        Ok(())
    }

    fn backend(&self) -> StorageBackend {
        StorageBackend::Valkey
    }
}

impl std::fmt::Debug for ValkeyTableStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValkeyTableStore")
            .field("namespace", &self.namespace)
            .field("pool", &self.pool.status())
            .finish()
    }
}
