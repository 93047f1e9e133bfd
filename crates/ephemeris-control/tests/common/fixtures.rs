//! Record builders and store doubles.

use std::time::Duration;

use async_trait::async_trait;
use ephemeris_proto::{
    Entity, JobId, JobRecord, NodeId, NodeRecord, ResourceMap, ResourceViewReport, WorkerAddress, WorkerId,
    WorkerRecord,
};
use ephemeris_state::{MemoryTableStore, Row, StorageBackend, StoreError, TableStore};

pub fn resources(pairs: &[(&str, f64)]) -> ResourceMap {
    pairs.iter().map(|(k, v)| ((*k).to_string(), *v)).collect()
}

pub fn job(n: u32) -> JobRecord {
    JobRecord::new(JobId::from_int(n), format!("10.0.0.{}:6379", n % 250), 1000 + n)
        .with_submission_id(format!("raysubmit_{n:04}"))
}

/// Builder for test node records.
pub struct NodeBuilder {
    record: NodeRecord,
}

impl NodeBuilder {
    pub fn new() -> Self {
        Self {
            record: NodeRecord::new(NodeId::new(), "127.0.0.1", 7000),
        }
    }

    pub fn with_address(mut self, address: &str, port: u16) -> Self {
        self.record.address = address.to_string();
        self.record.port = port;
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.record.name = name.to_string();
        self
    }

    pub fn with_resources(mut self, pairs: &[(&str, f64)]) -> Self {
        self.record.resources_total = resources(pairs);
        self
    }

    pub fn build(self) -> NodeRecord {
        self.record
    }
}

/// Builder for test worker records.
pub struct WorkerBuilder {
    record: WorkerRecord,
}

impl WorkerBuilder {
    pub fn new() -> Self {
        Self {
            record: WorkerRecord::new(WorkerAddress {
                worker_id: WorkerId::new(),
                node_id: NodeId::new(),
                ip_address: "127.0.0.1".into(),
                port: 5000,
            }),
        }
    }

    pub fn on_node(mut self, node_id: NodeId) -> Self {
        self.record.address.node_id = node_id;
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.record.address.port = port;
        self
    }

    pub fn with_pid(mut self, pid: u32) -> Self {
        self.record.pid = pid;
        self
    }

    pub fn build(self) -> WorkerRecord {
        self.record
    }

    pub fn bytes(self) -> Vec<u8> {
        self.record.encode().unwrap()
    }
}

pub fn report(total: &[(&str, f64)], available: &[(&str, f64)]) -> ResourceViewReport {
    ResourceViewReport {
        resources_total: resources(total),
        resources_available: resources(available),
    }
}

/// Memory store whose reads stall for `delay`.
pub struct SlowStore {
    inner: MemoryTableStore,
    delay: Duration,
}

impl SlowStore {
    pub fn new(delay: Duration) -> Self {
        Self {
            inner: MemoryTableStore::new(),
            delay,
        }
    }
}

#[async_trait]
impl TableStore for SlowStore {
    async fn put(&self, table: &str, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.inner.put(table, key, value).await
    }

    async fn get(&self, table: &str, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        tokio::time::sleep(self.delay).await;
        self.inner.get(table, key).await
    }

    async fn get_all(&self, table: &str) -> Result<Vec<Row>, StoreError> {
        self.inner.get_all(table).await
    }

    async fn delete(&self, table: &str, key: &[u8]) -> Result<bool, StoreError> {
        self.inner.delete(table, key).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    fn backend(&self) -> StorageBackend {
        StorageBackend::Memory
    }
}

/// Store that refuses every call.
pub struct DownStore;

#[async_trait]
impl TableStore for DownStore {
    async fn put(&self, _: &str, _: &[u8], _: &[u8]) -> Result<(), StoreError> {
        Err(StoreError::Connection("refused".into()))
    }

    async fn get(&self, _: &str, _: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Err(StoreError::Connection("refused".into()))
    }

    async fn get_all(&self, _: &str) -> Result<Vec<Row>, StoreError> {
        Err(StoreError::Connection("refused".into()))
    }

    async fn delete(&self, _: &str, _: &[u8]) -> Result<bool, StoreError> {
        Err(StoreError::Connection("refused".into()))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Err(StoreError::Connection("refused".into()))
    }

    fn backend(&self) -> StorageBackend {
        StorageBackend::Valkey
    }
}
