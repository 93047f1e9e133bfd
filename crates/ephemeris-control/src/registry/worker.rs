//! Worker records.
//!
//! Workers are handed over as encoded bytes and stored exactly as submitted.
//! The two field updates are read-modify-write sequences; they are atomic
//! because the sequencer runs them one at a time, not because the backend
//! locks anything.

use ephemeris_proto::{Entity, WorkerId, WorkerRecord};
use tracing::{debug, info};

use crate::error::{ControlError, ControlResult};
use crate::storage::Table;

pub struct WorkerRegistry {
    table: Table<WorkerRecord>,
}

impl WorkerRegistry {
    pub fn new(table: Table<WorkerRecord>) -> Self {
        Self { table }
    }

    /// Stores a new worker. Fails with `InvalidArgument` before any write if
    /// the bytes do not decode, and with `AlreadyExists` if the id is taken.
    pub async fn add_worker_info(&self, bytes: &[u8]) -> ControlResult<WorkerId> {
        let record = WorkerRecord::decode(bytes)?;
        let worker_id = record.worker_id();

        if self.table.contains(&worker_id).await? {
            return Err(ControlError::already_exists("worker", worker_id));
        }
        self.table.put_raw(&worker_id, bytes).await?;

        info!(
            %worker_id,
            node_id = %record.address.node_id,
            ip_address = %record.address.ip_address,
            port = record.address.port,
            "worker added"
        );
        Ok(worker_id)
    }

    pub async fn get_worker_info(&self, worker_id: WorkerId) -> ControlResult<Vec<u8>> {
        self.table
            .get_raw(&worker_id)
            .await?
            .ok_or_else(|| ControlError::not_found("worker", worker_id))
    }

    pub async fn get_all_worker_info(&self) -> ControlResult<Vec<Vec<u8>>> {
        self.table.get_all_raw().await
    }

    /// Overwrites the debugger port. Last writer wins.
    pub async fn update_worker_debugger_port(&self, worker_id: WorkerId, port: u32) -> ControlResult<()> {
        let mut record = self.load(worker_id).await?;
        record.debugger_port = port;
        self.table.put(&record).await?;
        debug!(%worker_id, port, "worker debugger port updated");
        Ok(())
    }

    /// Adds a signed delta to the paused-thread count. The count may go
    /// negative; leaving the `i32` range is rejected.
    pub async fn update_worker_num_paused_threads(&self, worker_id: WorkerId, delta: i32) -> ControlResult<()> {
        let mut record = self.load(worker_id).await?;
        let current = record.num_paused_threads;
        record.num_paused_threads = current.checked_add(delta).ok_or_else(|| {
            ControlError::InvalidArgument(format!("paused thread count overflow: {current} + {delta}"))
        })?;
        self.table.put(&record).await?;
        debug!(
            %worker_id,
            delta,
            num_paused_threads = record.num_paused_threads,
            "worker paused threads updated"
        );
        Ok(())
    }

    async fn load(&self, worker_id: WorkerId) -> ControlResult<WorkerRecord> {
        self.table
            .get(&worker_id)
            .await?
            .ok_or_else(|| ControlError::not_found("worker", worker_id))
    }
}
