use std::sync::Arc;

use ephemeris_proto::{JobId, JobRecord};
use ephemeris_state::TableStore;
use tracing::{debug, info};

use crate::error::{ControlError, ControlResult};
use crate::storage::{Table, CLUSTER_TABLE, JOB_COUNTER_KEY};

/// Submitted jobs and the job-id counter.
pub struct JobRegistry {
    table: Table<JobRecord>,
    store: Arc<dyn TableStore>,
}

impl JobRegistry {
    pub fn new(table: Table<JobRecord>, store: Arc<dyn TableStore>) -> Self {
        Self { table, store }
    }

    /// Stores a job, replacing any record with the same id.
    pub async fn add(&self, record: &JobRecord) -> ControlResult<()> {
        self.table.put(record).await?;
        info!(
            job_id = %record.job_id,
            submission_id = record.submission_id().unwrap_or(""),
            "job added"
        );
        Ok(())
    }

    pub async fn get(&self, job_id: JobId) -> ControlResult<JobRecord> {
        self.table
            .get(&job_id)
            .await?
            .ok_or_else(|| ControlError::not_found("job", job_id))
    }

    pub async fn get_all(&self) -> ControlResult<Vec<JobRecord>> {
        self.table.get_all().await
    }

    /// Allocates the next job id. The counter is persisted, so ids keep
    /// increasing across restarts on a durable backend. The first id is 1.
    pub async fn next_job_id(&self) -> ControlResult<JobId> {
        let current = match self.store.get(CLUSTER_TABLE, JOB_COUNTER_KEY).await? {
            Some(bytes) => {
                let raw: [u8; 4] = bytes.as_slice().try_into().map_err(|_| {
                    ControlError::internal(format!("corrupt job counter: {} bytes", bytes.len()))
                })?;
                u32::from_be_bytes(raw)
            }
            None => 0,
        };
        let next = current
            .checked_add(1)
            .ok_or_else(|| ControlError::internal("job id space exhausted"))?;
        self.store
            .put(CLUSTER_TABLE, JOB_COUNTER_KEY, &next.to_be_bytes())
            .await?;
        debug!(job_id = next, "job id allocated");
        Ok(JobId::from_int(next))
    }
}
