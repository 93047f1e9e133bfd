//! Blocking facade over the control plane.
//!
//! [`StateAccessor`] is for callers outside any async runtime. Each call
//! posts a command to the sequencer and blocks until it completes or the
//! configured timeout passes. A timed-out operation is not cancelled: it
//! still runs, and may still land, after the caller has given up.
//!
//! Calling any method from inside a tokio runtime panics.

use std::fmt;

use ephemeris_proto::{JobId, JobRecord, NodeRecord, PlacementGroupRecord, ResourceUsageBatch, TotalResources, WorkerId};
use tokio::runtime::{Builder, Runtime};
use tokio::sync::oneshot;
use tracing::debug;

use crate::config::AccessorConfig;
use crate::error::{ControlError, ControlResult};
use crate::handle::ControlHandle;
use crate::sequencer::{Command, Reply};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Connected,
    Disconnected,
}

/// Synchronous client of a running control server. Single use: once
/// disconnected it cannot connect again.
pub struct StateAccessor {
    handle: ControlHandle,
    config: AccessorConfig,
    runtime: Option<Runtime>,
    phase: Phase,
}

impl StateAccessor {
    pub fn new(handle: ControlHandle, config: AccessorConfig) -> Self {
        Self {
            handle,
            config,
            runtime: None,
            phase: Phase::Idle,
        }
    }

    /// Checks the control channel is open and starts the dispatch runtime.
    pub fn connect(&mut self) -> ControlResult<()> {
        match self.phase {
            Phase::Connected => return Ok(()),
            Phase::Disconnected => {
                return Err(ControlError::InvalidState("accessor was already disconnected".into()));
            }
            Phase::Idle => {}
        }
        if self.handle.is_closed() {
            return Err(ControlError::Unavailable("control server is not running".into()));
        }
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("ephemeris-accessor")
            .enable_time()
            .build()
            .map_err(|e| ControlError::internal(format!("failed to start accessor runtime: {e}")))?;
        self.runtime = Some(runtime);
        self.phase = Phase::Connected;
        debug!(timeout = ?self.config.timeout(), "accessor connected");
        Ok(())
    }

    /// Stops the dispatch runtime. Safe without a prior successful
    /// `connect()`, and safe to repeat.
    pub fn disconnect(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
            debug!("accessor disconnected");
        }
        self.phase = Phase::Disconnected;
    }

    pub fn is_connected(&self) -> bool {
        self.phase == Phase::Connected
    }

    pub fn get_all_job_info(&self) -> ControlResult<Vec<JobRecord>> {
        self.call(|reply| Command::GetAllJobs { reply })
    }

    pub fn get_next_job_id(&self) -> ControlResult<JobId> {
        self.call(|reply| Command::NextJobId { reply })
    }

    pub fn get_all_node_info(&self) -> ControlResult<Vec<NodeRecord>> {
        self.call(|reply| Command::GetAllNodes { reply })
    }

    pub fn get_all_total_resources(&self) -> ControlResult<Vec<TotalResources>> {
        self.call(|reply| Command::GetAllTotalResources { reply })
    }

    pub fn get_all_resource_usage(&self) -> ControlResult<ResourceUsageBatch> {
        self.call(|reply| Command::GetAllResourceUsage { reply })
    }

    /// Stores a serialised worker record and returns its id.
    pub fn add_worker_info(&self, bytes: &[u8]) -> ControlResult<WorkerId> {
        let bytes = bytes.to_vec();
        self.call(|reply| Command::AddWorker { bytes, reply })
    }

    /// The worker's serialised record, exactly as it is stored.
    pub fn get_worker_info(&self, worker_id: WorkerId) -> ControlResult<Vec<u8>> {
        self.call(|reply| Command::GetWorker { worker_id, reply })
    }

    pub fn get_all_worker_info(&self) -> ControlResult<Vec<Vec<u8>>> {
        self.call(|reply| Command::GetAllWorkers { reply })
    }

    pub fn update_worker_debugger_port(&self, worker_id: WorkerId, port: u32) -> ControlResult<()> {
        self.call(|reply| Command::UpdateWorkerDebuggerPort { worker_id, port, reply })
    }

    /// Adds `delta` (which may be negative) to the worker's paused thread
    /// count.
    pub fn update_worker_num_paused_threads(&self, worker_id: WorkerId, delta: i32) -> ControlResult<()> {
        self.call(|reply| Command::UpdateWorkerNumPausedThreads { worker_id, delta, reply })
    }

    pub fn get_all_placement_group_info(&self) -> ControlResult<Vec<PlacementGroupRecord>> {
        self.call(|reply| Command::GetAllPlacementGroups { reply })
    }

    fn call<T>(&self, build: impl FnOnce(Reply<T>) -> Command) -> ControlResult<T> {
        let runtime = self
            .runtime
            .as_ref()
            .ok_or_else(|| ControlError::InvalidState("accessor is not connected".into()))?;
        let rx = self.handle.post(build)?;
        self.wait(runtime, rx)
    }

    fn wait<T>(&self, runtime: &Runtime, rx: oneshot::Receiver<ControlResult<T>>) -> ControlResult<T> {
        let timeout = self.config.timeout();
        match runtime.block_on(tokio::time::timeout(timeout, rx)) {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(ControlError::Unavailable("sequencer dropped the request".into())),
            Err(_) => Err(ControlError::Timeout(timeout)),
        }
    }
}

impl Drop for StateAccessor {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl fmt::Debug for StateAccessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateAccessor")
            .field("phase", &self.phase)
            .field("timeout", &self.config.timeout())
            .finish()
    }
}
