//! In-process client of the sequencer.

use ephemeris_proto::{
    JobId, JobRecord, NodeId, NodeRecord, PlacementGroupRecord, ResourceUsageBatch, ResourceViewReport,
    TotalResources, WorkerId,
};
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::error::{ControlError, ControlResult};
use crate::sequencer::{ChangeEvent, Command, DebugState, Reply};

/// Cheap, cloneable handle for posting requests to the sequencer.
///
/// Every method resolves once the sequencer has applied the request. After
/// the server stops, calls fail with [`ControlError::Unavailable`].
#[derive(Clone)]
pub struct ControlHandle {
    commands: mpsc::UnboundedSender<Command>,
    events: broadcast::Sender<ChangeEvent>,
}

impl ControlHandle {
    pub(crate) fn new(commands: mpsc::UnboundedSender<Command>, events: broadcast::Sender<ChangeEvent>) -> Self {
        Self { commands, events }
    }

    /// Whether the sequencer has stopped accepting requests.
    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    /// Feed of committed mutations.
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.events.subscribe()
    }

    /// Posts a command without waiting. The returned receiver completes
    /// when the sequencer has applied it.
    pub(crate) fn post<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> Command,
    ) -> ControlResult<oneshot::Receiver<ControlResult<T>>> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(build(reply))
            .map_err(|_| ControlError::Unavailable("sequencer is not running".into()))?;
        Ok(rx)
    }

    async fn request<T>(&self, build: impl FnOnce(Reply<T>) -> Command) -> ControlResult<T> {
        self.post(build)?
            .await
            .map_err(|_| ControlError::Unavailable("sequencer dropped the request".into()))?
    }

    pub async fn add_job(&self, record: JobRecord) -> ControlResult<()> {
        self.request(|reply| Command::AddJob { record, reply }).await
    }

    pub async fn get_all_jobs(&self) -> ControlResult<Vec<JobRecord>> {
        self.request(|reply| Command::GetAllJobs { reply }).await
    }

    pub async fn next_job_id(&self) -> ControlResult<JobId> {
        self.request(|reply| Command::NextJobId { reply }).await
    }

    pub async fn register_node(&self, record: NodeRecord) -> ControlResult<()> {
        self.request(|reply| Command::RegisterNode { record, reply }).await
    }

    pub async fn get_all_nodes(&self) -> ControlResult<Vec<NodeRecord>> {
        self.request(|reply| Command::GetAllNodes { reply }).await
    }

    /// Applies a resource report as if it arrived from the node's sync stream.
    pub async fn report_resource_view(&self, node_id: NodeId, report: ResourceViewReport) -> ControlResult<()> {
        self.request(|reply| Command::ReportResourceView {
            node_id,
            report,
            reply,
        })
        .await
    }

    pub async fn get_all_total_resources(&self) -> ControlResult<Vec<TotalResources>> {
        self.request(|reply| Command::GetAllTotalResources { reply }).await
    }

    pub async fn get_all_resource_usage(&self) -> ControlResult<ResourceUsageBatch> {
        self.request(|reply| Command::GetAllResourceUsage { reply }).await
    }

    pub async fn add_worker(&self, bytes: Vec<u8>) -> ControlResult<WorkerId> {
        self.request(|reply| Command::AddWorker { bytes, reply }).await
    }

    pub async fn get_worker(&self, worker_id: WorkerId) -> ControlResult<Vec<u8>> {
        self.request(|reply| Command::GetWorker { worker_id, reply }).await
    }

    pub async fn get_all_workers(&self) -> ControlResult<Vec<Vec<u8>>> {
        self.request(|reply| Command::GetAllWorkers { reply }).await
    }

    pub async fn update_worker_debugger_port(&self, worker_id: WorkerId, port: u32) -> ControlResult<()> {
        self.request(|reply| Command::UpdateWorkerDebuggerPort {
            worker_id,
            port,
            reply,
        })
        .await
    }

    pub async fn update_worker_num_paused_threads(&self, worker_id: WorkerId, delta: i32) -> ControlResult<()> {
        self.request(|reply| Command::UpdateWorkerNumPausedThreads {
            worker_id,
            delta,
            reply,
        })
        .await
    }

    pub async fn add_placement_group(&self, record: PlacementGroupRecord) -> ControlResult<()> {
        self.request(|reply| Command::AddPlacementGroup { record, reply }).await
    }

    pub async fn get_all_placement_groups(&self) -> ControlResult<Vec<PlacementGroupRecord>> {
        self.request(|reply| Command::GetAllPlacementGroups { reply }).await
    }

    pub async fn debug_state(&self) -> ControlResult<DebugState> {
        self.request(|reply| Command::DebugState { reply }).await
    }
}

impl std::fmt::Debug for ControlHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlHandle")
            .field("closed", &self.is_closed())
            .finish()
    }
}
