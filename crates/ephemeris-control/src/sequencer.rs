//! The single task that owns every registry.
//!
//! All reads and writes arrive as [`Command`]s on one unbounded channel and
//! are applied in arrival order, one at a time. Each command carries a
//! oneshot reply. Commands from one sender are applied in the order they
//! were sent.

use std::collections::BTreeMap;

use ephemeris_proto::{
    JobId, JobRecord, NodeId, NodeRecord, PlacementGroupId, PlacementGroupRecord, ResourceUsageBatch,
    ResourceViewReport, TotalResources, WorkerId,
};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::ControlResult;
use crate::registry::Registries;

/// Completion handle for a command.
pub(crate) type Reply<T> = oneshot::Sender<ControlResult<T>>;

/// A request for the sequencer.
pub(crate) enum Command {
    AddJob {
        record: JobRecord,
        reply: Reply<()>,
    },
    GetAllJobs {
        reply: Reply<Vec<JobRecord>>,
    },
    NextJobId {
        reply: Reply<JobId>,
    },
    RegisterNode {
        record: NodeRecord,
        reply: Reply<()>,
    },
    GetAllNodes {
        reply: Reply<Vec<NodeRecord>>,
    },
    ReportResourceView {
        node_id: NodeId,
        report: ResourceViewReport,
        reply: Reply<()>,
    },
    GetAllTotalResources {
        reply: Reply<Vec<TotalResources>>,
    },
    GetAllResourceUsage {
        reply: Reply<ResourceUsageBatch>,
    },
    AddWorker {
        bytes: Vec<u8>,
        reply: Reply<WorkerId>,
    },
    GetWorker {
        worker_id: WorkerId,
        reply: Reply<Vec<u8>>,
    },
    GetAllWorkers {
        reply: Reply<Vec<Vec<u8>>>,
    },
    UpdateWorkerDebuggerPort {
        worker_id: WorkerId,
        port: u32,
        reply: Reply<()>,
    },
    UpdateWorkerNumPausedThreads {
        worker_id: WorkerId,
        delta: i32,
        reply: Reply<()>,
    },
    AddPlacementGroup {
        record: PlacementGroupRecord,
        reply: Reply<()>,
    },
    GetAllPlacementGroups {
        reply: Reply<Vec<PlacementGroupRecord>>,
    },
    DebugState {
        reply: Reply<DebugState>,
    },
}

impl Command {
    fn kind(&self) -> &'static str {
        match self {
            Self::AddJob { .. } => "add_job",
            Self::GetAllJobs { .. } => "get_all_jobs",
            Self::NextJobId { .. } => "next_job_id",
            Self::RegisterNode { .. } => "register_node",
            Self::GetAllNodes { .. } => "get_all_nodes",
            Self::ReportResourceView { .. } => "report_resource_view",
            Self::GetAllTotalResources { .. } => "get_all_total_resources",
            Self::GetAllResourceUsage { .. } => "get_all_resource_usage",
            Self::AddWorker { .. } => "add_worker",
            Self::GetWorker { .. } => "get_worker",
            Self::GetAllWorkers { .. } => "get_all_workers",
            Self::UpdateWorkerDebuggerPort { .. } => "update_worker_debugger_port",
            Self::UpdateWorkerNumPausedThreads { .. } => "update_worker_num_paused_threads",
            Self::AddPlacementGroup { .. } => "add_placement_group",
            Self::GetAllPlacementGroups { .. } => "get_all_placement_groups",
            Self::DebugState { .. } => "debug_state",
        }
    }
}

/// A committed mutation, published to subscribers after the write succeeds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    JobAdded(JobId),
    NodeRegistered(NodeId),
    ResourceViewUpdated(NodeId),
    WorkerAdded(WorkerId),
    WorkerUpdated(WorkerId),
    PlacementGroupAdded(PlacementGroupId),
}

/// Snapshot of sequencer internals for operators.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DebugState {
    pub backend: &'static str,
    pub resource_views: usize,
    pub registered_nodes: usize,
    pub commands_processed: u64,
    pub commands_failed: u64,
    pub commands_by_kind: BTreeMap<&'static str, u64>,
}

#[derive(Debug, Default)]
struct Stats {
    processed: u64,
    failed: u64,
    by_kind: BTreeMap<&'static str, u64>,
}

pub(crate) struct Sequencer {
    registries: Registries,
    commands: mpsc::UnboundedReceiver<Command>,
    events: broadcast::Sender<ChangeEvent>,
    cancel: CancellationToken,
    stats: Stats,
}

impl Sequencer {
    pub(crate) fn new(
        registries: Registries,
        commands: mpsc::UnboundedReceiver<Command>,
        events: broadcast::Sender<ChangeEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            registries,
            commands,
            events,
            cancel,
            stats: Stats::default(),
        }
    }

    /// Applies commands until cancelled or every sender is gone, then closes
    /// the queue and applies whatever was already posted.
    pub(crate) async fn run(mut self) {
        info!("sequencer started");
        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                command = self.commands.recv() => match command {
                    Some(command) => self.apply(command).await,
                    None => break,
                },
            }
        }

        self.commands.close();
        let mut drained = 0usize;
        while let Ok(command) = self.commands.try_recv() {
            self.apply(command).await;
            drained += 1;
        }
        info!(
            drained,
            processed = self.stats.processed,
            failed = self.stats.failed,
            "sequencer stopped"
        );
    }

    async fn apply(&mut self, command: Command) {
        let kind = command.kind();
        let ok = match command {
            Command::AddJob { record, reply } => {
                let result = self.registries.jobs.add(&record).await;
                self.publish_if(&result, || ChangeEvent::JobAdded(record.job_id));
                respond(reply, result)
            }
            Command::GetAllJobs { reply } => respond(reply, self.registries.jobs.get_all().await),
            Command::NextJobId { reply } => respond(reply, self.registries.jobs.next_job_id().await),
            Command::RegisterNode { record, reply } => {
                let result = self.registries.register_node(&record).await;
                self.publish_if(&result, || ChangeEvent::NodeRegistered(record.node_id));
                respond(reply, result)
            }
            Command::GetAllNodes { reply } => respond(reply, self.registries.nodes.get_all().await),
            Command::ReportResourceView {
                node_id,
                report,
                reply,
            } => {
                self.registries.resources.update_from_resource_view(node_id, report);
                self.publish(ChangeEvent::ResourceViewUpdated(node_id));
                respond(reply, Ok(()))
            }
            Command::GetAllTotalResources { reply } => {
                respond(reply, Ok(self.registries.resources.get_all_total_resources()))
            }
            Command::GetAllResourceUsage { reply } => {
                respond(reply, Ok(self.registries.resources.get_all_resource_usage()))
            }
            Command::AddWorker { bytes, reply } => {
                let result = self.registries.workers.add_worker_info(&bytes).await;
                if let Ok(worker_id) = &result {
                    self.publish(ChangeEvent::WorkerAdded(*worker_id));
                }
                respond(reply, result)
            }
            Command::GetWorker { worker_id, reply } => {
                respond(reply, self.registries.workers.get_worker_info(worker_id).await)
            }
            Command::GetAllWorkers { reply } => {
                respond(reply, self.registries.workers.get_all_worker_info().await)
            }
            Command::UpdateWorkerDebuggerPort {
                worker_id,
                port,
                reply,
            } => {
                let result = self
                    .registries
                    .workers
                    .update_worker_debugger_port(worker_id, port)
                    .await;
                self.publish_if(&result, || ChangeEvent::WorkerUpdated(worker_id));
                respond(reply, result)
            }
            Command::UpdateWorkerNumPausedThreads {
                worker_id,
                delta,
                reply,
            } => {
                let result = self
                    .registries
                    .workers
                    .update_worker_num_paused_threads(worker_id, delta)
                    .await;
                self.publish_if(&result, || ChangeEvent::WorkerUpdated(worker_id));
                respond(reply, result)
            }
            Command::AddPlacementGroup { record, reply } => {
                let result = self.registries.placement_groups.add(&record).await;
                self.publish_if(&result, || {
                    ChangeEvent::PlacementGroupAdded(record.placement_group_id)
                });
                respond(reply, result)
            }
            Command::GetAllPlacementGroups { reply } => {
                respond(reply, self.registries.placement_groups.get_all().await)
            }
            Command::DebugState { reply } => {
                let state = self.debug_state();
                respond(reply, Ok(state))
            }
        };

        self.stats.processed += 1;
        *self.stats.by_kind.entry(kind).or_default() += 1;
        if !ok {
            self.stats.failed += 1;
        }
    }

    fn publish(&self, event: ChangeEvent) {
        // No subscribers is not an error.
        let _ = self.events.send(event);
    }

    fn publish_if<T>(&self, result: &ControlResult<T>, event: impl FnOnce() -> ChangeEvent) {
        if result.is_ok() {
            self.publish(event());
        }
    }

    fn debug_state(&self) -> DebugState {
        DebugState {
            backend: self.registries.backend().as_str(),
            resource_views: self.registries.resources.view_count(),
            registered_nodes: self.registries.resources.registered_count(),
            commands_processed: self.stats.processed,
            commands_failed: self.stats.failed,
            commands_by_kind: self.stats.by_kind.clone(),
        }
    }
}

/// Sends the result back. Returns whether the command succeeded.
fn respond<T>(reply: Reply<T>, result: ControlResult<T>) -> bool {
    let ok = result.is_ok();
    if let Err(e) = &result {
        debug!(error = %e, "command failed");
    }
    if reply.send(result).is_err() {
        // The caller gave up, e.g. an accessor timeout. The write still happened.
        debug!("command completed after its caller went away");
    }
    ok
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use ephemeris_proto::{Entity, WorkerAddress, WorkerRecord};
    use ephemeris_state::MemoryTableStore;

    use super::*;
    use crate::error::ControlError;
    use crate::testing::TestSequencer;

    fn spawn() -> TestSequencer {
        TestSequencer::spawn(Arc::new(MemoryTableStore::new()))
    }

    fn worker_bytes() -> (WorkerId, Vec<u8>) {
        let record = WorkerRecord::new(WorkerAddress {
            worker_id: WorkerId::new(),
            node_id: NodeId::new(),
            ip_address: "127.0.0.1".into(),
            port: 4000,
        });
        (record.worker_id(), record.encode().unwrap())
    }

    #[tokio::test]
    async fn commands_from_one_sender_apply_in_order() {
        let sequencer = spawn();
        let handle = sequencer.handle.clone();
        let (id, bytes) = worker_bytes();

        // Post everything before awaiting anything.
        let added = handle.post(|reply| Command::AddWorker { bytes, reply }).unwrap();
        let updates: Vec<_> = (0..10)
            .map(|_| {
                handle
                    .post(|reply| Command::UpdateWorkerNumPausedThreads {
                        worker_id: id,
                        delta: 1,
                        reply,
                    })
                    .unwrap()
            })
            .collect();
        let read = handle.post(|reply| Command::GetWorker { worker_id: id, reply }).unwrap();

        assert_eq!(added.await.unwrap().unwrap(), id);
        for update in updates {
            update.await.unwrap().unwrap();
        }
        let record = WorkerRecord::decode(&read.await.unwrap().unwrap()).unwrap();
        assert_eq!(record.num_paused_threads, 10);

        sequencer.stop().await;
    }

    #[tokio::test]
    async fn committed_mutations_are_published() {
        let sequencer = spawn();
        let handle = sequencer.handle.clone();
        let mut events = handle.subscribe();
        let (id, bytes) = worker_bytes();

        handle.add_worker(bytes.clone()).await.unwrap();
        assert!(handle.add_worker(bytes).await.is_err());
        handle.update_worker_debugger_port(id, 10_000).await.unwrap();

        assert_eq!(events.recv().await.unwrap(), ChangeEvent::WorkerAdded(id));
        assert_eq!(events.recv().await.unwrap(), ChangeEvent::WorkerUpdated(id));
        assert!(events.try_recv().is_err());

        sequencer.stop().await;
    }

    #[tokio::test]
    async fn posted_commands_drain_on_stop() {
        let sequencer = spawn();
        let handle = sequencer.handle.clone();
        let pending: Vec<_> = (0..50)
            .map(|_| handle.post(|reply| Command::NextJobId { reply }).unwrap())
            .collect();
        sequencer.stop().await;

        let mut ids = Vec::new();
        for rx in pending {
            ids.push(rx.await.unwrap().unwrap().as_u32());
        }
        assert_eq!(ids, (1..=50).collect::<Vec<_>>());

        assert!(handle.is_closed());
        let err = handle.get_all_jobs().await.unwrap_err();
        assert!(matches!(err, ControlError::Unavailable(_)));
    }

    #[tokio::test]
    async fn debug_state_counts_commands() {
        let sequencer = spawn();
        let handle = sequencer.handle.clone();
        handle.report_resource_view(NodeId::new(), ResourceViewReport::default()).await.unwrap();
        let _ = handle.get_worker(WorkerId::new()).await;

        let state = handle.debug_state().await.unwrap();
        assert_eq!(state.backend, "memory");
        assert_eq!(state.resource_views, 1);
        assert_eq!(state.commands_processed, 2);
        assert_eq!(state.commands_failed, 1);
        assert_eq!(state.commands_by_kind.get("get_worker"), Some(&1));

        sequencer.stop().await;
    }
}
