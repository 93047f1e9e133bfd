//! Persisted entity records and resource-view messages.
//!
//! Records are stored as rkyv archives. They also derive serde so the RPC
//! surface can render listings as JSON.

use std::collections::BTreeMap;

use rkyv::{Archive, Deserialize, Serialize};

use crate::ids::{JobId, NodeId, PlacementGroupId, WorkerId};

/// Sparse map from resource name to quantity.
pub type ResourceMap = BTreeMap<String, f64>;

/// Metadata key carrying the externally assigned submission id.
pub const SUBMISSION_ID_KEY: &str = "job_submission_id";

/// Per-job configuration.
#[derive(
    Archive, Serialize, Deserialize, serde::Serialize, serde::Deserialize, Debug, Clone, Default, PartialEq, Eq,
)]
pub struct JobConfig {
    /// Namespace the job's named entities live in.
    pub namespace: String,
    /// Free-form metadata.
    pub metadata: BTreeMap<String, String>,
}

/// A submitted job.
#[derive(Archive, Serialize, Deserialize, serde::Serialize, serde::Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct JobRecord {
    pub job_id: JobId,
    pub driver_address: String,
    pub driver_pid: u32,
    pub entrypoint: String,
    pub start_time_ms: u64,
    pub is_dead: bool,
    pub config: JobConfig,
}

impl JobRecord {
    /// Creates a live job record with empty configuration.
    #[must_use]
    pub fn new(job_id: JobId, driver_address: impl Into<String>, driver_pid: u32) -> Self {
        Self {
            job_id,
            driver_address: driver_address.into(),
            driver_pid,
            entrypoint: String::new(),
            start_time_ms: 0,
            is_dead: false,
            config: JobConfig::default(),
        }
    }

    /// Attaches an external submission id.
    #[must_use]
    pub fn with_submission_id(mut self, submission_id: impl Into<String>) -> Self {
        self.config
            .metadata
            .insert(SUBMISSION_ID_KEY.to_owned(), submission_id.into());
        self
    }

    /// Returns the external submission id, if the job was submitted through
    /// the job submission service.
    #[must_use]
    pub fn submission_id(&self) -> Option<&str> {
        self.config.metadata.get(SUBMISSION_ID_KEY).map(String::as_str)
    }
}

/// Liveness of a node as last recorded.
#[derive(
    Archive, Serialize, Deserialize, serde::Serialize, serde::Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq,
)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    #[default]
    Alive,
    Dead,
}

/// A registered node.
#[derive(Archive, Serialize, Deserialize, serde::Serialize, serde::Deserialize, Debug, Clone, PartialEq)]
pub struct NodeRecord {
    pub node_id: NodeId,
    pub address: String,
    pub port: u16,
    pub name: String,
    /// Resources declared at registration time.
    pub resources_total: ResourceMap,
    pub state: NodeState,
    pub start_time_ms: u64,
}

impl NodeRecord {
    /// Creates an alive node record with no declared resources.
    #[must_use]
    pub fn new(node_id: NodeId, address: impl Into<String>, port: u16) -> Self {
        Self {
            node_id,
            address: address.into(),
            port,
            name: String::new(),
            resources_total: ResourceMap::new(),
            state: NodeState::Alive,
            start_time_ms: 0,
        }
    }
}

/// Where a worker can be reached.
#[derive(Archive, Serialize, Deserialize, serde::Serialize, serde::Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct WorkerAddress {
    pub worker_id: WorkerId,
    pub node_id: NodeId,
    pub ip_address: String,
    pub port: u16,
}

/// A worker process.
#[derive(Archive, Serialize, Deserialize, serde::Serialize, serde::Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct WorkerRecord {
    pub address: WorkerAddress,
    pub job_id: Option<JobId>,
    pub pid: u32,
    pub is_alive: bool,
    /// Zero when no debugger is attached.
    pub debugger_port: u32,
    /// Running total of paused-thread deltas. Not clamped at zero.
    pub num_paused_threads: i32,
}

impl WorkerRecord {
    /// Creates a live worker with no debugger and no paused threads.
    #[must_use]
    pub fn new(address: WorkerAddress) -> Self {
        Self {
            address,
            job_id: None,
            pid: 0,
            is_alive: true,
            debugger_port: 0,
            num_paused_threads: 0,
        }
    }

    #[must_use]
    pub fn worker_id(&self) -> WorkerId {
        self.address.worker_id
    }
}

/// How bundles of a placement group are spread across nodes.
#[derive(
    Archive, Serialize, Deserialize, serde::Serialize, serde::Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq,
)]
#[serde(rename_all = "snake_case")]
pub enum PlacementStrategy {
    #[default]
    Pack,
    Spread,
    StrictPack,
    StrictSpread,
}

/// Scheduling state of a placement group.
#[derive(
    Archive, Serialize, Deserialize, serde::Serialize, serde::Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq,
)]
#[serde(rename_all = "snake_case")]
pub enum PlacementGroupState {
    #[default]
    Pending,
    Created,
    Removed,
    Rescheduling,
}

/// A placement group.
#[derive(Archive, Serialize, Deserialize, serde::Serialize, serde::Deserialize, Debug, Clone, PartialEq)]
pub struct PlacementGroupRecord {
    pub placement_group_id: PlacementGroupId,
    pub name: String,
    pub strategy: PlacementStrategy,
    pub bundles: Vec<ResourceMap>,
    pub state: PlacementGroupState,
}

/// Resource report pushed by a node.
#[derive(
    Archive, Serialize, Deserialize, serde::Serialize, serde::Deserialize, Debug, Clone, Default, PartialEq,
)]
pub struct ResourceViewReport {
    #[serde(default)]
    pub resources_total: ResourceMap,
    #[serde(default)]
    pub resources_available: ResourceMap,
}

/// Latest reported view of one node.
#[derive(Archive, Serialize, Deserialize, serde::Serialize, serde::Deserialize, Debug, Clone, PartialEq)]
pub struct ResourceUsage {
    pub node_id: NodeId,
    pub resources_total: ResourceMap,
    pub resources_available: ResourceMap,
}

/// Snapshot of every node that has reported since start.
#[derive(
    Archive, Serialize, Deserialize, serde::Serialize, serde::Deserialize, Debug, Clone, Default, PartialEq,
)]
pub struct ResourceUsageBatch {
    pub batch: Vec<ResourceUsage>,
}

/// Declared totals of one registered node.
#[derive(Archive, Serialize, Deserialize, serde::Serialize, serde::Deserialize, Debug, Clone, PartialEq)]
pub struct TotalResources {
    pub node_id: NodeId,
    pub resources_total: ResourceMap,
}
