//! Entity records and identifiers for the Ephemeris control plane.
//!
//! Everything the control plane persists is one of the records defined here,
//! encoded with rkyv and keyed by a fixed-width identifier:
//!
//! | Record | Table | Key |
//! |--------|-------|-----|
//! | [`JobRecord`] | `JOB` | [`JobId`], 4 bytes big-endian |
//! | [`NodeRecord`] | `NODE` | [`NodeId`], 16 bytes |
//! | [`WorkerRecord`] | `WORKERS` | [`WorkerId`], 16 bytes |
//! | [`PlacementGroupRecord`] | `PLACEMENT_GROUP` | [`PlacementGroupId`], 16 bytes |
//!
//! # Example
//!
//! ```
//! use ephemeris_proto::{Entity, NodeId, NodeRecord};
//!
//! let node = NodeRecord::new(NodeId::new(), "10.0.0.5", 7000);
//! let bytes = node.encode().unwrap();
//! assert_eq!(NodeRecord::decode(&bytes).unwrap(), node);
//! ```

pub mod codec;
mod error;
mod ids;
mod records;

pub use codec::{decode, encode, Entity, MAX_RECORD_SIZE};
pub use error::ProtocolError;
pub use ids::{ClusterId, EntityId, JobId, NodeId, PlacementGroupId, WorkerId};
pub use records::{
    JobConfig, JobRecord, NodeRecord, NodeState, PlacementGroupRecord, PlacementGroupState, PlacementStrategy,
    ResourceMap, ResourceUsage, ResourceUsageBatch, ResourceViewReport, TotalResources, WorkerAddress, WorkerRecord,
    SUBMISSION_ID_KEY,
};
