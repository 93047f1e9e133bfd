//! Ephemeris control plane.
//!
//! A [`ControlServer`] owns the cluster's shared metadata: jobs, nodes,
//! workers, placement groups and per-node resource views. Every registry
//! lives inside a single sequencer task; callers reach it through a
//! [`ControlHandle`] (async, in-process), a [`StateAccessor`] (blocking,
//! with a timeout) or the HTTP surface in [`api`], for which
//! [`ControlClient`] is the client.
//!
//! Persistent state goes through an [`ephemeris_state::TableStore`], so the
//! same server runs over memory or Valkey.

pub mod accessor;
pub mod api;
pub mod client;
pub mod cluster_id;
pub mod collaborators;
pub mod components;
pub mod config;
pub mod error;
pub mod handle;
pub mod registry;
pub mod sequencer;
pub mod server;
pub mod storage;

#[cfg(test)]
mod testing;

pub use accessor::StateAccessor;
pub use client::ControlClient;
pub use collaborators::{Collaborator, CollaboratorContext, DebugStateReporter, StorageHealthCheck};
pub use components::ComponentId;
pub use config::{AccessorConfig, ClusterConfig, CollaboratorConfig, ControlConfig, ServerConfig};
pub use error::{ControlError, ControlResult};
pub use handle::ControlHandle;
pub use sequencer::{ChangeEvent, DebugState};
pub use server::{ControlServer, ServerState};
