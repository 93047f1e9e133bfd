//! Table storage for the Ephemeris control plane.
//!
//! A [`TableStore`] is a set of named tables mapping opaque byte keys to
//! opaque byte values. Two backends implement it with identical semantics:
//!
//! - [`MemoryTableStore`]: in-process, lost on restart.
//! - [`ValkeyTableStore`]: one Redis hash per table, survives restarts.
//!
//! [`open_table_store`] picks the backend from a [`StorageConfig`].

mod config;
mod error;
mod provider;
mod traits;
mod types;

#[cfg(feature = "memory")]
mod memory;

#[cfg(feature = "valkey")]
mod valkey;

pub use config::StorageConfig;
pub use error::{StateError, StoreError};
pub use provider::open_table_store;
pub use traits::TableStore;
pub use types::{Row, StorageBackend};

#[cfg(feature = "memory")]
pub use memory::MemoryTableStore;

#[cfg(feature = "valkey")]
pub use config::ValkeyConfig;

#[cfg(feature = "valkey")]
pub use valkey::ValkeyTableStore;
