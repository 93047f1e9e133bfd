//! Entity registries.
//!
//! Each registry owns one table and knows nothing about the server. The
//! [`Registries`] bundle is owned by the sequencer task, which is the only
//! caller, so none of them need locks.

mod job;
mod node;
mod placement_group;
mod resource;
mod worker;

pub use job::JobRegistry;
pub use node::NodeRegistry;
pub use placement_group::PlacementGroupRegistry;
pub use resource::ResourceViewRegistry;
pub use worker::WorkerRegistry;

use ephemeris_proto::NodeRecord;
use ephemeris_state::StorageBackend;
use tracing::info;

use crate::error::ControlResult;
use crate::storage::TableStorage;

/// Every registry, owned together.
pub struct Registries {
    pub jobs: JobRegistry,
    pub nodes: NodeRegistry,
    pub workers: WorkerRegistry,
    pub placement_groups: PlacementGroupRegistry,
    pub resources: ResourceViewRegistry,
    backend: StorageBackend,
}

impl Registries {
    pub fn new(storage: TableStorage, resources: ResourceViewRegistry) -> Self {
        let store = storage.store().clone();
        Self {
            backend: store.backend(),
            jobs: JobRegistry::new(storage.jobs, store),
            nodes: NodeRegistry::new(storage.nodes),
            workers: WorkerRegistry::new(storage.workers),
            placement_groups: PlacementGroupRegistry::new(storage.placement_groups),
            resources,
        }
    }

    /// Rebuilds in-memory state from persisted tables. Run once at start,
    /// before the sequencer accepts commands.
    pub async fn load_persisted(&mut self) -> ControlResult<()> {
        let nodes = self.nodes.get_all().await?;
        for node in &nodes {
            self.resources.on_node_registered(node);
        }
        info!(nodes = nodes.len(), backend = %self.backend, "persisted state loaded");
        Ok(())
    }

    /// Persists the node, then feeds its declared totals to the resource view.
    pub async fn register_node(&mut self, record: &NodeRecord) -> ControlResult<()> {
        self.nodes.register(record).await?;
        self.resources.on_node_registered(record);
        Ok(())
    }

    pub fn backend(&self) -> StorageBackend {
        self.backend
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use ephemeris_proto::{NodeId, ResourceMap};
    use ephemeris_state::{MemoryTableStore, TableStore};

    #[tokio::test]
    async fn reload_restores_declared_totals() {
        let store: Arc<dyn TableStore> = Arc::new(MemoryTableStore::new());

        let mut node = NodeRecord::new(NodeId::new(), "10.0.0.1", 7000);
        node.resources_total = ResourceMap::from([("CPU".to_owned(), 16.0)]);
        let mut first = Registries::new(TableStorage::new(Arc::clone(&store)), ResourceViewRegistry::new());
        first.register_node(&node).await.unwrap();
        assert_eq!(first.resources.get_all_total_resources().len(), 1);

        let mut second = Registries::new(TableStorage::new(store), ResourceViewRegistry::new());
        assert!(second.resources.get_all_total_resources().is_empty());
        second.load_persisted().await.unwrap();

        let totals = second.resources.get_all_total_resources();
        assert_eq!(totals.len(), 1);
        assert_eq!(totals[0].node_id, node.node_id);
        assert_eq!(totals[0].resources_total, node.resources_total);
        assert!(second.resources.get_all_resource_usage().batch.is_empty());
    }
}
