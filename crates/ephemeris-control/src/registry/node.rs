use ephemeris_proto::{NodeId, NodeRecord};
use tracing::info;

use crate::error::{ControlError, ControlResult};
use crate::storage::Table;

/// Registered nodes.
pub struct NodeRegistry {
    table: Table<NodeRecord>,
}

impl NodeRegistry {
    pub fn new(table: Table<NodeRecord>) -> Self {
        Self { table }
    }

    /// Stores a node. Re-registration replaces the previous record.
    pub async fn register(&self, record: &NodeRecord) -> ControlResult<()> {
        self.table.put(record).await?;
        info!(
            node_id = %record.node_id,
            address = %record.address,
            port = record.port,
            name = %record.name,
            "node registered"
        );
        Ok(())
    }

    pub async fn get(&self, node_id: NodeId) -> ControlResult<NodeRecord> {
        self.table
            .get(&node_id)
            .await?
            .ok_or_else(|| ControlError::not_found("node", node_id))
    }

    pub async fn get_all(&self) -> ControlResult<Vec<NodeRecord>> {
        self.table.get_all().await
    }
}
