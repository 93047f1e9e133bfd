use ephemeris_proto::PlacementGroupRecord;
use tracing::info;

use crate::error::ControlResult;
use crate::storage::Table;

/// Placement groups. Records are inserted by the scheduling collaborator;
/// this registry only stores and lists them.
pub struct PlacementGroupRegistry {
    table: Table<PlacementGroupRecord>,
}

impl PlacementGroupRegistry {
    pub fn new(table: Table<PlacementGroupRecord>) -> Self {
        Self { table }
    }

    pub async fn add(&self, record: &PlacementGroupRecord) -> ControlResult<()> {
        self.table.put(record).await?;
        info!(
            placement_group_id = %record.placement_group_id,
            name = %record.name,
            bundles = record.bundles.len(),
            "placement group added"
        );
        Ok(())
    }

    pub async fn get_all(&self) -> ControlResult<Vec<PlacementGroupRecord>> {
        self.table.get_all().await
    }
}
