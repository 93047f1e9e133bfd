//! Typed access to the table store.
//!
//! Registries never touch keys or bytes directly; they go through a
//! [`Table`] bound to one entity type.

use std::marker::PhantomData;
use std::sync::Arc;

use ephemeris_proto::{Entity, EntityId, JobRecord, NodeRecord, PlacementGroupRecord, WorkerRecord};
use ephemeris_state::TableStore;

use crate::error::{ControlError, ControlResult};

/// Table holding cluster-wide singletons.
pub const CLUSTER_TABLE: &str = "CLUSTER";

/// Key of the persisted cluster id in [`CLUSTER_TABLE`].
pub const CLUSTER_ID_KEY: &[u8] = b"cluster_id";

/// Key of the job-id counter in [`CLUSTER_TABLE`].
pub const JOB_COUNTER_KEY: &[u8] = b"job_counter";

/// One table of records of type `E`.
pub struct Table<E> {
    store: Arc<dyn TableStore>,
    _entity: PhantomData<fn() -> E>,
}

impl<E> Clone for Table<E> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            _entity: PhantomData,
        }
    }
}

impl<E: Entity> Table<E> {
    pub fn new(store: Arc<dyn TableStore>) -> Self {
        Self {
            store,
            _entity: PhantomData,
        }
    }

    pub async fn put(&self, record: &E) -> ControlResult<()> {
        let bytes = record.encode()?;
        self.put_raw(&record.id(), &bytes).await
    }

    /// Stores already-encoded bytes unchanged.
    pub async fn put_raw(&self, id: &E::Id, bytes: &[u8]) -> ControlResult<()> {
        self.store.put(E::TABLE, &id.to_key(), bytes).await?;
        Ok(())
    }

    pub async fn get(&self, id: &E::Id) -> ControlResult<Option<E>> {
        self.get_raw(id)
            .await?
            .map(|bytes| decode_stored::<E>(&bytes))
            .transpose()
    }

    pub async fn get_raw(&self, id: &E::Id) -> ControlResult<Option<Vec<u8>>> {
        Ok(self.store.get(E::TABLE, &id.to_key()).await?)
    }

    pub async fn contains(&self, id: &E::Id) -> ControlResult<bool> {
        Ok(self.get_raw(id).await?.is_some())
    }

    /// Every record, in key order.
    pub async fn get_all(&self) -> ControlResult<Vec<E>> {
        self.get_all_raw()
            .await?
            .iter()
            .map(|bytes| decode_stored::<E>(bytes))
            .collect()
    }

    pub async fn get_all_raw(&self) -> ControlResult<Vec<Vec<u8>>> {
        let rows = self.store.get_all(E::TABLE).await?;
        Ok(rows.into_iter().map(|row| row.value).collect())
    }
}

/// Bytes already in the store failed to decode. That is corruption, not a
/// caller mistake.
fn decode_stored<E: Entity>(bytes: &[u8]) -> ControlResult<E> {
    E::decode(bytes).map_err(|e| ControlError::internal(format!("corrupt {} record: {e}", E::KIND)))
}

/// The tables owned by the entity registries.
#[derive(Clone)]
pub struct TableStorage {
    pub jobs: Table<JobRecord>,
    pub nodes: Table<NodeRecord>,
    pub workers: Table<WorkerRecord>,
    pub placement_groups: Table<PlacementGroupRecord>,
    store: Arc<dyn TableStore>,
}

impl TableStorage {
    pub fn new(store: Arc<dyn TableStore>) -> Self {
        Self {
            jobs: Table::new(Arc::clone(&store)),
            nodes: Table::new(Arc::clone(&store)),
            workers: Table::new(Arc::clone(&store)),
            placement_groups: Table::new(Arc::clone(&store)),
            store,
        }
    }

    /// Untyped access for the cluster singletons.
    pub fn store(&self) -> &Arc<dyn TableStore> {
        &self.store
    }
}
