//! Record encoding and decoding.
//!
//! Records are written to the table store as validated rkyv archives. Bytes
//! handed back by a backend carry no alignment guarantee, so [`decode`]
//! copies them into an aligned buffer before validating.

use rkyv::api::high::{HighDeserializer, HighSerializer, HighValidator};
use rkyv::bytecheck::CheckBytes;
use rkyv::rancor::Error as RkyvError;
use rkyv::ser::allocator::ArenaHandle;
use rkyv::util::AlignedVec;
use rkyv::{Archive, Deserialize, Serialize};

use crate::error::ProtocolError;
use crate::ids::{EntityId, JobId, NodeId, PlacementGroupId, WorkerId};
use crate::records::{JobRecord, NodeRecord, PlacementGroupRecord, WorkerRecord};

/// Maximum encoded record size (10 MB).
pub const MAX_RECORD_SIZE: usize = 10 * 1024 * 1024;

/// Encodes a record to bytes.
pub fn encode<T>(value: &T) -> Result<Vec<u8>, ProtocolError>
where
    T: for<'a> Serialize<HighSerializer<AlignedVec, ArenaHandle<'a>, RkyvError>>,
{
    let bytes =
        rkyv::to_bytes::<RkyvError>(value).map_err(|e| ProtocolError::Serialisation(e.to_string()))?;

    if bytes.len() > MAX_RECORD_SIZE {
        return Err(ProtocolError::RecordTooLarge {
            size: bytes.len(),
            max: MAX_RECORD_SIZE,
        });
    }

    Ok(bytes.to_vec())
}

/// Decodes a record from bytes of any alignment.
pub fn decode<T>(bytes: &[u8]) -> Result<T, ProtocolError>
where
    T: Archive,
    T::Archived: for<'a> CheckBytes<HighValidator<'a, RkyvError>> + Deserialize<T, HighDeserializer<RkyvError>>,
{
    let mut aligned = AlignedVec::<16>::with_capacity(bytes.len());
    aligned.extend_from_slice(bytes);
    rkyv::from_bytes::<T, RkyvError>(&aligned).map_err(|e| ProtocolError::Deserialisation(e.to_string()))
}

/// A record persisted in its own table, keyed by its identifier.
pub trait Entity: Sized + Clone + Send + Sync + 'static {
    /// Identifier type used as the table key.
    type Id: EntityId;

    /// Human-readable kind, used in errors and logs.
    const KIND: &'static str;

    /// Name of the table the record is stored in.
    const TABLE: &'static str;

    /// Returns the record's identifier.
    fn id(&self) -> Self::Id;

    /// Encodes the record.
    fn encode(&self) -> Result<Vec<u8>, ProtocolError>;

    /// Decodes a record.
    fn decode(bytes: &[u8]) -> Result<Self, ProtocolError>;
}

macro_rules! impl_entity {
    ($record:ty, $id:ty, $kind:literal, $table:literal, |$this:ident| $get_id:expr) => {
        impl Entity for $record {
            type Id = $id;

            const KIND: &'static str = $kind;
            const TABLE: &'static str = $table;

            fn id(&self) -> Self::Id {
                let $this = self;
                $get_id
            }

            fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
                encode(self)
            }

            fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
                decode(bytes)
            }
        }
    };
}

impl_entity!(JobRecord, JobId, "job", "JOB", |this| this.job_id);
impl_entity!(NodeRecord, NodeId, "node", "NODE", |this| this.node_id);
impl_entity!(WorkerRecord, WorkerId, "worker", "WORKERS", |this| this.address.worker_id);
impl_entity!(
    PlacementGroupRecord,
    PlacementGroupId,
    "placement group",
    "PLACEMENT_GROUP",
    |this| this.placement_group_id
);
