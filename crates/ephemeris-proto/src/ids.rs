//! Fixed-width identifiers for persisted entities.
//!
//! Every table is keyed by one of these. The key bytes written to the table
//! store are exactly [`EntityId::to_key`], so the widths here are part of the
//! persisted layout.

use std::fmt;
use std::hash::Hash;
use std::str::FromStr;

use rkyv::{Archive, Deserialize, Serialize};

use crate::error::ProtocolError;

/// Identifier that can be used as a table key.
pub trait EntityId:
    Copy + Eq + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static
{
    /// Human-readable kind, used in errors and logs.
    const KIND: &'static str;

    /// Encodes the identifier as a table key.
    fn to_key(&self) -> Vec<u8>;

    /// Decodes an identifier from a table key.
    fn from_key(key: &[u8]) -> Result<Self, ProtocolError>;
}

macro_rules! ulid_id {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Archive, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub [u8; 16]);

        impl $name {
            /// Width of the identifier in bytes.
            pub const SIZE: usize = 16;

            /// Generates a fresh identifier.
            #[must_use]
            pub fn new() -> Self {
                Self(ulid::Ulid::new().to_bytes())
            }

            /// The all-zero identifier.
            #[must_use]
            pub const fn nil() -> Self {
                Self([0u8; 16])
            }

            /// Returns true for the all-zero identifier.
            #[must_use]
            pub fn is_nil(&self) -> bool {
                self.0 == [0u8; 16]
            }

            /// Creates an identifier from raw bytes.
            #[must_use]
            pub const fn from_bytes(bytes: [u8; 16]) -> Self {
                Self(bytes)
            }

            /// Creates an identifier from a byte slice of exactly [`Self::SIZE`] bytes.
            pub fn from_slice(bytes: &[u8]) -> Result<Self, ProtocolError> {
                let raw: [u8; 16] =
                    bytes
                        .try_into()
                        .map_err(|_| ProtocolError::InvalidIdLength {
                            kind: $kind,
                            expected: Self::SIZE,
                            actual: bytes.len(),
                        })?;
                Ok(Self(raw))
            }

            /// Returns the raw bytes.
            #[must_use]
            pub const fn as_bytes(&self) -> &[u8; 16] {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", ulid::Ulid::from_bytes(self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self)
            }
        }

        impl FromStr for $name {
            type Err = ProtocolError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                ulid::Ulid::from_string(s)
                    .map(|u| Self(u.to_bytes()))
                    .map_err(|e| ProtocolError::InvalidId {
                        kind: $kind,
                        reason: e.to_string(),
                    })
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let text = String::deserialize(deserializer)?;
                text.parse().map_err(serde::de::Error::custom)
            }
        }

        impl EntityId for $name {
            const KIND: &'static str = $kind;

            fn to_key(&self) -> Vec<u8> {
                self.0.to_vec()
            }

            fn from_key(key: &[u8]) -> Result<Self, ProtocolError> {
                Self::from_slice(key)
            }
        }
    };
}

ulid_id!(
    /// Identifier of a registered node.
    NodeId,
    "node id"
);

ulid_id!(
    /// Identifier of a worker process.
    WorkerId,
    "worker id"
);

ulid_id!(
    /// Identifier of a placement group.
    PlacementGroupId,
    "placement group id"
);

ulid_id!(
    /// Identity of the cluster, persisted so it survives control-plane restarts.
    ClusterId,
    "cluster id"
);

/// Job identifier.
///
/// Assigned monotonically per submission. Encoded as a 4-byte big-endian key
/// so that table order matches submission order.
#[derive(Archive, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(pub u32);

impl JobId {
    /// Width of the identifier in bytes.
    pub const SIZE: usize = 4;

    /// Creates a job id from its sequence number.
    #[must_use]
    pub const fn from_int(value: u32) -> Self {
        Self(value)
    }

    /// Returns the sequence number.
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

impl fmt::Debug for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "JobId({self})")
    }
}

impl FromStr for JobId {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        u32::from_str_radix(s, 16)
            .map(Self)
            .map_err(|e| ProtocolError::InvalidId {
                kind: "job id",
                reason: e.to_string(),
            })
    }
}

impl serde::Serialize for JobId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u32(self.0)
    }
}

impl<'de> serde::Deserialize<'de> for JobId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        u32::deserialize(deserializer).map(Self)
    }
}

impl EntityId for JobId {
    const KIND: &'static str = "job id";

    fn to_key(&self) -> Vec<u8> {
        self.0.to_be_bytes().to_vec()
    }

    fn from_key(key: &[u8]) -> Result<Self, ProtocolError> {
        let raw: [u8; 4] = key.try_into().map_err(|_| ProtocolError::InvalidIdLength {
            kind: Self::KIND,
            expected: Self::SIZE,
            actual: key.len(),
        })?;
        Ok(Self(u32::from_be_bytes(raw)))
    }
}
