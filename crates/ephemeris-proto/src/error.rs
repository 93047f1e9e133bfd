//! Error types for the entity codec.

use thiserror::Error;

/// Codec and identifier errors.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Record exceeded the maximum encoded size.
    #[error("record too large: {size} bytes (max {max})")]
    RecordTooLarge { size: usize, max: usize },

    /// Identifier bytes had the wrong width.
    #[error("invalid {kind} length: expected {expected} bytes, got {actual}")]
    InvalidIdLength {
        kind: &'static str,
        expected: usize,
        actual: usize,
    },

    /// Identifier text could not be parsed.
    #[error("invalid {kind}: {reason}")]
    InvalidId { kind: &'static str, reason: String },

    /// Serialisation error.
    #[error("serialisation error: {0}")]
    Serialisation(String),

    /// Deserialisation error.
    #[error("deserialisation error: {0}")]
    Deserialisation(String),
}
