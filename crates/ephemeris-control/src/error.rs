//! Error types for ephemeris-control.

use std::time::Duration;

use ephemeris_proto::ProtocolError;
use ephemeris_state::{StateError, StoreError};

/// Result type alias using [`ControlError`].
pub type ControlResult<T> = Result<T, ControlError>;

/// Errors surfaced by the control plane.
#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    /// The addressed entity does not exist.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// An entity with this id already exists.
    #[error("{kind} already exists: {id}")]
    AlreadyExists { kind: &'static str, id: String },

    /// The table store failed. Surfaced unchanged from the backend.
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),

    /// The request could not be interpreted.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// No reply arrived within the caller's deadline.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// The control plane is not accepting requests.
    #[error("control plane unavailable: {0}")]
    Unavailable(String),

    /// Bring-up failed.
    #[error("startup failed: {0}")]
    Startup(String),

    /// The operation is not valid in the current lifecycle state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// HTTP transport failure talking to a remote control server.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ControlError {
    #[must_use]
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    #[must_use]
    pub fn already_exists(kind: &'static str, id: impl ToString) -> Self {
        Self::AlreadyExists {
            kind,
            id: id.to_string(),
        }
    }

    #[must_use]
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

impl From<ProtocolError> for ControlError {
    fn from(err: ProtocolError) -> Self {
        Self::InvalidArgument(err.to_string())
    }
}

impl From<StateError> for ControlError {
    fn from(err: StateError) -> Self {
        match err {
            StateError::Configuration(msg) | StateError::UnsupportedBackend(msg) => Self::Config(msg),
            StateError::Connection(msg) => Self::Startup(format!("table store unreachable: {msg}")),
        }
    }
}

impl From<figment::Error> for ControlError {
    fn from(err: figment::Error) -> Self {
        Self::Config(err.to_string())
    }
}
