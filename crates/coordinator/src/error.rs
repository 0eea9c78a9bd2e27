use std::time::Duration;

use concord_core::error::CoreError;
use concord_events::{BrokerError, EventError};
use concord_store::StoreError;

/// Coarse classification the transport layer maps onto its own status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Someone else holds the resource.
    Contention,
    /// The lock, record, or event does not exist.
    NotFound,
    /// Store or broker unreachable or too slow. Retrying later may succeed.
    Transient,
    /// Malformed input or configuration; rejected before any store call.
    Validation,
    /// Corrupt data or a misconfigured backend.
    Internal,
}

/// Coordinator-level error type.
///
/// Wraps [`CoreError`] for domain errors and the backend errors from the
/// store and broker crates.
#[derive(Debug, thiserror::Error)]
pub enum CoordError {
    /// A domain-level error from `concord_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A store call failed.
    #[error(transparent)]
    Store(StoreError),

    /// A store call did not finish within its deadline; its effect is unknown.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// The broker could not be set up.
    #[error(transparent)]
    Broker(#[from] BrokerError),
}

/// Convenience alias for coordinator results.
pub type CoordResult<T> = Result<T, CoordError>;

impl From<StoreError> for CoordError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Timeout(limit) => Self::Timeout(limit),
            other => Self::Store(other),
        }
    }
}

impl From<EventError> for CoordError {
    fn from(err: EventError) -> Self {
        match err {
            EventError::Validation(core) => Self::Core(core),
            EventError::Store(store) => store.into(),
        }
    }
}

impl CoordError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Core(CoreError::Validation(_)) => ErrorKind::Validation,
            Self::Core(CoreError::NotFound { .. }) => ErrorKind::NotFound,
            Self::Core(CoreError::Conflict(_)) => ErrorKind::Contention,
            Self::Timeout(_) => ErrorKind::Transient,
            Self::Store(e) if e.is_transient() => ErrorKind::Transient,
            Self::Store(_) => ErrorKind::Internal,
            Self::Broker(BrokerError::Unavailable(_) | BrokerError::Timeout(_)) => {
                ErrorKind::Transient
            }
            Self::Broker(_) => ErrorKind::Internal,
        }
    }

    /// Whether the caller may retry later.
    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }
}
