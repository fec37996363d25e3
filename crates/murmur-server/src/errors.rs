//! Server error types.

use std::io;

use murmur_core::{CoreError, Readiness};
use thiserror::Error;

use crate::registry::Slot;

/// Errors from slot bookkeeping in the connection registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// Every slot holds an active session.
    #[error("registry full ({capacity} sessions)")]
    Full {
        /// Configured session capacity.
        capacity: usize,
    },
    /// The slot index is outside the registry.
    #[error("slot {slot} out of range (capacity {capacity})")]
    OutOfRange {
        /// Offending slot.
        slot: Slot,
        /// Configured session capacity.
        capacity: usize,
    },
    /// The slot already holds an active session.
    #[error("slot {0} is already occupied")]
    Occupied(Slot),
}

/// Fatal errors that stop the chat server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Could not create or bind the listening endpoint.
    #[error("failed to open listening endpoint: {0}")]
    Bind(#[from] CoreError),
    /// The listening endpoint reported an error, hang-up or invalid handle.
    #[error("listening endpoint failed ({readiness:?})")]
    ListenerFailed {
        /// Conditions reported for the listener.
        readiness: Readiness,
    },
    /// Installing signal handlers failed.
    #[error("failed to register signal handlers: {0}")]
    Signal(#[source] io::Error),
    /// Starting the Prometheus exporter failed.
    #[error("failed to start metrics exporter: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),
}

/// Result type for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;
