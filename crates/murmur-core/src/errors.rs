//! Core error types.

use thiserror::Error;

/// Errors raised while setting up sockets and descriptors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// An underlying system call failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    /// A `host:port` pair did not resolve to any socket address.
    #[error("could not resolve {host}:{port}")]
    Unresolved {
        /// Host as given.
        host: String,
        /// Port as given.
        port: u16,
    },
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
