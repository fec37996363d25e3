//! Server configuration.

use murmur_core::Timeout;
use murmur_core::constants::{
    DEFAULT_HOST, DEFAULT_MAX_CLIENTS, DEFAULT_PORT, DEFAULT_READ_BUFFER_SIZE, NAME,
};
use murmur_settings::ServerSettings;
use serde::{Deserialize, Serialize};

use crate::message;

/// Configuration for the chat server.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind.
    pub host: String,
    /// Port to bind (`0` for auto-assign).
    pub port: u16,
    /// Maximum concurrent sessions.
    pub max_clients: usize,
    /// Per-read buffer size; one read yields at most `read_buffer_size - 1` bytes.
    pub read_buffer_size: usize,
    /// `listen(2)` backlog.
    pub listen_backlog: u32,
    /// Readiness wait bound in milliseconds (negative: wait indefinitely).
    pub poll_timeout_ms: i64,
    /// Name shown in the welcome line.
    pub server_name: String,
    /// Send a notice to every session before a graceful shutdown.
    pub announce_shutdown: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.into(),
            port: DEFAULT_PORT,
            max_clients: DEFAULT_MAX_CLIENTS,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            listen_backlog: 14,
            poll_timeout_ms: -1,
            server_name: NAME.into(),
            announce_shutdown: true,
        }
    }
}

impl From<&ServerSettings> for ServerConfig {
    fn from(s: &ServerSettings) -> Self {
        Self {
            host: s.host.clone(),
            port: s.port,
            max_clients: s.max_clients,
            read_buffer_size: s.read_buffer_size,
            listen_backlog: s.listen_backlog,
            poll_timeout_ms: s.poll_timeout_ms,
            server_name: s.server_name.clone(),
            announce_shutdown: s.announce_shutdown,
        }
    }
}

impl ServerConfig {
    /// The readiness wait bound.
    pub fn poll_timeout(&self) -> Timeout {
        Timeout::from_millis(self.poll_timeout_ms)
    }

    /// Backlog as passed to `listen(2)`, saturating at `i32::MAX`.
    pub fn backlog(&self) -> i32 {
        i32::try_from(self.listen_backlog).unwrap_or(i32::MAX)
    }

    /// Largest single read, keeping one byte of the buffer in reserve.
    pub fn read_limit(&self) -> usize {
        self.read_buffer_size.saturating_sub(1).max(1)
    }

    /// Capacity of the outbound message buffer, large enough for the longest
    /// line this configuration can produce.
    pub fn message_capacity(&self) -> usize {
        message::capacity_for(self.read_limit(), self.max_clients, &self.server_name)
    }
}
