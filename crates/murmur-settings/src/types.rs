//! Settings types.
//!
//! Every struct uses `#[serde(default)]` so a partial settings file only has
//! to name the keys it changes. Keys are camelCase on disk.

use murmur_core::constants::{
    DEFAULT_HOST, DEFAULT_MAX_CLIENTS, DEFAULT_PORT, DEFAULT_READ_BUFFER_SIZE, NAME,
};
use murmur_core::logging::LogFormat;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Upper bound on `maxClients`; the readiness set is rebuilt every cycle.
pub const MAX_CLIENTS_LIMIT: usize = 1024;

/// Bounds on `readBufferSize`.
pub const READ_BUFFER_RANGE: (usize, usize) = (64, 65_536);

/// Upper bound on `pollTimeoutMs` (one hour).
pub const POLL_TIMEOUT_LIMIT_MS: i64 = 3_600_000;

/// Upper bound on `serverName` length, in bytes.
pub const SERVER_NAME_MAX_LEN: usize = 64;

/// Root settings object (`~/.murmur/settings.json`).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MurmurSettings {
    /// Chat server settings.
    pub server: ServerSettings,
    /// Log output settings.
    pub logging: LoggingSettings,
    /// Terminal client settings.
    pub client: ClientSettings,
}

impl MurmurSettings {
    /// Reject values the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        self.server.validate()?;
        self.client.validate()
    }
}

/// Chat server network and runtime settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Chat port. `0` asks the kernel for an ephemeral port.
    pub port: u16,
    /// Maximum number of concurrent sessions.
    pub max_clients: usize,
    /// Size of the per-read buffer; a read yields at most one byte less.
    pub read_buffer_size: usize,
    /// Pending-connection backlog passed to `listen`.
    pub listen_backlog: u32,
    /// Readiness wait bound: negative waits indefinitely, zero polls.
    pub poll_timeout_ms: i64,
    /// Name shown in the welcome line.
    pub server_name: String,
    /// Send a notice to every session before a graceful shutdown.
    pub announce_shutdown: bool,
    /// Prometheus exporter listen address; the exporter is off when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics_addr: Option<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            max_clients: DEFAULT_MAX_CLIENTS,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            // listen(2) backlog equals the session capacity
            listen_backlog: 14,
            poll_timeout_ms: -1,
            server_name: NAME.to_string(),
            announce_shutdown: true,
            metrics_addr: None,
        }
    }
}

impl ServerSettings {
    fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(invalid("server.host must not be empty"));
        }
        if self.max_clients == 0 || self.max_clients > MAX_CLIENTS_LIMIT {
            return Err(invalid(format!(
                "server.maxClients must be between 1 and {MAX_CLIENTS_LIMIT}, got {}",
                self.max_clients
            )));
        }
        let (min_buf, max_buf) = READ_BUFFER_RANGE;
        if self.read_buffer_size < min_buf || self.read_buffer_size > max_buf {
            return Err(invalid(format!(
                "server.readBufferSize must be between {min_buf} and {max_buf}, got {}",
                self.read_buffer_size
            )));
        }
        if self.listen_backlog == 0 || i32::try_from(self.listen_backlog).is_err() {
            return Err(invalid(format!(
                "server.listenBacklog must be a positive 32-bit value, got {}",
                self.listen_backlog
            )));
        }
        if self.poll_timeout_ms > POLL_TIMEOUT_LIMIT_MS {
            return Err(invalid(format!(
                "server.pollTimeoutMs must not exceed {POLL_TIMEOUT_LIMIT_MS}, got {}",
                self.poll_timeout_ms
            )));
        }
        if self.server_name.trim().is_empty() || self.server_name.len() > SERVER_NAME_MAX_LEN {
            return Err(invalid(format!(
                "server.serverName must be 1 to {SERVER_NAME_MAX_LEN} bytes"
            )));
        }
        if self.server_name.chars().any(char::is_control) {
            return Err(invalid("server.serverName must not contain control characters"));
        }
        Ok(())
    }
}

/// Log output settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Filter directive used when `RUST_LOG` is unset.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
        }
    }
}

/// Terminal client settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientSettings {
    /// Server host to connect to.
    pub host: String,
    /// Server port to connect to.
    pub port: u16,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl ClientSettings {
    fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(invalid("client.host must not be empty"));
        }
        if self.port == 0 {
            return Err(invalid("client.port must not be 0"));
        }
        Ok(())
    }
}

fn invalid(msg: impl Into<String>) -> SettingsError {
    SettingsError::InvalidValue(msg.into())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
