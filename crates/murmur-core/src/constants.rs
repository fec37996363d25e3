//! Package-level constants.

/// Current version of murmur (sourced from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Package name.
pub const NAME: &str = "murmur";

/// Default number of concurrent chat sessions.
pub const DEFAULT_MAX_CLIENTS: usize = 14;

/// Default size of the per-read buffer; one byte is kept in reserve, so a
/// single read yields at most `DEFAULT_READ_BUFFER_SIZE - 1` bytes.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 512;

/// Maximum nickname length, in characters.
pub const NICKNAME_MAX_CHARS: usize = 31;

/// Default bind host.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default chat port.
pub const DEFAULT_PORT: u16 = 56789;
