//! # murmur-settings
//!
//! Configuration management with layered sources for murmur.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`MurmurSettings::default()`]
//! 2. **User file**: `~/.murmur/settings.json` or an explicit path, deep-merged
//!    over defaults
//! 3. **Environment variables**: `MURMUR_*` overrides (highest priority)
//!
//! Command-line flags are applied on top by the binary. The merged result is
//! validated before it is returned.
//!
//! # Usage
//!
//! ```no_run
//! use murmur_settings::load_settings;
//!
//! let settings = load_settings().unwrap_or_default();
//! println!("chat port: {}", settings.server.port);
//! ```

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, apply_overrides, deep_merge, load_settings, load_settings_from_path,
    settings_path,
};
pub use types::{ClientSettings, LoggingSettings, MurmurSettings, ServerSettings};

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
