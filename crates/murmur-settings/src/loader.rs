//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`MurmurSettings::default()`]
//! 2. If the settings file exists, deep-merge user values over defaults
//! 3. Apply `MURMUR_*` environment variable overrides (highest priority)
//! 4. Validate the result
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::{MAX_CLIENTS_LIMIT, MurmurSettings, POLL_TIMEOUT_LIMIT_MS, READ_BUFFER_RANGE};

/// Resolve the path to the settings file (`~/.murmur/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".murmur").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<MurmurSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// If the file does not exist, returns defaults (plus overrides). If the file
/// contains invalid JSON, or the merged settings fail validation, returns an
/// error.
pub fn load_settings_from_path(path: &Path) -> Result<MurmurSettings> {
    let defaults = serde_json::to_value(MurmurSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: MurmurSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
///
/// - Objects are merged recursively (source overrides target per-key)
/// - Arrays and primitives are replaced entirely by source
/// - Null values in source are skipped (preserving target)
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `MURMUR_*` environment variable overrides to loaded settings.
pub fn apply_env_overrides(settings: &mut MurmurSettings) {
    apply_overrides(settings, |name| std::env::var(name).ok());
}

/// Apply overrides read through `lookup` (an environment-shaped key/value
/// source).
///
/// Each variable has strict parsing rules:
/// - Integers must be valid and within the specified range
/// - Booleans accept: `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`
/// - Empty strings are ignored
/// - Invalid values are ignored with a warning (fall back to file/default)
pub fn apply_overrides<F>(settings: &mut MurmurSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let env = EnvReader { lookup };

    // ── Server settings ─────────────────────────────────────────────
    if let Some(v) = env.string("MURMUR_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = env.u16("MURMUR_PORT", 0, 65535) {
        settings.server.port = v;
    }
    if let Some(v) = env.usize("MURMUR_MAX_CLIENTS", 1, MAX_CLIENTS_LIMIT) {
        settings.server.max_clients = v;
    }
    let (min_buf, max_buf) = READ_BUFFER_RANGE;
    if let Some(v) = env.usize("MURMUR_READ_BUFFER_SIZE", min_buf, max_buf) {
        settings.server.read_buffer_size = v;
    }
    if let Some(v) = env.u32("MURMUR_LISTEN_BACKLOG", 1, 65_535) {
        settings.server.listen_backlog = v;
    }
    if let Some(v) = env.i64("MURMUR_POLL_TIMEOUT_MS", -1, POLL_TIMEOUT_LIMIT_MS) {
        settings.server.poll_timeout_ms = v;
    }
    if let Some(v) = env.string("MURMUR_SERVER_NAME") {
        settings.server.server_name = v;
    }
    if let Some(v) = env.bool("MURMUR_ANNOUNCE_SHUTDOWN") {
        settings.server.announce_shutdown = v;
    }
    if let Some(v) = env.string("MURMUR_METRICS_ADDR") {
        settings.server.metrics_addr = Some(v);
    }

    // ── Logging settings ────────────────────────────────────────────
    if let Some(v) = env.string("MURMUR_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.string("MURMUR_LOG_FORMAT") {
        match v.parse() {
            Ok(format) => settings.logging.format = format,
            Err(_) => warn!(key = "MURMUR_LOG_FORMAT", value = %v, "invalid log format env var, ignoring"),
        }
    }

    // ── Client settings ─────────────────────────────────────────────
    if let Some(v) = env.string("MURMUR_CLIENT_HOST") {
        settings.client.host = v;
    }
    if let Some(v) = env.u16("MURMUR_CLIENT_PORT", 1, 65535) {
        settings.client.port = v;
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u32` within a range.
pub fn parse_u32_range(val: &str, min: u32, max: u32) -> Option<u32> {
    let n: u32 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as an `i64` within a range.
pub fn parse_i64_range(val: &str, min: i64, max: i64) -> Option<i64> {
    let n: i64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ── Variable readers (thin wrappers) ────────────────────────────────────────

struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn checked<T>(&self, name: &str, kind: &str, parse: impl FnOnce(&str) -> Option<T>) -> Option<T> {
        let val = (self.lookup)(name)?;
        let result = parse(&val);
        if result.is_none() {
            warn!(key = name, value = %val, kind, "invalid env var, ignoring");
        }
        result
    }

    fn bool(&self, name: &str) -> Option<bool> {
        self.checked(name, "bool", parse_bool)
    }

    fn u16(&self, name: &str, min: u16, max: u16) -> Option<u16> {
        self.checked(name, "u16", |v| parse_u16_range(v, min, max))
    }

    fn u32(&self, name: &str, min: u32, max: u32) -> Option<u32> {
        self.checked(name, "u32", |v| parse_u32_range(v, min, max))
    }

    fn i64(&self, name: &str, min: i64, max: i64) -> Option<i64> {
        self.checked(name, "i64", |v| parse_i64_range(v, min, max))
    }

    fn usize(&self, name: &str, min: usize, max: usize) -> Option<usize> {
        self.checked(name, "usize", |v| parse_usize_range(v, min, max))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
