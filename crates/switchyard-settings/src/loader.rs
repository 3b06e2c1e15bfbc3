//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`SwitchyardSettings::default()`]
//! 2. If `<state dir>/settings.json` exists, deep-merge user values over defaults
//! 3. Apply `SWITCHYARD_*` environment overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::{Result, SettingsError};
use crate::types::SwitchyardSettings;

pub const STATE_DIR_ENV: &str = "SWITCHYARD_STATE_DIR";

/// Default state directory: `$SWITCHYARD_STATE_DIR`, else `~/.switchyard`.
pub fn default_state_dir() -> PathBuf {
    match std::env::var(STATE_DIR_ENV) {
        Ok(dir) if !dir.trim().is_empty() => PathBuf::from(expand_home(&dir)),
        _ => PathBuf::from(home_dir()).join(".switchyard"),
    }
}

/// Resolve the path to the settings file (`<state dir>/settings.json`).
pub fn settings_path() -> PathBuf {
    default_state_dir().join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<SwitchyardSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// If the file does not exist, returns defaults. If the file contains
/// invalid JSON, returns an error.
pub fn load_settings_from_path(path: &Path) -> Result<SwitchyardSettings> {
    let mut settings = load_file_layer(path)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

/// Defaults merged with the file at `path`, without env overrides.
pub fn load_file_layer(path: &Path) -> Result<SwitchyardSettings> {
    let defaults = serde_json::to_value(SwitchyardSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let user: Value = serde_json::from_str(&content).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
}

/// Recursive deep merge of two JSON values.
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

/// Apply environment variable overrides from the process environment.
pub fn apply_env_overrides(settings: &mut SwitchyardSettings) {
    apply_overrides_from(settings, |name| std::env::var(name).ok());
}

/// Apply overrides from an arbitrary lookup.
///
/// Split out for deterministic testing without mutating process env.
/// Invalid values are ignored with a warning (fall back to file/default).
pub fn apply_overrides_from<F>(settings: &mut SwitchyardSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let string = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
    let ranged = |name: &str, min: u64, max: u64| {
        let val = lookup(name)?;
        let result = parse_u64_range(&val, min, max);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid integer env var, ignoring");
        }
        result
    };

    if let Some(v) = string(STATE_DIR_ENV) {
        settings.state_dir = v;
    }
    if let Some(v) = ranged("SWITCHYARD_POLL_INTERVAL_MS", 10, 60_000) {
        settings.executor.poll_interval_ms = v;
    }
    if let Some(v) = ranged("SWITCHYARD_HEARTBEAT_INTERVAL_MS", 100, 600_000) {
        settings.executor.heartbeat_interval_ms = v;
    }
    if let Some(v) = ranged("SWITCHYARD_HEARTBEAT_STALE_MS", 200, 3_600_000) {
        settings.executor.heartbeat_stale_ms = v;
    }
    if let Some(v) = string("SWITCHYARD_CODEX_BIN") {
        settings.workers.codex.bin = v;
    }
    if let Some(v) = string("SWITCHYARD_OPENCODE_BIN") {
        settings.workers.opencode.bin = v;
    }
    if let Some(v) = string("SWITCHYARD_ARTIFACT_BASE") {
        settings.gateway.artifact_base_dir = Some(v);
    }
    if let Some(v) = string("SWITCHYARD_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(val) = lookup("SWITCHYARD_LOG_JSON") {
        match parse_bool(&val) {
            Some(v) => settings.logging.json = v,
            None => tracing::warn!(key = "SWITCHYARD_LOG_JSON", value = %val, "invalid boolean env var, ignoring"),
        }
    }
}

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Expand a leading `~` or `~/` to the home directory.
pub fn expand_home(path: &str) -> String {
    if path == "~" || path.starts_with("~/") {
        return path.replacen('~', &home_dir(), 1);
    }
    path.to_owned()
}

fn home_dir() -> String {
    std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string())
}
