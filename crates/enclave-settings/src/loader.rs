//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`EnclaveSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over defaults
//! 3. Apply `ENCLAVE_*` environment variable overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::EnclaveSettings;

/// Resolve the path to the settings file (`~/.enclave/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".enclave").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<EnclaveSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON or an invalid merged result
/// is an error.
pub fn load_settings_from_path(path: &Path) -> Result<EnclaveSettings> {
    load_with_env(path, |name| std::env::var(name).ok())
}

/// Load settings reading environment overrides through `env`.
pub fn load_with_env<F>(path: &Path, env: F) -> Result<EnclaveSettings>
where
    F: Fn(&str) -> Option<String>,
{
    let defaults = serde_json::to_value(EnclaveSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: EnclaveSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings, env);
    settings.validate()?;
    Ok(settings)
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

/// Apply `ENCLAVE_*` overrides looked up through `env`.
///
/// Invalid values are ignored with a warning and the file/default value is
/// kept.
pub fn apply_env_overrides<F>(settings: &mut EnclaveSettings, env: F)
where
    F: Fn(&str) -> Option<String>,
{
    let env = EnvReader { lookup: env };

    // ── Sandbox ─────────────────────────────────────────────────────
    if let Some(v) = env.parsed("ENCLAVE_SANDBOX_MODE") {
        settings.sandbox.mode = v;
    }
    if let Some(v) = env.string("ENCLAVE_BLOCKED_TOOLS") {
        settings.sandbox.blocked_tools = parse_list(&v);
    }
    if let Some(v) = env.string("ENCLAVE_TOOL_OVERRIDES") {
        match serde_json::from_str(&v) {
            Ok(overrides) => settings.sandbox.tool_overrides = overrides,
            Err(e) => warn!(key = "ENCLAVE_TOOL_OVERRIDES", error = %e, "invalid JSON env var, ignoring"),
        }
    }

    // ── Storage ─────────────────────────────────────────────────────
    if let Some(v) = env.string("ENCLAVE_WORKSPACE_ROOT") {
        settings.storage.base_dir = PathBuf::from(v);
    }
    if let Some(v) = env.u64_range("ENCLAVE_MAX_FILE_SIZE", 1, u64::MAX) {
        settings.storage.max_file_bytes = v;
    }
    if let Some(v) = env.u64_range("ENCLAVE_MAX_WORKSPACE_SIZE", 1, u64::MAX) {
        settings.storage.max_workspace_bytes = v;
    }
    if let Some(v) = env.u64_range("ENCLAVE_MAX_TENANT_SIZE", 1, u64::MAX) {
        settings.storage.max_tenant_bytes = v;
    }
    if let Some(v) = env.usize_range("ENCLAVE_MAX_SESSIONS_PER_TENANT", 1, 100_000) {
        settings.storage.max_sessions_per_tenant = v;
    }

    // ── Runtime ─────────────────────────────────────────────────────
    if let Some(v) = env.usize_range("ENCLAVE_MAX_RUNNERS", 1, 100_000) {
        settings.runtime.max_runners = v;
    }
    if let Some(v) = env.u64_range("ENCLAVE_TOOL_TIMEOUT_MS", 100, 3_600_000) {
        settings.runtime.tool_timeout_ms = v;
    }
    if let Some(v) = env.u64_range("ENCLAVE_STOP_GRACE_MS", 0, 600_000) {
        settings.runtime.stop_grace_ms = v;
    }
    if let Some(v) = env.parsed("ENCLAVE_RUNNER_MODE") {
        settings.runtime.mode = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = env.string("ENCLAVE_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.bool("ENCLAVE_LOG_JSON") {
        settings.logging.json = v;
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

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Split a comma-separated list, dropping blanks.
pub fn parse_list(val: &str) -> Vec<String> {
    val.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

// ── Env var readers (thin wrappers) ─────────────────────────────────────────

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

    fn bool(&self, name: &str) -> Option<bool> {
        let val = self.string(name)?;
        let result = parse_bool(&val);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid boolean env var, ignoring");
        }
        result
    }

    fn u64_range(&self, name: &str, min: u64, max: u64) -> Option<u64> {
        let val = self.string(name)?;
        let result = parse_u64_range(&val, min, max);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid u64 env var, ignoring");
        }
        result
    }

    fn usize_range(&self, name: &str, min: usize, max: usize) -> Option<usize> {
        let val = self.string(name)?;
        let result = parse_usize_range(&val, min, max);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid usize env var, ignoring");
        }
        result
    }

    fn parsed<T>(&self, name: &str) -> Option<T>
    where
        T: std::str::FromStr<Err = String>,
    {
        let val = self.string(name)?;
        match val.parse() {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(key = name, value = %val, error = %e, "invalid env var, ignoring");
                None
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
