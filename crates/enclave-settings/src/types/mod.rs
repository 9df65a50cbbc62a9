//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase")]` for the JSON file
//! format and `#[serde(default)]` so partial files are accepted.

mod runtime;
mod sandbox;
mod storage;

pub use runtime::*;
pub use sandbox::*;
pub use storage::*;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type for the Enclave runtime.
///
/// ```json
/// {
///   "sandbox": { "mode": "strict", "blockedTools": ["run_shell"] },
///   "storage": { "maxFileBytes": 1048576 },
///   "runtime": { "mode": "direct" }
/// }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EnclaveSettings {
    /// Sandbox policy.
    pub sandbox: SandboxSettings,
    /// Workspace location and storage quotas.
    pub storage: StorageSettings,
    /// Runner pool and session execution.
    pub runtime: RuntimeSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

impl EnclaveSettings {
    /// Reject values that would make the runtime unusable.
    pub fn validate(&self) -> Result<()> {
        if self.runtime.max_runners == 0 {
            return Err(SettingsError::InvalidValue(
                "runtime.maxRunners must be positive".into(),
            ));
        }
        if self.runtime.max_steps_per_message == 0 {
            return Err(SettingsError::InvalidValue(
                "runtime.maxStepsPerMessage must be positive".into(),
            ));
        }
        if self.runtime.tool_timeout_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "runtime.toolTimeoutMs must be positive".into(),
            ));
        }
        if self.storage.base_dir.as_os_str().is_empty() {
            return Err(SettingsError::InvalidValue(
                "storage.baseDir must not be empty".into(),
            ));
        }
        Ok(())
    }
}

/// Logging configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of compact text.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "warn".into(),
            json: false,
        }
    }
}
