//! # enclave-settings
//!
//! Layered configuration for the Enclave runtime.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`EnclaveSettings::default()`]
//! 2. **Settings file**: `~/.enclave/settings.json` or an explicit path,
//!    deep-merged over defaults
//! 3. **Environment variables**: `ENCLAVE_*` overrides (highest priority)
//!
//! Settings are passed explicitly to the components that need them; there is
//! no process-wide singleton.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, load_with_env, settings_path};
pub use types::*;
