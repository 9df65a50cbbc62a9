//! Workspace location and storage quota settings.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

const MIB: u64 = 1024 * 1024;
const GIB: u64 = 1024 * MIB;

/// Default workspace base directory (`~/.enclave/workspaces`).
pub fn default_base_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".enclave").join("workspaces")
}

/// Storage quota ceilings and the workspace base directory.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StorageSettings {
    /// Directory under which `<tenant>/<session>` workspaces live.
    pub base_dir: PathBuf,
    /// Largest single write accepted.
    pub max_file_bytes: u64,
    /// Ceiling on one session workspace.
    pub max_workspace_bytes: u64,
    /// Ceiling on all of a tenant's workspaces together.
    pub max_tenant_bytes: u64,
    /// Concurrent active sessions allowed per tenant.
    pub max_sessions_per_tenant: usize,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
            max_file_bytes: 50 * MIB,
            max_workspace_bytes: 500 * MIB,
            max_tenant_bytes: 5 * GIB,
            max_sessions_per_tenant: 10,
        }
    }
}
