//! Sandbox error types.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Which storage ceiling an upload ran into.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaCeiling {
    /// Single file size.
    File,
    /// Total size of one session workspace.
    Workspace,
    /// Total size of all of a tenant's workspaces.
    Tenant,
}

impl fmt::Display for QuotaCeiling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::File => "file",
            Self::Workspace => "workspace",
            Self::Tenant => "tenant",
        })
    }
}

/// Errors raised by workspace confinement, quotas and policy checks.
#[derive(Debug, Error)]
pub enum SandboxError {
    /// A path resolved outside its workspace root, or was absolute.
    #[error("path escapes workspace: {path}")]
    PathEscape {
        /// The offending input path.
        path: String,
    },

    /// An upload would exceed a storage ceiling.
    #[error("{ceiling} quota exceeded: {current} + {requested} bytes > {limit} bytes")]
    QuotaExceeded {
        /// The ceiling that was hit.
        ceiling: QuotaCeiling,
        /// Bytes already used against that ceiling (0 for the file ceiling).
        current: u64,
        /// Bytes the upload would add.
        requested: u64,
        /// The configured ceiling.
        limit: u64,
    },

    /// The tenant already has its maximum number of active sessions.
    #[error("tenant {tenant_id} has {active} active sessions (limit {limit})")]
    SessionLimitExceeded {
        /// Tenant identifier.
        tenant_id: String,
        /// Currently active sessions.
        active: usize,
        /// Configured limit.
        limit: usize,
    },

    /// The tool is on the block-list.
    #[error("tool blocked by sandbox policy: {tool_name}")]
    ToolBlocked {
        /// Blocked tool name.
        tool_name: String,
    },

    /// A shell command matched a dangerous pattern.
    #[error("dangerous command refused ({pattern})")]
    DangerousCommand {
        /// Name of the matched pattern.
        pattern: String,
    },

    /// A tenant or session id is not a single safe path component.
    #[error("invalid {kind} id: {value:?}")]
    InvalidId {
        /// `tenant` or `session`.
        kind: &'static str,
        /// The rejected value.
        value: String,
    },

    /// Refused to operate on a path not strictly beneath the base directory.
    #[error("refusing to operate outside the workspace base: {}", path.display())]
    OutsideBase {
        /// The offending path.
        path: PathBuf,
    },

    /// Filesystem failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl SandboxError {
    /// Short classification string for logs and audit details.
    pub fn category(&self) -> &'static str {
        match self {
            Self::PathEscape { .. } => "path_escape",
            Self::QuotaExceeded { .. } => "quota_exceeded",
            Self::SessionLimitExceeded { .. } => "session_limit_exceeded",
            Self::ToolBlocked { .. } => "tool_blocked",
            Self::DangerousCommand { .. } => "dangerous_command",
            Self::InvalidId { .. } => "invalid_id",
            Self::OutsideBase { .. } => "outside_base",
            Self::Io(_) => "io",
        }
    }

    /// Whether this error is a policy violation (as opposed to an
    /// infrastructure failure).
    pub fn is_violation(&self) -> bool {
        !matches!(self, Self::Io(_))
    }
}

/// Result type for sandbox operations.
pub type Result<T> = std::result::Result<T, SandboxError>;
