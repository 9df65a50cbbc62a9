//! Tool error types.

use std::io;

use thiserror::Error;

/// Errors that can occur during tool execution.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Parameter validation failed.
    #[error("validation error: {message}")]
    Validation {
        /// Description of the validation failure.
        message: String,
    },

    /// Generic I/O error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// Operation timed out.
    #[error("timeout after {timeout_ms}ms")]
    Timeout {
        /// The timeout duration in milliseconds.
        timeout_ms: u64,
    },

    /// Operation was cancelled.
    #[error("cancelled")]
    Cancelled,

    /// A subprocess could not be started.
    #[error("failed to spawn process: {message}")]
    Spawn {
        /// Underlying failure.
        message: String,
    },

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Tool not found in registry.
    #[error("tool not found: {name}")]
    ToolNotFound {
        /// The tool name that was not found.
        name: String,
    },

    /// Internal error (catch-all).
    #[error("{message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl ToolError {
    /// Short classification string for logs and audit details.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation",
            Self::Io(_) => "io",
            Self::Timeout { .. } => "timeout",
            Self::Cancelled => "cancelled",
            Self::Spawn { .. } => "spawn",
            Self::Json(_) => "json",
            Self::ToolNotFound { .. } => "tool_not_found",
            Self::Internal { .. } => "internal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_display() {
        let err = ToolError::Validation {
            message: "missing required parameter".into(),
        };
        assert_eq!(
            err.to_string(),
            "validation error: missing required parameter"
        );
        assert_eq!(err.category(), "validation");
    }

    #[test]
    fn timeout_display() {
        let err = ToolError::Timeout { timeout_ms: 5000 };
        assert_eq!(err.to_string(), "timeout after 5000ms");
    }

    #[test]
    fn io_from_conversion() {
        let err: ToolError = io::Error::new(io::ErrorKind::NotFound, "gone").into();
        assert_eq!(err.category(), "io");
        assert!(err.to_string().contains("gone"));
    }
}
