//! Runtime error types.

use enclave_sandbox::SandboxError;

use crate::agent::AgentError;

/// Errors surfaced by the broker, runners and the pool.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// `start` on a runner that is already running.
    #[error("Session already running: {session_id}")]
    AlreadyRunning {
        /// Session id.
        session_id: String,
    },

    /// Operation needs a running session.
    #[error("Session not running: {session_id}")]
    NotRunning {
        /// Session id.
        session_id: String,
    },

    /// Messages are refused while the session is paused.
    #[error("Session paused: {session_id}")]
    AgentPaused {
        /// Session id.
        session_id: String,
    },

    /// The pool is at `max_runners`.
    #[error("Runner pool full ({max_runners} runners)")]
    PoolFull {
        /// Configured capacity.
        max_runners: usize,
    },

    /// A runner for this session is already pooled.
    #[error("Duplicate session: {session_id}")]
    DuplicateSession {
        /// Session id.
        session_id: String,
    },

    /// The broker could not be started.
    #[error("Broker start failed: {0}")]
    BrokerStartFailed(String),

    /// The broker is not started, or already stopped.
    #[error("Broker not started")]
    BrokerNotStarted,

    /// The agent factory failed.
    #[error("Agent creation failed for type '{agent_type}': {source}")]
    AgentCreation {
        /// Requested agent type.
        agent_type: String,
        /// Factory error.
        #[source]
        source: AgentError,
    },

    /// The agent failed while handling a message.
    #[error("Agent error: {0}")]
    Agent(#[from] AgentError),

    /// Workspace, quota or policy failure.
    #[error("Sandbox error: {0}")]
    Sandbox(#[from] SandboxError),
}

impl RuntimeError {
    /// Error category string for logs and events.
    pub fn category(&self) -> &'static str {
        match self {
            Self::AlreadyRunning { .. } => "already_running",
            Self::NotRunning { .. } => "not_running",
            Self::AgentPaused { .. } => "agent_paused",
            Self::PoolFull { .. } => "pool_full",
            Self::DuplicateSession { .. } => "duplicate_session",
            Self::BrokerStartFailed(_) => "broker_start_failed",
            Self::BrokerNotStarted => "broker_not_started",
            Self::AgentCreation { .. } => "agent_creation",
            Self::Agent(_) => "agent",
            Self::Sandbox(e) => e.category(),
        }
    }

    /// Whether the caller can retry the same operation later.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::AgentPaused { .. } | Self::PoolFull { .. } | Self::Agent(_) => true,
            Self::Sandbox(e) => matches!(e, SandboxError::SessionLimitExceeded { .. }),
            Self::AlreadyRunning { .. }
            | Self::NotRunning { .. }
            | Self::DuplicateSession { .. }
            | Self::BrokerStartFailed(_)
            | Self::BrokerNotStarted
            | Self::AgentCreation { .. } => false,
        }
    }
}

/// Result type for runtime operations.
pub type Result<T> = std::result::Result<T, RuntimeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sandbox_category_passes_through() {
        let err: RuntimeError = SandboxError::SessionLimitExceeded {
            tenant_id: "t".into(),
            active: 2,
            limit: 2,
        }
        .into();
        assert_eq!(err.category(), "session_limit_exceeded");
        assert!(err.is_recoverable());
    }

    #[test]
    fn lifecycle_errors() {
        let err = RuntimeError::NotRunning {
            session_id: "s1".into(),
        };
        assert_eq!(err.to_string(), "Session not running: s1");
        assert_eq!(err.category(), "not_running");
        assert!(!err.is_recoverable());
        assert_eq!(RuntimeError::PoolFull { max_runners: 3 }.category(), "pool_full");
    }

    #[test]
    fn agent_creation_keeps_source() {
        use std::error::Error as _;
        let err = RuntimeError::AgentCreation {
            agent_type: "x".into(),
            source: AgentError::UnknownType("x".into()),
        };
        assert!(err.source().is_some());
        assert_eq!(err.category(), "agent_creation");
    }
}
