//! # enclave-sandbox
//!
//! Confinement for agent tool calls: every path stays inside the session
//! workspace, writes respect storage quotas, and every call is audited.
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`workspace`] | Per-session workspace roots and path resolution |
//! | [`quota`] | File, workspace, tenant and session ceilings |
//! | [`audit`] | Append-only JSON-lines audit logs |
//! | [`guard`] | Dangerous shell command patterns |
//! | [`context`] | Immutable per-session sandbox policy |
//! | [`facade`] | [`SandboxedTool`] wrapper |
//! | [`toolkit`] | A session's wrapped tool set |

pub mod audit;
pub mod context;
pub mod errors;
pub mod facade;
pub mod guard;
pub mod quota;
pub mod toolkit;
pub mod workspace;

pub use audit::{
    AuditEvent, AuditEventType, AuditParams, AuditReader, AuditSeverity, AuditTrail,
    ToolCallRecord, sanitize_parameters,
};
pub use context::{CommandVerdict, ContextConfig, ExecutionContext};
pub use errors::{QuotaCeiling, SandboxError};
pub use facade::SandboxedTool;
pub use guard::CommandGuard;
pub use quota::{QuotaAccountant, QuotaLimits, QuotaUsage};
pub use toolkit::Toolkit;
pub use workspace::WorkspaceManager;
