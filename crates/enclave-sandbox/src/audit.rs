//! Append-only audit trail.
//!
//! Every event is one JSON line in the session log at
//! `<workspace>/.meta/audit.log`. Events of severity `warning` or higher are
//! also appended to the global daily log at
//! `<base>/.audit/audit-YYYY-MM-DD.log`.
//!
//! Writes never fail the caller: an I/O error is reported through
//! `tracing::warn!` and the event is still returned.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Lines, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{SecondsFormat, Utc};
use enclave_core::ids::EventId;
use enclave_core::text::truncate_str;
use enclave_tools::FileOperation;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::warn;

use crate::workspace::{META_DIR, WorkspaceManager};

/// Session audit log file name inside the `.meta` directory.
pub const SESSION_LOG_FILE: &str = "audit.log";

/// Global log directory under the workspace base.
pub const GLOBAL_LOG_DIR: &str = ".audit";

/// Keys whose values are replaced with `[REDACTED]`.
const SENSITIVE_KEYS: &[&str] = &["password", "token", "secret", "key", "auth", "credential"];

/// Strings longer than this are truncated in audit details.
const MAX_STRING_LENGTH: usize = 500;

// ─────────────────────────────────────────────────────────────────────────────
// Event types
// ─────────────────────────────────────────────────────────────────────────────

/// Kind of audited activity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    /// A tool invocation (any outcome).
    ToolCall,
    /// A successful read through a file tool.
    FileRead,
    /// A successful write through a file tool.
    FileWrite,
    /// A successful delete through a file tool.
    FileDelete,
    /// A refused or flagged action.
    SecurityViolation,
    /// Session runner started.
    SessionStart,
    /// Session runner stopped.
    SessionEnd,
    /// Pause/resume and similar state changes.
    WorkflowTransition,
    /// Action initiated by the user.
    UserAction,
}

impl AuditEventType {
    /// Snake-case name as stored in the log.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ToolCall => "tool_call",
            Self::FileRead => "file_read",
            Self::FileWrite => "file_write",
            Self::FileDelete => "file_delete",
            Self::SecurityViolation => "security_violation",
            Self::SessionStart => "session_start",
            Self::SessionEnd => "session_end",
            Self::WorkflowTransition => "workflow_transition",
            Self::UserAction => "user_action",
        }
    }
}

impl fmt::Display for AuditEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditEventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_value(Value::String(s.trim().to_owned()))
            .map_err(|_| format!("unknown audit event type: {s}"))
    }
}

impl From<FileOperation> for AuditEventType {
    fn from(op: FileOperation) -> Self {
        match op {
            FileOperation::Read => Self::FileRead,
            FileOperation::Write => Self::FileWrite,
            FileOperation::Delete => Self::FileDelete,
        }
    }
}

/// Ordered severity. `Warning` and above reach the global log.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditSeverity {
    /// Diagnostic detail.
    Debug,
    /// Routine activity.
    Info,
    /// Refused or suspicious activity.
    Warning,
    /// Failures.
    Error,
    /// Escape attempts and dangerous commands.
    Critical,
}

/// One immutable audit record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// UUID v7 identifier.
    pub event_id: EventId,
    /// RFC 3339 UTC timestamp.
    pub timestamp: String,
    /// Kind of activity.
    pub event_type: AuditEventType,
    /// Severity.
    pub severity: AuditSeverity,
    /// Session the event belongs to.
    pub session_id: String,
    /// Tenant (user) the session belongs to.
    pub user_id: String,
    /// Short action name, e.g. the tool name.
    pub action: String,
    /// Structured, sanitized details.
    pub details: Value,
    /// Whether the action succeeded.
    pub success: bool,
    /// Error text for failed actions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Input for [`AuditTrail::log`].
#[derive(Clone, Debug)]
pub struct AuditParams {
    /// Kind of activity.
    pub event_type: AuditEventType,
    /// Severity.
    pub severity: AuditSeverity,
    /// Tenant id.
    pub tenant_id: String,
    /// Session id.
    pub session_id: String,
    /// Short action name.
    pub action: String,
    /// Details (sanitized before writing).
    pub details: Value,
    /// Outcome.
    pub success: bool,
    /// Error text.
    pub error: Option<String>,
}

/// Outcome of one tool call, for [`AuditTrail::log_tool_call`].
#[derive(Clone, Copy, Debug)]
pub struct ToolCallRecord<'a> {
    /// Tool name.
    pub tool_name: &'a str,
    /// Parameters as the tool received them.
    pub params: &'a Value,
    /// Whether the call succeeded.
    pub success: bool,
    /// Error text when it did not.
    pub error: Option<&'a str>,
    /// Wall-clock duration.
    pub duration_ms: u64,
}

// ─────────────────────────────────────────────────────────────────────────────
// Audit trail
// ─────────────────────────────────────────────────────────────────────────────

/// Writes and reads audit logs for workspaces under one base directory.
#[derive(Clone, Debug)]
pub struct AuditTrail {
    workspaces: WorkspaceManager,
}

impl AuditTrail {
    /// Audit trail over the given workspaces.
    pub fn new(workspaces: WorkspaceManager) -> Self {
        Self { workspaces }
    }

    /// Path of a session's audit log.
    pub fn session_log_path(&self, tenant_id: &str, session_id: &str) -> Option<PathBuf> {
        self.workspaces
            .root(tenant_id, session_id)
            .ok()
            .map(|root| root.join(META_DIR).join(SESSION_LOG_FILE))
    }

    /// Path of the global log for `date` (`YYYY-MM-DD`).
    pub fn global_log_path(&self, date: &str) -> PathBuf {
        self.workspaces
            .base_dir()
            .join(GLOBAL_LOG_DIR)
            .join(format!("audit-{date}.log"))
    }

    /// Record an event.
    pub fn log(&self, params: AuditParams) -> AuditEvent {
        let now = Utc::now();
        let event = AuditEvent {
            event_id: EventId::new(),
            timestamp: now.to_rfc3339_opts(SecondsFormat::Millis, true),
            event_type: params.event_type,
            severity: params.severity,
            session_id: params.session_id,
            user_id: params.tenant_id,
            action: params.action,
            details: sanitize_parameters(&params.details),
            success: params.success,
            error: params.error,
        };

        let line = match serde_json::to_string(&event) {
            Ok(mut line) => {
                line.push('\n');
                line
            }
            Err(e) => {
                warn!(error = %e, "failed to serialize audit event");
                return event;
            }
        };

        match self.session_log_path(&event.user_id, &event.session_id) {
            Some(path) => append_line(&path, &line),
            None => warn!(
                tenant_id = %event.user_id,
                session_id = %event.session_id,
                "invalid ids, audit event not written to session log"
            ),
        }

        if event.severity >= AuditSeverity::Warning {
            let date = now.format("%Y-%m-%d").to_string();
            append_line(&self.global_log_path(&date), &line);
        }

        event
    }

    /// Lazily read a session's events in write order.
    ///
    /// Malformed lines are skipped. Reading stops at `limit` matches or EOF.
    pub fn read(
        &self,
        tenant_id: &str,
        session_id: &str,
        filter_by_type: Option<AuditEventType>,
        limit: Option<usize>,
    ) -> AuditReader {
        let lines = self
            .session_log_path(tenant_id, session_id)
            .and_then(|path| File::open(path).ok())
            .map(|file| BufReader::new(file).lines());
        AuditReader {
            lines,
            filter: filter_by_type,
            remaining: limit.unwrap_or(usize::MAX),
        }
    }

    // ── Helpers ─────────────────────────────────────────────────────

    /// Record a tool invocation.
    pub fn log_tool_call(
        &self,
        tenant_id: &str,
        session_id: &str,
        record: ToolCallRecord<'_>,
    ) -> AuditEvent {
        self.log(AuditParams {
            event_type: AuditEventType::ToolCall,
            severity: if record.success {
                AuditSeverity::Info
            } else {
                AuditSeverity::Warning
            },
            tenant_id: tenant_id.to_owned(),
            session_id: session_id.to_owned(),
            action: record.tool_name.to_owned(),
            details: json!({
                "parameters": record.params,
                "durationMs": record.duration_ms,
            }),
            success: record.success,
            error: record.error.map(String::from),
        })
    }

    /// Record a refused or flagged action.
    pub fn log_security_violation(
        &self,
        tenant_id: &str,
        session_id: &str,
        action: &str,
        details: Value,
        severity: AuditSeverity,
    ) -> AuditEvent {
        self.log(AuditParams {
            event_type: AuditEventType::SecurityViolation,
            severity,
            tenant_id: tenant_id.to_owned(),
            session_id: session_id.to_owned(),
            action: action.to_owned(),
            details,
            success: false,
            error: None,
        })
    }

    /// Record a session lifecycle transition.
    pub fn log_lifecycle(
        &self,
        tenant_id: &str,
        session_id: &str,
        event_type: AuditEventType,
        action: &str,
        details: Value,
    ) -> AuditEvent {
        self.log(AuditParams {
            event_type,
            severity: AuditSeverity::Info,
            tenant_id: tenant_id.to_owned(),
            session_id: session_id.to_owned(),
            action: action.to_owned(),
            details,
            success: true,
            error: None,
        })
    }

    /// Record a successful file operation.
    pub fn log_file_operation(
        &self,
        tenant_id: &str,
        session_id: &str,
        operation: FileOperation,
        path: &str,
        tool_name: &str,
    ) -> AuditEvent {
        self.log(AuditParams {
            event_type: operation.into(),
            severity: AuditSeverity::Info,
            tenant_id: tenant_id.to_owned(),
            session_id: session_id.to_owned(),
            action: tool_name.to_owned(),
            details: json!({ "path": path }),
            success: true,
            error: None,
        })
    }
}

/// Append one line with a blocking write.
///
/// Lines are a few hundred bytes in append mode, and an event must be
/// readable as soon as `log` returns, so async callers write inline rather
/// than through `spawn_blocking`.
fn append_line(path: &Path, line: &str) {
    let result = (|| -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        file.write_all(line.as_bytes())
    })();
    if let Err(e) = result {
        warn!(path = %path.display(), error = %e, "failed to append audit event");
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Reader
// ─────────────────────────────────────────────────────────────────────────────

/// Finite iterator over a session audit log.
pub struct AuditReader {
    lines: Option<Lines<BufReader<File>>>,
    filter: Option<AuditEventType>,
    remaining: usize,
}

impl Iterator for AuditReader {
    type Item = AuditEvent;

    fn next(&mut self) -> Option<AuditEvent> {
        if self.remaining == 0 {
            return None;
        }
        let lines = self.lines.as_mut()?;
        loop {
            let line = match lines.next()? {
                Ok(line) => line,
                Err(e) => {
                    warn!(error = %e, "audit log read failed");
                    self.lines = None;
                    return None;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<AuditEvent>(&line) {
                Ok(event) if self.filter.is_none_or(|t| t == event.event_type) => {
                    self.remaining -= 1;
                    return Some(event);
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "skipping malformed audit line"),
            }
        }
    }
}

impl fmt::Debug for AuditReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuditReader")
            .field("open", &self.lines.is_some())
            .field("filter", &self.filter)
            .field("remaining", &self.remaining)
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Sanitization
// ─────────────────────────────────────────────────────────────────────────────

/// Redact sensitive values and truncate long strings, recursively.
///
/// Values under keys containing "password", "token", "secret", "key",
/// "auth" or "credential" become `"[REDACTED]"`. Strings longer than 500
/// bytes are cut with a `... [truncated]` suffix.
pub fn sanitize_parameters(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut sanitized = serde_json::Map::new();
            for (key, v) in map {
                let lower = key.to_lowercase();
                let out = if SENSITIVE_KEYS.iter().any(|s| lower.contains(s)) {
                    json!("[REDACTED]")
                } else {
                    sanitize_parameters(v)
                };
                let _ = sanitized.insert(key.clone(), out);
            }
            Value::Object(sanitized)
        }
        Value::Array(items) => Value::Array(items.iter().map(sanitize_parameters).collect()),
        Value::String(s) if s.len() > MAX_STRING_LENGTH => {
            let prefix = truncate_str(s, MAX_STRING_LENGTH);
            json!(format!("{prefix}... [truncated]"))
        }
        other => other.clone(),
    }
}
