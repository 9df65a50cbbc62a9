//! Per-session execution context.
//!
//! An [`ExecutionContext`] bundles the sandbox policy and the service handles
//! one session's tools run against. It is built once when the session starts
//! and shared read-only (`Arc`) by every wrapped tool.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use enclave_core::tools::ToolCategory;
use enclave_settings::{SandboxMode, SandboxSettings};
use serde_json::{Map, Value, json};

use crate::audit::{AuditEvent, AuditSeverity, AuditTrail, ToolCallRecord};
use crate::errors::Result;
use crate::guard::CommandGuard;
use crate::quota::QuotaAccountant;
use crate::workspace;

/// Tools always blocked in strict mode.
pub const STRICT_DEFAULT_BLOCKED: [&str; 3] = ["process_start", "process_kill", "process_list"];

/// Outcome of screening a shell command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandVerdict {
    /// No pattern matched, or screening is disabled.
    Allowed,
    /// A pattern matched; permissive mode lets it run.
    Flagged(&'static str),
    /// A pattern matched; strict mode refuses it.
    Refused(&'static str),
}

/// Inputs for [`ExecutionContext::new`].
#[derive(Clone, Debug)]
pub struct ContextConfig {
    /// Tenant owning the session.
    pub tenant_id: String,
    /// Session id.
    pub session_id: String,
    /// Canonical workspace root.
    pub workspace_root: PathBuf,
    /// Sandbox policy.
    pub sandbox: SandboxSettings,
    /// Per tool call timeout.
    pub tool_timeout: Duration,
}

/// Immutable sandbox policy and service handles for one session.
#[derive(Debug)]
pub struct ExecutionContext {
    tenant_id: String,
    session_id: String,
    mode: SandboxMode,
    blocked_tools: HashSet<String>,
    tool_overrides: HashMap<String, Map<String, Value>>,
    workspace_root: PathBuf,
    tool_timeout: Duration,
    quota: Arc<QuotaAccountant>,
    audit: Arc<AuditTrail>,
    guard: CommandGuard,
}

impl ExecutionContext {
    /// Build the context. Strict mode adds the default process-control
    /// tools to the configured block-list.
    pub fn new(config: ContextConfig, quota: Arc<QuotaAccountant>, audit: Arc<AuditTrail>) -> Self {
        let mut blocked_tools: HashSet<String> = config.sandbox.blocked_tools.into_iter().collect();
        if config.sandbox.mode == SandboxMode::Strict {
            blocked_tools.extend(STRICT_DEFAULT_BLOCKED.iter().map(|s| (*s).to_owned()));
        }
        Self {
            tenant_id: config.tenant_id,
            session_id: config.session_id,
            mode: config.sandbox.mode,
            blocked_tools,
            tool_overrides: config.sandbox.tool_overrides,
            workspace_root: config.workspace_root,
            tool_timeout: config.tool_timeout,
            quota,
            audit,
            guard: CommandGuard::new(),
        }
    }

    // ── Accessors ───────────────────────────────────────────────────

    /// Tenant id.
    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    /// Session id.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Enforcement mode.
    pub fn mode(&self) -> SandboxMode {
        self.mode
    }

    /// Workspace root.
    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    /// Per tool call timeout.
    pub fn tool_timeout(&self) -> Duration {
        self.tool_timeout
    }

    /// The audit trail.
    pub fn audit(&self) -> &AuditTrail {
        &self.audit
    }

    /// The quota accountant.
    pub fn quota(&self) -> &QuotaAccountant {
        &self.quota
    }

    // ── Policy checks ───────────────────────────────────────────────

    /// Resolve a tool path parameter inside the workspace.
    ///
    /// Disabled mode joins relative paths to the root and passes absolute
    /// paths through unchecked.
    pub fn validate_path(&self, path: &str) -> Result<PathBuf> {
        if self.mode == SandboxMode::Disabled {
            let p = Path::new(path);
            return Ok(if p.is_absolute() {
                p.to_path_buf()
            } else {
                self.workspace_root.join(p)
            });
        }
        workspace::resolve(&self.workspace_root, path)
    }

    /// Check that writing `bytes` fits the storage quotas.
    pub fn check_upload(&self, bytes: u64) -> Result<()> {
        if self.mode == SandboxMode::Disabled {
            return Ok(());
        }
        self.quota.check_upload(&self.tenant_id, &self.session_id, bytes)
    }

    /// Whether the tool is on the block-list.
    pub fn is_blocked(&self, tool_name: &str) -> bool {
        self.mode != SandboxMode::Disabled && self.blocked_tools.contains(tool_name)
    }

    /// Sorted block-list.
    pub fn blocked_tools(&self) -> Vec<String> {
        let mut names: Vec<String> = self.blocked_tools.iter().cloned().collect();
        names.sort();
        names
    }

    /// Parameter overrides for a tool. Shell tools are always pinned to the
    /// workspace root, after configured overrides.
    pub fn get_overrides(&self, tool_name: &str, category: ToolCategory) -> Map<String, Value> {
        let mut overrides = self.tool_overrides.get(tool_name).cloned().unwrap_or_default();
        if category == ToolCategory::Shell {
            let _ = overrides.insert(
                "working_directory".into(),
                json!(self.workspace_root.display().to_string()),
            );
        }
        overrides
    }

    /// Screen a shell command according to the sandbox mode.
    pub fn screen_command(&self, command: &str) -> CommandVerdict {
        if self.mode == SandboxMode::Disabled {
            return CommandVerdict::Allowed;
        }
        match self.guard.screen(command) {
            None => CommandVerdict::Allowed,
            Some(pattern) if self.mode == SandboxMode::Permissive => CommandVerdict::Flagged(pattern),
            Some(pattern) => CommandVerdict::Refused(pattern),
        }
    }

    // ── Auditing ────────────────────────────────────────────────────

    /// Record a tool invocation for this session.
    pub fn log_tool_execution(&self, record: ToolCallRecord<'_>) -> AuditEvent {
        self.audit.log_tool_call(&self.tenant_id, &self.session_id, record)
    }

    /// Record a refused or flagged action for this session.
    pub fn log_security_violation(
        &self,
        action: &str,
        details: Value,
        severity: AuditSeverity,
    ) -> AuditEvent {
        self.audit
            .log_security_violation(&self.tenant_id, &self.session_id, action, details, severity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SandboxError;
    use crate::quota::QuotaLimits;
    use crate::workspace::WorkspaceManager;
    use assert_matches::assert_matches;

    fn context(sandbox: SandboxSettings) -> (tempfile::TempDir, ExecutionContext) {
        let dir = tempfile::tempdir().unwrap();
        let mgr = WorkspaceManager::new(dir.path());
        let root = mgr.create("t1", "s1").unwrap();
        let quota = Arc::new(QuotaAccountant::new(
            mgr.clone(),
            QuotaLimits {
                max_file_bytes: 10,
                max_workspace_bytes: 1_000_000,
                max_tenant_bytes: 1_000_000,
                max_sessions_per_tenant: 5,
            },
        ));
        let audit = Arc::new(AuditTrail::new(mgr));
        let ctx = ExecutionContext::new(
            ContextConfig {
                tenant_id: "t1".into(),
                session_id: "s1".into(),
                workspace_root: root,
                sandbox,
                tool_timeout: Duration::from_secs(5),
            },
            quota,
            audit,
        );
        (dir, ctx)
    }

    fn with_mode(mode: SandboxMode) -> SandboxSettings {
        SandboxSettings {
            mode,
            ..SandboxSettings::default()
        }
    }

    #[test]
    fn strict_adds_default_blocked_tools() {
        let (_d, ctx) = context(SandboxSettings {
            blocked_tools: vec!["delete_file".into()],
            ..SandboxSettings::default()
        });
        assert_eq!(
            ctx.blocked_tools(),
            vec!["delete_file", "process_kill", "process_list", "process_start"]
        );
        assert!(ctx.is_blocked("process_kill"));
        assert!(!ctx.is_blocked("read_file"));
    }

    #[test]
    fn permissive_keeps_only_configured_blocks() {
        let (_d, ctx) = context(with_mode(SandboxMode::Permissive));
        assert!(!ctx.is_blocked("process_kill"));
    }

    #[test]
    fn disabled_bypasses_checks() {
        let (_d, ctx) = context(SandboxSettings {
            mode: SandboxMode::Disabled,
            blocked_tools: vec!["read_file".into()],
            ..SandboxSettings::default()
        });
        assert!(!ctx.is_blocked("read_file"));
        assert_eq!(ctx.validate_path("/etc/passwd").unwrap(), PathBuf::from("/etc/passwd"));
        assert_eq!(ctx.validate_path("a.txt").unwrap(), ctx.workspace_root().join("a.txt"));
        ctx.check_upload(1_000).unwrap();
        assert_eq!(ctx.screen_command("rm -rf /"), CommandVerdict::Allowed);
    }

    #[test]
    fn strict_validates_paths_and_quota() {
        let (_d, ctx) = context(SandboxSettings::default());
        assert_matches!(ctx.validate_path("../x"), Err(SandboxError::PathEscape { .. }));
        assert_eq!(ctx.validate_path("a.txt").unwrap(), ctx.workspace_root().join("a.txt"));
        assert_matches!(ctx.check_upload(11), Err(SandboxError::QuotaExceeded { .. }));
    }

    #[test]
    fn screen_command_by_mode() {
        let (_d, strict) = context(SandboxSettings::default());
        assert_eq!(
            strict.screen_command("sudo reboot"),
            CommandVerdict::Refused("privilege_escalation")
        );
        assert_eq!(strict.screen_command("ls"), CommandVerdict::Allowed);

        let (_d2, permissive) = context(with_mode(SandboxMode::Permissive));
        assert_eq!(
            permissive.screen_command("sudo reboot"),
            CommandVerdict::Flagged("privilege_escalation")
        );
    }

    #[test]
    fn shell_overrides_pin_working_directory_last() {
        let mut overrides = HashMap::new();
        let _ = overrides.insert(
            "run_shell".to_owned(),
            serde_json::from_value::<Map<String, Value>>(json!({
                "working_directory": "/tmp",
                "timeout": 1000
            }))
            .unwrap(),
        );
        let (_d, ctx) = context(SandboxSettings {
            tool_overrides: overrides,
            ..SandboxSettings::default()
        });

        let shell = ctx.get_overrides("run_shell", ToolCategory::Shell);
        assert_eq!(shell["timeout"], 1000);
        assert_eq!(
            shell["working_directory"],
            ctx.workspace_root().display().to_string()
        );
        assert!(ctx.get_overrides("read_file", ToolCategory::Filesystem).is_empty());
    }
}
