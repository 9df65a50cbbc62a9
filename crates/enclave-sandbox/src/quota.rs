//! Storage quota accounting.
//!
//! Checks are advisory and non-reserving: sizes are recomputed from disk on
//! every check, so two concurrent writers may both pass.

use enclave_settings::StorageSettings;
use serde::Serialize;
use tracing::debug;

use crate::errors::{QuotaCeiling, Result, SandboxError};
use crate::workspace::WorkspaceManager;

/// Configured storage ceilings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct QuotaLimits {
    /// Largest single write.
    pub max_file_bytes: u64,
    /// Ceiling per session workspace.
    pub max_workspace_bytes: u64,
    /// Ceiling per tenant.
    pub max_tenant_bytes: u64,
    /// Concurrent active sessions per tenant.
    pub max_sessions_per_tenant: usize,
}

impl From<&StorageSettings> for QuotaLimits {
    fn from(s: &StorageSettings) -> Self {
        Self {
            max_file_bytes: s.max_file_bytes,
            max_workspace_bytes: s.max_workspace_bytes,
            max_tenant_bytes: s.max_tenant_bytes,
            max_sessions_per_tenant: s.max_sessions_per_tenant,
        }
    }
}

/// Point-in-time storage usage for one workspace and its tenant.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct QuotaUsage {
    /// Bytes used by the session workspace.
    pub workspace_bytes: u64,
    /// Workspace ceiling.
    pub workspace_limit: u64,
    /// Bytes used by all of the tenant's workspaces.
    pub tenant_bytes: u64,
    /// Tenant ceiling.
    pub tenant_limit: u64,
}

/// Enforces per-file, per-workspace and per-tenant ceilings plus the
/// per-tenant session limit.
#[derive(Clone, Debug)]
pub struct QuotaAccountant {
    workspaces: WorkspaceManager,
    limits: QuotaLimits,
}

impl QuotaAccountant {
    /// Accountant measuring workspaces under `workspaces`.
    pub fn new(workspaces: WorkspaceManager, limits: QuotaLimits) -> Self {
        Self { workspaces, limits }
    }

    /// The configured limits.
    pub fn limits(&self) -> QuotaLimits {
        self.limits
    }

    /// Check that writing `incoming` bytes fits every ceiling.
    ///
    /// Evaluated in order: file, workspace, tenant. The first violation wins.
    pub fn check_upload(&self, tenant_id: &str, session_id: &str, incoming: u64) -> Result<()> {
        let exceeded = |ceiling, current, limit| SandboxError::QuotaExceeded {
            ceiling,
            current,
            requested: incoming,
            limit,
        };

        if incoming > self.limits.max_file_bytes {
            return Err(exceeded(QuotaCeiling::File, 0, self.limits.max_file_bytes));
        }

        let workspace = self.workspaces.size(tenant_id, session_id)?;
        if workspace.saturating_add(incoming) > self.limits.max_workspace_bytes {
            return Err(exceeded(
                QuotaCeiling::Workspace,
                workspace,
                self.limits.max_workspace_bytes,
            ));
        }

        let tenant = self.workspaces.tenant_size(tenant_id)?;
        if tenant.saturating_add(incoming) > self.limits.max_tenant_bytes {
            return Err(exceeded(
                QuotaCeiling::Tenant,
                tenant,
                self.limits.max_tenant_bytes,
            ));
        }

        debug!(tenant_id, session_id, incoming, workspace, tenant, "upload within quota");
        Ok(())
    }

    /// Fail when the tenant already has `max_sessions_per_tenant` active
    /// sessions.
    pub fn check_session_limit(&self, tenant_id: &str, active_sessions: usize) -> Result<()> {
        let limit = self.limits.max_sessions_per_tenant;
        if active_sessions >= limit {
            return Err(SandboxError::SessionLimitExceeded {
                tenant_id: tenant_id.to_owned(),
                active: active_sessions,
                limit,
            });
        }
        Ok(())
    }

    /// Current usage snapshot.
    pub fn usage(&self, tenant_id: &str, session_id: &str) -> Result<QuotaUsage> {
        Ok(QuotaUsage {
            workspace_bytes: self.workspaces.size(tenant_id, session_id)?,
            workspace_limit: self.limits.max_workspace_bytes,
            tenant_bytes: self.workspaces.tenant_size(tenant_id)?,
            tenant_limit: self.limits.max_tenant_bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn accountant(limits: QuotaLimits) -> (tempfile::TempDir, WorkspaceManager, QuotaAccountant) {
        let dir = tempfile::tempdir().unwrap();
        let mgr = WorkspaceManager::new(dir.path());
        let quota = QuotaAccountant::new(mgr.clone(), limits);
        (dir, mgr, quota)
    }

    fn limits(file: u64, workspace: u64, tenant: u64) -> QuotaLimits {
        QuotaLimits {
            max_file_bytes: file,
            max_workspace_bytes: workspace,
            max_tenant_bytes: tenant,
            max_sessions_per_tenant: 2,
        }
    }

    #[test]
    fn file_ceiling_checked_first() {
        let (_d, _m, quota) = accountant(limits(10, 5, 5));
        assert_matches!(
            quota.check_upload("t", "s", 11),
            Err(SandboxError::QuotaExceeded { ceiling: QuotaCeiling::File, current: 0, requested: 11, limit: 10 })
        );
    }

    #[test]
    fn workspace_ceiling_counts_existing_bytes() {
        let (_d, mgr, quota) = accountant(limits(1000, 100, 10_000));
        let root = mgr.create("t", "s").unwrap();
        std::fs::write(root.join("a.bin"), vec![0u8; 90]).unwrap();

        quota.check_upload("t", "s", 10).unwrap();
        assert_matches!(
            quota.check_upload("t", "s", 11),
            Err(SandboxError::QuotaExceeded { ceiling: QuotaCeiling::Workspace, current: 90, requested: 11, limit: 100 })
        );
    }

    #[test]
    fn tenant_ceiling_spans_sessions() {
        let (_d, mgr, quota) = accountant(limits(1000, 1000, 100));
        let other = mgr.create("t", "other").unwrap();
        std::fs::write(other.join("a.bin"), vec![0u8; 80]).unwrap();
        let _ = mgr.create("t", "s").unwrap();

        quota.check_upload("t", "s", 20).unwrap();
        assert_matches!(
            quota.check_upload("t", "s", 21),
            Err(SandboxError::QuotaExceeded { ceiling: QuotaCeiling::Tenant, current: 80, .. })
        );
        // a different tenant is unaffected
        quota.check_upload("u", "s", 21).unwrap();
    }

    #[test]
    fn sequential_uploads_until_first_failure() {
        let (_d, mgr, quota) = accountant(limits(40, 100, 10_000));
        let root = mgr.create("t", "s").unwrap();
        let mut written = 0;
        for i in 0..5 {
            match quota.check_upload("t", "s", 30) {
                Ok(()) => {
                    std::fs::write(root.join(format!("f{i}")), vec![0u8; 30]).unwrap();
                    written += 1;
                }
                Err(e) => {
                    assert_matches!(e, SandboxError::QuotaExceeded { ceiling: QuotaCeiling::Workspace, .. });
                    break;
                }
            }
        }
        assert_eq!(written, 3);
    }

    #[test]
    fn session_limit() {
        let (_d, _m, quota) = accountant(limits(1, 1, 1));
        quota.check_session_limit("t", 0).unwrap();
        quota.check_session_limit("t", 1).unwrap();
        assert_matches!(
            quota.check_session_limit("t", 2),
            Err(SandboxError::SessionLimitExceeded { active: 2, limit: 2, .. })
        );
    }

    #[test]
    fn usage_snapshot() {
        let (_d, mgr, quota) = accountant(limits(1000, 500, 5000));
        let root = mgr.create("t", "s").unwrap();
        std::fs::write(root.join("a"), vec![0u8; 7]).unwrap();
        let usage = quota.usage("t", "s").unwrap();
        assert_eq!(usage.workspace_bytes, 7);
        assert_eq!(usage.tenant_bytes, 7);
        assert_eq!(usage.workspace_limit, 500);
        assert_eq!(usage.tenant_limit, 5000);
    }

    #[test]
    fn limits_from_settings() {
        let l = QuotaLimits::from(&StorageSettings::default());
        assert_eq!(l.max_sessions_per_tenant, 10);
        assert_eq!(l.max_file_bytes, 50 * 1024 * 1024);
    }
}
