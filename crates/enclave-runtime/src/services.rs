//! Shared services handed to every runner.

use std::sync::Arc;

use enclave_sandbox::{AuditTrail, QuotaAccountant, QuotaLimits, WorkspaceManager};
use enclave_settings::EnclaveSettings;
use enclave_tools::AgentTool;

use crate::agent::AgentFactory;

/// Settings plus the long-lived handles runners build sessions from.
pub struct RuntimeServices {
    /// Effective settings.
    pub settings: EnclaveSettings,
    /// Workspace roots under `settings.storage.base_dir`.
    pub workspaces: WorkspaceManager,
    /// Storage quota accountant.
    pub quota: Arc<QuotaAccountant>,
    /// Audit trail.
    pub audit: Arc<AuditTrail>,
    /// Builds agents per session.
    pub factory: Arc<dyn AgentFactory>,
    /// Unwrapped tools every session gets, sandboxed per session.
    pub tools: Vec<Arc<dyn AgentTool>>,
}

impl RuntimeServices {
    /// Services for `settings`.
    pub fn new(
        settings: EnclaveSettings,
        factory: Arc<dyn AgentFactory>,
        tools: Vec<Arc<dyn AgentTool>>,
    ) -> Self {
        let workspaces = WorkspaceManager::new(&settings.storage.base_dir);
        let quota = Arc::new(QuotaAccountant::new(
            workspaces.clone(),
            QuotaLimits::from(&settings.storage),
        ));
        let audit = Arc::new(AuditTrail::new(workspaces.clone()));
        Self {
            settings,
            workspaces,
            quota,
            audit,
            factory,
            tools,
        }
    }
}

impl std::fmt::Debug for RuntimeServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeServices")
            .field("base_dir", &self.workspaces.base_dir())
            .field("tools", &self.tools.iter().map(|t| t.name()).collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}
