//! Runner pool: bounded registry of session runners.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use enclave_sandbox::QuotaAccountant;
use futures::FutureExt;
use parking_lot::Mutex;
use tracing::{info, instrument, warn};

use crate::errors::{Result, RuntimeError};
use crate::runner::SessionRunner;
use crate::services::RuntimeServices;

/// Session id → runner, capped at `max_runners`.
pub struct RunnerPool {
    runners: Mutex<HashMap<String, Arc<SessionRunner>>>,
    max_runners: usize,
    quota: Option<Arc<QuotaAccountant>>,
}

impl RunnerPool {
    /// Pool without a tenant session limit.
    pub fn new(max_runners: usize) -> Self {
        Self {
            runners: Mutex::new(HashMap::new()),
            max_runners,
            quota: None,
        }
    }

    /// Enforce the per-tenant session limit through `quota`.
    #[must_use]
    pub fn with_quota(mut self, quota: Arc<QuotaAccountant>) -> Self {
        self.quota = Some(quota);
        self
    }

    /// Pool sized and limited by `services`.
    pub fn from_services(services: &RuntimeServices) -> Self {
        Self::new(services.settings.runtime.max_runners).with_quota(services.quota.clone())
    }

    /// Capacity.
    pub fn max_runners(&self) -> usize {
        self.max_runners
    }

    /// Register a runner.
    pub fn add(&self, runner: Arc<SessionRunner>) -> Result<()> {
        let mut runners = self.runners.lock();
        let session_id = runner.session_id().to_owned();
        if runners.contains_key(&session_id) {
            return Err(RuntimeError::DuplicateSession { session_id });
        }
        if runners.len() >= self.max_runners {
            return Err(RuntimeError::PoolFull {
                max_runners: self.max_runners,
            });
        }
        if let Some(quota) = &self.quota {
            let tenant_id = runner.tenant_id();
            let active = runners.values().filter(|r| r.tenant_id() == tenant_id).count();
            quota.check_session_limit(tenant_id, active)?;
        }
        let _ = runners.insert(session_id, runner);
        Ok(())
    }

    /// Look up a runner.
    pub fn get(&self, session_id: &str) -> Option<Arc<SessionRunner>> {
        self.runners.lock().get(session_id).cloned()
    }

    /// Unregister a runner. Does not stop it.
    pub fn remove(&self, session_id: &str) -> Option<Arc<SessionRunner>> {
        self.runners.lock().remove(session_id)
    }

    /// Whether a runner is registered.
    pub fn contains(&self, session_id: &str) -> bool {
        self.runners.lock().contains_key(session_id)
    }

    /// Number of runners.
    pub fn len(&self) -> usize {
        self.runners.lock().len()
    }

    /// Whether the pool is empty.
    pub fn is_empty(&self) -> bool {
        self.runners.lock().is_empty()
    }

    /// Sorted session ids.
    pub fn session_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.runners.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Runners belonging to `tenant_id`.
    pub fn count_for_tenant(&self, tenant_id: &str) -> usize {
        self.runners
            .lock()
            .values()
            .filter(|r| r.tenant_id() == tenant_id)
            .count()
    }

    /// Register and start a runner. A failed start unregisters it again.
    #[instrument(skip_all, fields(session_id = %runner.session_id(), tenant_id = %runner.tenant_id()))]
    pub async fn launch(
        &self,
        runner: Arc<SessionRunner>,
        initial_prompt: Option<&str>,
    ) -> Result<Arc<SessionRunner>> {
        self.add(runner.clone())?;
        if let Err(e) = runner.start(initial_prompt).await {
            let _ = self.remove(runner.session_id());
            warn!(error = %e, "runner failed to start");
            return Err(e);
        }
        Ok(runner)
    }

    /// Stop and unregister a runner; `false` when it was not pooled.
    pub async fn shutdown(&self, session_id: &str) -> bool {
        let Some(runner) = self.remove(session_id) else {
            return false;
        };
        let _ = runner.stop().await;
        true
    }

    /// Stop every runner, then clear the pool. Returns how many were
    /// running.
    #[instrument(skip_all)]
    pub async fn stop_all(&self) -> usize {
        let runners: Vec<Arc<SessionRunner>> = self.runners.lock().values().cloned().collect();
        let mut stopped = 0;
        for runner in &runners {
            match AssertUnwindSafe(runner.stop()).catch_unwind().await {
                Ok(true) => stopped += 1,
                Ok(false) => {}
                Err(_) => warn!(session_id = runner.session_id(), "runner panicked while stopping"),
            }
        }
        self.runners.lock().clear();
        info!(total = runners.len(), stopped, "runner pool stopped");
        stopped
    }
}

impl std::fmt::Debug for RunnerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunnerPool")
            .field("max_runners", &self.max_runners)
            .field("sessions", &self.session_ids())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use enclave_sandbox::SandboxError;
    use enclave_settings::{EnclaveSettings, RunnerMode};

    use super::*;
    use crate::agent::{Agent, AgentError, AgentFactory, AgentMessage, AgentSetup};
    use crate::runner::SessionRecord;
    use crate::sink::NullSink;

    struct Silent;

    #[async_trait]
    impl Agent for Silent {
        async fn step(&mut self, _m: AgentMessage) -> std::result::Result<Option<AgentMessage>, AgentError> {
            Ok(None)
        }
    }

    struct Factory;

    #[async_trait]
    impl AgentFactory for Factory {
        async fn create_agent(
            &self,
            agent_type: &str,
            _s: &str,
            _t: &str,
            _setup: AgentSetup,
        ) -> std::result::Result<Box<dyn Agent>, AgentError> {
            if agent_type == "broken" {
                return Err(AgentError::UnknownType(agent_type.into()));
            }
            Ok(Box::new(Silent))
        }
    }

    fn services(dir: &tempfile::TempDir, per_tenant: usize) -> Arc<RuntimeServices> {
        let mut settings = EnclaveSettings::default();
        settings.storage.base_dir = dir.path().to_path_buf();
        settings.storage.max_sessions_per_tenant = per_tenant;
        settings.runtime.max_runners = 3;
        Arc::new(RuntimeServices::new(settings, Arc::new(Factory), Vec::new()))
    }

    fn runner(services: &Arc<RuntimeServices>, session: &str, tenant: &str) -> Arc<SessionRunner> {
        Arc::new(SessionRunner::with_mode(
            SessionRecord::new(session, "silent", tenant),
            RunnerMode::Direct,
            services.clone(),
            Arc::new(NullSink),
        ))
    }

    #[test]
    fn capacity_and_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let svc = services(&dir, 10);
        let pool = RunnerPool::from_services(&svc);

        pool.add(runner(&svc, "a", "t1")).unwrap();
        assert_matches!(
            pool.add(runner(&svc, "a", "t2")),
            Err(RuntimeError::DuplicateSession { .. })
        );
        pool.add(runner(&svc, "b", "t1")).unwrap();
        pool.add(runner(&svc, "c", "t2")).unwrap();
        assert_matches!(
            pool.add(runner(&svc, "d", "t3")),
            Err(RuntimeError::PoolFull { max_runners: 3 })
        );
        assert_eq!(pool.session_ids(), vec!["a", "b", "c"]);
        assert_eq!(pool.count_for_tenant("t1"), 2);
        assert!(pool.remove("b").is_some());
        assert!(pool.get("b").is_none());
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn tenant_session_limit() {
        let dir = tempfile::tempdir().unwrap();
        let svc = services(&dir, 1);
        let pool = RunnerPool::from_services(&svc);
        pool.add(runner(&svc, "a", "t1")).unwrap();
        assert_matches!(
            pool.add(runner(&svc, "b", "t1")),
            Err(RuntimeError::Sandbox(SandboxError::SessionLimitExceeded { active: 1, limit: 1, .. }))
        );
        pool.add(runner(&svc, "c", "t2")).unwrap();
    }

    #[test]
    fn no_quota_no_tenant_limit() {
        let dir = tempfile::tempdir().unwrap();
        let svc = services(&dir, 1);
        let pool = RunnerPool::new(5);
        pool.add(runner(&svc, "a", "t1")).unwrap();
        pool.add(runner(&svc, "b", "t1")).unwrap();
    }

    #[tokio::test]
    async fn launch_failure_unregisters() {
        let dir = tempfile::tempdir().unwrap();
        let svc = services(&dir, 10);
        let pool = RunnerPool::from_services(&svc);
        let broken = Arc::new(SessionRunner::with_mode(
            SessionRecord::new("x", "broken", "t1"),
            RunnerMode::Direct,
            svc.clone(),
            Arc::new(NullSink),
        ));
        assert_matches!(pool.launch(broken, None).await, Err(RuntimeError::AgentCreation { .. }));
        assert!(pool.is_empty());
    }

    #[tokio::test]
    async fn stop_all_clears() {
        let dir = tempfile::tempdir().unwrap();
        let svc = services(&dir, 10);
        let pool = RunnerPool::from_services(&svc);
        let a = pool.launch(runner(&svc, "a", "t1"), None).await.unwrap();
        let _ = pool.launch(runner(&svc, "b", "t1"), None).await.unwrap();
        pool.add(runner(&svc, "idle", "t2")).unwrap();

        assert_eq!(pool.stop_all().await, 2);
        assert!(pool.is_empty());
        assert!(!a.is_running().await);
    }

    #[tokio::test]
    async fn shutdown_single() {
        let dir = tempfile::tempdir().unwrap();
        let svc = services(&dir, 10);
        let pool = RunnerPool::from_services(&svc);
        let a = pool.launch(runner(&svc, "a", "t1"), None).await.unwrap();
        assert!(pool.shutdown("a").await);
        assert!(!pool.shutdown("a").await);
        assert!(!a.is_running().await);
    }
}
