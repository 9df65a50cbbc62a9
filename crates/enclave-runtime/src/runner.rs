//! Session runner.
//!
//! Owns one session's lifecycle: workspace, sandbox context, agent, and the
//! execution strategy. In broker mode messages go through a
//! [`SessionBroker`] with a tool loop; in direct mode each message is a
//! single awaited agent step whose reply goes straight to the sink.

use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use enclave_sandbox::{AuditEventType, ContextConfig, ExecutionContext, QuotaUsage, Toolkit};
use enclave_settings::RunnerMode;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

use crate::agent::{Agent, AgentError, AgentMessage, AgentSetup};
use crate::broker::{BrokerConfig, BrokerStats, SessionBroker};
use crate::controller::reply_payloads;
use crate::errors::{Result, RuntimeError};
use crate::payload::BusPayload;
use crate::services::RuntimeServices;
use crate::sink::{EventSink, deliver_guarded};
use crate::transform::{ExternalEvent, transform_event};

/// Opaque session record supplied by the persistence layer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    /// Session id.
    pub id: String,
    /// Agent type passed to the factory.
    pub agent_type: String,
    /// Owning tenant.
    pub user_id: String,
    /// Workspace root, once created.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_path: Option<PathBuf>,
}

impl SessionRecord {
    /// Record without a workspace yet.
    pub fn new(
        id: impl Into<String>,
        agent_type: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            agent_type: agent_type.into(),
            user_id: user_id.into(),
            workspace_path: None,
        }
    }
}

/// How a running session drives its agent.
enum Strategy {
    Broker(SessionBroker),
    Direct(Box<dyn Agent>),
}

#[derive(Default)]
struct RunnerState {
    running: bool,
    paused: bool,
    sequence: u64,
    strategy: Option<Strategy>,
    workspace: Option<PathBuf>,
}

/// Point-in-time runner snapshot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunnerStats {
    /// Session id.
    pub session_id: String,
    /// Tenant id.
    pub tenant_id: String,
    /// Agent type.
    pub agent_type: String,
    /// Running flag.
    pub running: bool,
    /// Paused flag.
    pub paused: bool,
    /// Execution strategy.
    pub mode: RunnerMode,
    /// Workspace root.
    pub workspace_path: Option<PathBuf>,
    /// Messages accepted so far.
    pub sequence: u64,
    /// Broker snapshot in broker mode.
    pub broker: Option<BrokerStats>,
    /// Storage usage when a workspace exists.
    pub quota: Option<QuotaUsage>,
}

/// Runs one session.
pub struct SessionRunner {
    record: SessionRecord,
    mode: RunnerMode,
    services: Arc<RuntimeServices>,
    sink: Arc<dyn EventSink>,
    state: Mutex<RunnerState>,
}

impl SessionRunner {
    /// Runner for `record` using the configured default mode.
    pub fn new(record: SessionRecord, services: Arc<RuntimeServices>, sink: Arc<dyn EventSink>) -> Self {
        let mode = services.settings.runtime.mode;
        Self::with_mode(record, mode, services, sink)
    }

    /// Runner with an explicit strategy.
    pub fn with_mode(
        record: SessionRecord,
        mode: RunnerMode,
        services: Arc<RuntimeServices>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            record,
            mode,
            services,
            sink,
            state: Mutex::new(RunnerState::default()),
        }
    }

    /// Session id.
    pub fn session_id(&self) -> &str {
        &self.record.id
    }

    /// Owning tenant.
    pub fn tenant_id(&self) -> &str {
        &self.record.user_id
    }

    /// Execution strategy.
    pub fn mode(&self) -> RunnerMode {
        self.mode
    }

    /// The session record, with the workspace path once started.
    pub async fn record(&self) -> SessionRecord {
        let state = self.state.lock().await;
        SessionRecord {
            workspace_path: state.workspace.clone(),
            ..self.record.clone()
        }
    }

    /// Whether the session is running.
    pub async fn is_running(&self) -> bool {
        self.state.lock().await.running
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    /// Create the workspace, build the sandboxed tools and the agent, and
    /// start the strategy. On failure the runner stays stopped.
    #[instrument(skip_all, fields(session_id = %self.record.id, tenant_id = %self.record.user_id, mode = %self.mode))]
    pub async fn start(&self, initial_prompt: Option<&str>) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.running {
            return Err(RuntimeError::AlreadyRunning {
                session_id: self.record.id.clone(),
            });
        }

        let services = &self.services;
        let settings = &services.settings;
        let root = services.workspaces.create(&self.record.user_id, &self.record.id)?;

        let ctx = Arc::new(ExecutionContext::new(
            ContextConfig {
                tenant_id: self.record.user_id.clone(),
                session_id: self.record.id.clone(),
                workspace_root: root.clone(),
                sandbox: settings.sandbox.clone(),
                tool_timeout: Duration::from_millis(settings.runtime.tool_timeout_ms),
            },
            services.quota.clone(),
            services.audit.clone(),
        ));
        let toolkit = Toolkit::new(ctx, services.tools.clone());
        let tool_names: Vec<String> = toolkit.names().into_iter().map(String::from).collect();

        let agent = services
            .factory
            .create_agent(
                &self.record.agent_type,
                &self.record.id,
                &self.record.user_id,
                AgentSetup {
                    workspace: root.clone(),
                    tools: toolkit.registry(),
                },
            )
            .await
            .map_err(|source| RuntimeError::AgentCreation {
                agent_type: self.record.agent_type.clone(),
                source,
            })?;

        // Whatever the agent offers runs through this session's sandbox.
        let tools = agent.tool_registry().map(|registry| Arc::new(toolkit.confine(&registry)));

        let strategy = match self.mode {
            RunnerMode::Broker => {
                let mut broker = SessionBroker::new(
                    BrokerConfig {
                        session_id: self.record.id.clone(),
                        workspace: root.clone(),
                        max_steps_per_message: settings.runtime.max_steps_per_message,
                        stop_grace: Duration::from_millis(settings.runtime.stop_grace_ms),
                        tools,
                    },
                    agent,
                    self.sink.clone(),
                );
                broker.start()?;
                Strategy::Broker(broker)
            }
            RunnerMode::Direct => Strategy::Direct(agent),
        };

        state.strategy = Some(strategy);
        state.running = true;
        state.paused = false;
        state.workspace = Some(root.clone());

        let _ = services.audit.log_lifecycle(
            &self.record.user_id,
            &self.record.id,
            AuditEventType::SessionStart,
            "session_start",
            json!({
                "mode": self.mode,
                "agentType": self.record.agent_type,
                "workspace": root.display().to_string(),
                "tools": tool_names,
            }),
        );
        self.emit(ExternalEvent::new(
            "session_started",
            &self.record.id,
            json!({
                "mode": self.mode,
                "workspacePath": root.display().to_string(),
                "tools": tool_names,
            }),
        ))
        .await;
        info!("session started");

        if let Some(prompt) = initial_prompt.filter(|p| !p.trim().is_empty()) {
            if let Err(e) = self.send_locked(&mut state, prompt).await {
                warn!(error = %e, "initial prompt failed, stopping session");
                let _ = self.stop_locked(&mut state).await;
                return Err(e);
            }
        }
        Ok(())
    }

    /// Send user text; returns the runner's message sequence number.
    pub async fn send_message(&self, text: &str) -> Result<u64> {
        let mut state = self.state.lock().await;
        self.send_locked(&mut state, text).await
    }

    /// Pause; `false` when already paused.
    pub async fn pause(&self) -> Result<bool> {
        self.set_paused(true).await
    }

    /// Resume; `false` when not paused.
    pub async fn resume(&self) -> Result<bool> {
        self.set_paused(false).await
    }

    /// Stop the session; `false` when it was not running.
    #[instrument(skip_all, fields(session_id = %self.record.id))]
    pub async fn stop(&self) -> bool {
        let mut state = self.state.lock().await;
        self.stop_locked(&mut state).await
    }

    /// Stop and delete the workspace; returns whether a workspace was removed.
    #[instrument(skip_all, fields(session_id = %self.record.id))]
    pub async fn teardown(&self) -> Result<bool> {
        let mut state = self.state.lock().await;
        let _ = self.stop_locked(&mut state).await;
        state.workspace = None;
        let removed = self
            .services
            .workspaces
            .destroy(&self.record.user_id, &self.record.id)?;
        info!(removed, "session torn down");
        Ok(removed)
    }

    /// Point-in-time snapshot.
    pub async fn get_stats(&self) -> RunnerStats {
        let state = self.state.lock().await;
        let broker = match &state.strategy {
            Some(Strategy::Broker(b)) => Some(b.stats()),
            _ => None,
        };
        let quota = state.workspace.as_ref().and_then(|_| {
            self.services
                .quota
                .usage(&self.record.user_id, &self.record.id)
                .ok()
        });
        RunnerStats {
            session_id: self.record.id.clone(),
            tenant_id: self.record.user_id.clone(),
            agent_type: self.record.agent_type.clone(),
            running: state.running,
            paused: state.paused,
            mode: self.mode,
            workspace_path: state.workspace.clone(),
            sequence: state.sequence,
            broker,
            quota,
        }
    }

    // ── Internals ───────────────────────────────────────────────────

    async fn emit(&self, event: ExternalEvent) {
        let _ = deliver_guarded(self.sink.as_ref(), event).await;
    }

    async fn send_locked(&self, state: &mut RunnerState, text: &str) -> Result<u64> {
        if !state.running {
            return Err(RuntimeError::NotRunning {
                session_id: self.record.id.clone(),
            });
        }
        if state.paused {
            return Err(RuntimeError::AgentPaused {
                session_id: self.record.id.clone(),
            });
        }
        match state.strategy.as_mut() {
            Some(Strategy::Broker(broker)) => {
                let _ = broker.send_message(text)?;
            }
            Some(Strategy::Direct(agent)) => {
                state.sequence += 1;
                self.step_direct(agent.as_mut(), text).await?;
                return Ok(state.sequence);
            }
            None => {
                return Err(RuntimeError::NotRunning {
                    session_id: self.record.id.clone(),
                });
            }
        }
        state.sequence += 1;
        Ok(state.sequence)
    }

    async fn step_direct(&self, agent: &mut dyn Agent, text: &str) -> Result<()> {
        let message = AgentMessage::User {
            content: text.to_owned(),
        };
        let outcome = AssertUnwindSafe(agent.step(message)).catch_unwind().await;
        let error = match outcome {
            Ok(Ok(Some(reply))) => {
                for payload in reply_payloads(reply) {
                    self.emit(transform_event(&self.record.id, &payload)).await;
                }
                return Ok(());
            }
            Ok(Ok(None)) => return Ok(()),
            Ok(Err(e)) => e,
            Err(_) => AgentError::Internal("agent panicked while handling the message".into()),
        };
        warn!(session_id = %self.record.id, error = %error, "direct agent step failed");
        self.emit(transform_event(
            &self.record.id,
            &BusPayload::error("agent", error.to_string()),
        ))
        .await;
        Err(error.into())
    }

    async fn set_paused(&self, paused: bool) -> Result<bool> {
        let mut state = self.state.lock().await;
        if !state.running {
            return Err(RuntimeError::NotRunning {
                session_id: self.record.id.clone(),
            });
        }
        if state.paused == paused {
            return Ok(false);
        }
        state.paused = paused;

        let (from, to, action) = if paused {
            ("running", "paused", "pause")
        } else {
            ("paused", "running", "resume")
        };
        let _ = self.services.audit.log_lifecycle(
            &self.record.user_id,
            &self.record.id,
            AuditEventType::WorkflowTransition,
            action,
            json!({"from": from, "to": to}),
        );
        self.emit(ExternalEvent::new(
            if paused { "session_paused" } else { "session_resumed" },
            &self.record.id,
            json!({}),
        ))
        .await;
        info!(session_id = %self.record.id, from, to, "session transition");
        Ok(true)
    }

    async fn stop_locked(&self, state: &mut RunnerState) -> bool {
        if !state.running {
            return false;
        }
        if let Some(Strategy::Broker(mut broker)) = state.strategy.take() {
            broker.stop().await;
        }
        state.running = false;
        state.paused = false;

        let _ = self.services.audit.log_lifecycle(
            &self.record.user_id,
            &self.record.id,
            AuditEventType::SessionEnd,
            "session_end",
            json!({"messages": state.sequence}),
        );
        self.emit(ExternalEvent::new(
            "session_stopped",
            &self.record.id,
            json!({"messages": state.sequence}),
        ))
        .await;
        info!(session_id = %self.record.id, messages = state.sequence, "session stopped");
        true
    }
}

impl std::fmt::Debug for SessionRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRunner")
            .field("record", &self.record)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}
