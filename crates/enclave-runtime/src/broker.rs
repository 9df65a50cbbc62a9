//! Session broker.
//!
//! Wires one session's bus: the controller on `agent.<id>`, the tool executor
//! on `runtime.<id>` and the client forwarder on `client.<id>`. The forwarder
//! transforms every payload into an [`ExternalEvent`](crate::transform::ExternalEvent)
//! and hands it to the session's [`EventSink`].
//!
//! Lifecycle: `not_started → started → stopped`. Stopped is terminal.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use enclave_tools::ToolRegistry;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::agent::Agent;
use crate::bus::{MessageBus, Subscription};
use crate::controller::Controller;
use crate::errors::{Result, RuntimeError};
use crate::executor::ToolExecutor;
use crate::payload::BusPayload;
use crate::sink::{EventSink, deliver_guarded};
use crate::topics::Topics;
use crate::transform::transform_event;

/// Broker lifecycle state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BrokerState {
    /// Constructed, not yet wired.
    NotStarted,
    /// Tasks running.
    Started,
    /// Torn down.
    Stopped,
}

/// Broker construction parameters.
#[derive(Clone, Debug)]
pub struct BrokerConfig {
    /// Session id; also names the topics.
    pub session_id: String,
    /// Working directory handed to tools.
    pub workspace: PathBuf,
    /// Agent steps allowed per user message.
    pub max_steps_per_message: u32,
    /// How long `stop` waits for tasks before aborting them.
    pub stop_grace: Duration,
    /// Tools the executor may run, already sandboxed. `None` means the
    /// session has no tools.
    pub tools: Option<Arc<ToolRegistry>>,
}

/// Point-in-time broker snapshot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BrokerStats {
    /// Lifecycle state.
    pub state: BrokerState,
    /// Topic names.
    pub topics: Topics,
    /// Last assigned message sequence.
    pub sequence: u64,
    /// Subscribers on the agent topic.
    pub agent_subscribers: usize,
    /// Subscribers on the client topic.
    pub client_subscribers: usize,
    /// Subscribers on the runtime topic.
    pub runtime_subscribers: usize,
}

/// Per-session message broker.
pub struct SessionBroker {
    config: BrokerConfig,
    topics: Topics,
    state: BrokerState,
    sequence: u64,
    agent: Option<Box<dyn Agent>>,
    sink: Arc<dyn EventSink>,
    bus: Option<Arc<MessageBus<BusPayload>>>,
    cancel: CancellationToken,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}

impl SessionBroker {
    /// Broker for `agent`, delivering client events to `sink`.
    pub fn new(config: BrokerConfig, agent: Box<dyn Agent>, sink: Arc<dyn EventSink>) -> Self {
        let topics = Topics::for_session(&config.session_id);
        Self {
            config,
            topics,
            state: BrokerState::NotStarted,
            sequence: 0,
            agent: Some(agent),
            sink,
            bus: None,
            cancel: CancellationToken::new(),
            tasks: Vec::new(),
        }
    }

    /// Current state.
    pub fn state(&self) -> BrokerState {
        self.state
    }

    /// Topic names.
    pub fn topics(&self) -> &Topics {
        &self.topics
    }

    /// Wire the bus and spawn the session tasks. Idempotent while started.
    #[instrument(skip_all, fields(session_id = %self.config.session_id))]
    pub fn start(&mut self) -> Result<()> {
        match self.state {
            BrokerState::Started => return Ok(()),
            BrokerState::Stopped => {
                return Err(RuntimeError::BrokerStartFailed(
                    "broker already stopped".into(),
                ));
            }
            BrokerState::NotStarted => {}
        }
        let agent = self
            .agent
            .take()
            .ok_or_else(|| RuntimeError::BrokerStartFailed("no agent attached".into()))?;

        let bus = Arc::new(MessageBus::new());
        let (Some(agent_sub), Some(client_sub), Some(runtime_sub)) = (
            bus.subscribe(&self.topics.agent),
            bus.subscribe(&self.topics.client),
            bus.subscribe(&self.topics.runtime),
        ) else {
            self.agent = Some(agent);
            return Err(RuntimeError::BrokerStartFailed(
                "bus refused subscription".into(),
            ));
        };

        let executor = ToolExecutor::new(
            self.config.session_id.clone(),
            self.config.tools.clone(),
            self.config.workspace.clone(),
            bus.clone(),
            self.topics.clone(),
        );
        let controller = Controller::new(
            self.config.session_id.clone(),
            agent,
            bus.clone(),
            self.topics.clone(),
            self.config.max_steps_per_message,
        );

        self.tasks.push((
            "controller",
            tokio::spawn(controller.run(agent_sub, self.cancel.clone())),
        ));
        self.tasks.push((
            "executor",
            tokio::spawn(executor.run(runtime_sub, self.cancel.clone())),
        ));
        self.tasks.push((
            "forwarder",
            tokio::spawn(forward_client_events(
                self.config.session_id.clone(),
                client_sub,
                self.sink.clone(),
            )),
        ));

        self.bus = Some(bus);
        self.state = BrokerState::Started;
        info!("session broker started");
        Ok(())
    }

    /// Publish a user message; returns its sequence number.
    pub fn send_message(&mut self, content: &str) -> Result<u64> {
        let bus = match (&self.bus, self.state) {
            (Some(bus), BrokerState::Started) => bus,
            _ => return Err(RuntimeError::BrokerNotStarted),
        };
        self.sequence += 1;
        let delivered = bus.publish(
            &self.topics.agent,
            BusPayload::UserMessage {
                sequence: self.sequence,
                content: content.to_owned(),
            },
        );
        if delivered == 0 {
            warn!(session_id = %self.config.session_id, "no controller subscribed, message dropped");
        }
        debug!(session_id = %self.config.session_id, sequence = self.sequence, "user message published");
        Ok(self.sequence)
    }

    /// Unsubscribe everything, cancel the tasks and wait up to the grace
    /// period before aborting stragglers. Safe in any state.
    #[instrument(skip_all, fields(session_id = %self.config.session_id))]
    pub async fn stop(&mut self) {
        match self.state {
            BrokerState::Stopped => return,
            BrokerState::NotStarted => {
                self.agent = None;
                self.state = BrokerState::Stopped;
                return;
            }
            BrokerState::Started => {}
        }

        if let Some(bus) = self.bus.take() {
            bus.stop();
        }
        self.cancel.cancel();

        let deadline = tokio::time::Instant::now() + self.config.stop_grace;
        for (name, mut handle) in self.tasks.drain(..) {
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(task = name, error = %e, "broker task failed"),
                Err(_) => {
                    warn!(task = name, "broker task still running after grace period, aborting");
                    handle.abort();
                }
            }
        }

        self.state = BrokerState::Stopped;
        info!(messages = self.sequence, "session broker stopped");
    }

    /// Snapshot for stats.
    pub fn stats(&self) -> BrokerStats {
        let count = |topic: &str| self.bus.as_ref().map_or(0, |b| b.subscriber_count(topic));
        BrokerStats {
            state: self.state,
            topics: self.topics.clone(),
            sequence: self.sequence,
            agent_subscribers: count(&self.topics.agent),
            client_subscribers: count(&self.topics.client),
            runtime_subscribers: count(&self.topics.runtime),
        }
    }
}

impl Drop for SessionBroker {
    fn drop(&mut self) {
        self.cancel.cancel();
        for (_, handle) in self.tasks.drain(..) {
            handle.abort();
        }
    }
}

impl std::fmt::Debug for SessionBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionBroker")
            .field("session_id", &self.config.session_id)
            .field("state", &self.state)
            .field("sequence", &self.sequence)
            .finish_non_exhaustive()
    }
}

/// Drain the client topic into the sink until the topic closes.
async fn forward_client_events(
    session_id: String,
    mut inbox: Subscription<BusPayload>,
    sink: Arc<dyn EventSink>,
) {
    while let Some(payload) = inbox.recv().await {
        let event = transform_event(&session_id, &payload);
        let _ = deliver_guarded(sink.as_ref(), event).await;
    }
    debug!(session_id, "client forwarder stopped");
}
