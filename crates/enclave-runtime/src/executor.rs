//! Tool executor: runs tool calls from the runtime topic.
//!
//! Calls run one at a time in arrival order. Each output goes back to the
//! agent topic, where the controller collects it.

use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use enclave_core::tools::{ToolResult, error_result};
use enclave_tools::{ToolContext, ToolRegistry};
use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::agent::ToolCall;
use crate::bus::{MessageBus, Subscription};
use crate::payload::BusPayload;
use crate::topics::Topics;

/// Executes tool calls against the agent's registry.
pub struct ToolExecutor {
    session_id: String,
    registry: Option<Arc<ToolRegistry>>,
    workspace: PathBuf,
    bus: Arc<MessageBus<BusPayload>>,
    topics: Topics,
}

impl ToolExecutor {
    /// Executor for one session. Without a registry every call fails.
    pub fn new(
        session_id: impl Into<String>,
        registry: Option<Arc<ToolRegistry>>,
        workspace: PathBuf,
        bus: Arc<MessageBus<BusPayload>>,
        topics: Topics,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            registry,
            workspace,
            bus,
            topics,
        }
    }

    /// Consume `inbox` until it closes or `cancel` fires.
    #[instrument(skip_all, name = "tool_executor", fields(session_id = %self.session_id))]
    pub async fn run(self, mut inbox: Subscription<BusPayload>, cancel: CancellationToken) {
        loop {
            let payload = tokio::select! {
                () = cancel.cancelled() => break,
                msg = inbox.recv() => match msg {
                    Some(payload) => payload,
                    None => break,
                },
            };
            let BusPayload::ToolCall { call } = payload else {
                debug!("ignored non tool-call payload on runtime topic");
                continue;
            };

            let result = tokio::select! {
                () = cancel.cancelled() => break,
                result = self.execute(&call, &cancel) => result,
            };
            let _ = self
                .bus
                .publish(&self.topics.agent, BusPayload::tool_output(&call, result));
        }
        info!("tool executor stopped");
    }

    #[instrument(skip_all, fields(tool_name = %call.name, tool_call_id = %call.id))]
    async fn execute(&self, call: &ToolCall, cancel: &CancellationToken) -> ToolResult {
        let Some(tool) = self.registry.as_ref().and_then(|r| r.get(&call.name)) else {
            warn!("tool not found");
            return error_result(format!("Tool not found: {}", call.name));
        };

        let mut ctx = ToolContext::new(&call.id, &self.session_id, &self.workspace);
        ctx.cancellation = cancel.child_token();

        let start = Instant::now();
        let outcome = AssertUnwindSafe(tool.execute(call.arguments.clone(), &ctx))
            .catch_unwind()
            .await;
        let duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

        match outcome {
            Ok(Ok(result)) => {
                debug!(duration_ms, is_error = result.is_error, "tool finished");
                result
            }
            Ok(Err(e)) => {
                warn!(duration_ms, error = %e, "tool failed");
                error_result(format!("Tool '{}' failed: {e}", call.name))
            }
            Err(_) => {
                warn!(duration_ms, "tool panicked");
                error_result(format!("Tool '{}' panicked", call.name))
            }
        }
    }
}
