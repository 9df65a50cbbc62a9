//! Controller: drives the agent for one session.
//!
//! The controller consumes the agent topic. For each user message it steps
//! the agent until the agent yields control (plain reply, wait, finish) or
//! the per-message step budget runs out. Tool calls are published on the
//! runtime topic and their outputs collected from the agent topic before the
//! agent is stepped again. User messages arriving mid-turn are queued.

use std::collections::{HashMap, HashSet, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use enclave_core::ids::ToolCallId;
use enclave_core::tools::error_result;
use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::agent::{Agent, AgentMessage, ToolCall, ToolOutput};
use crate::bus::{MessageBus, Subscription};
use crate::payload::BusPayload;
use crate::topics::Topics;

enum Flow {
    Continue,
    Shutdown,
}

/// Client payloads for an agent reply that is not stepped further.
pub fn reply_payloads(reply: AgentMessage) -> Vec<BusPayload> {
    match reply {
        AgentMessage::Assistant { text, tool_calls } => {
            let mut out = Vec::with_capacity(tool_calls.len() + 1);
            if !text.is_empty() {
                out.push(BusPayload::AssistantText { text });
            }
            out.extend(tool_calls.into_iter().map(|call| BusPayload::ToolCall { call }));
            out
        }
        AgentMessage::Thinking { content } => vec![BusPayload::Thinking { content }],
        AgentMessage::WaitForInput { prompt } => vec![BusPayload::WaitForInput { prompt }],
        AgentMessage::Finished { summary } => vec![BusPayload::Finished { summary }],
        AgentMessage::PromptRefined { prompt } => vec![BusPayload::PromptRefined { prompt }],
        other @ (AgentMessage::User { .. } | AgentMessage::ToolResults { .. }) => {
            vec![unexpected_reply(&other)]
        }
    }
}

fn unexpected_reply(reply: &AgentMessage) -> BusPayload {
    BusPayload::error(
        "protocol",
        format!("Agent replied with unexpected message type: {}", reply.kind()),
    )
}

/// Drives one agent over a session bus.
pub struct Controller {
    session_id: String,
    agent: Box<dyn Agent>,
    bus: Arc<MessageBus<BusPayload>>,
    topics: Topics,
    max_steps: u32,
    backlog: VecDeque<BusPayload>,
}

impl Controller {
    /// Controller for `agent`, allowing `max_steps` agent steps per user
    /// message.
    pub fn new(
        session_id: impl Into<String>,
        agent: Box<dyn Agent>,
        bus: Arc<MessageBus<BusPayload>>,
        topics: Topics,
        max_steps: u32,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            agent,
            bus,
            topics,
            max_steps,
            backlog: VecDeque::new(),
        }
    }

    /// Consume `inbox` until it closes or `cancel` fires.
    #[instrument(skip_all, name = "controller", fields(session_id = %self.session_id))]
    pub async fn run(mut self, mut inbox: Subscription<BusPayload>, cancel: CancellationToken) {
        loop {
            let next = match self.backlog.pop_front() {
                Some(payload) => payload,
                None => tokio::select! {
                    () = cancel.cancelled() => break,
                    msg = inbox.recv() => match msg {
                        Some(payload) => payload,
                        None => break,
                    },
                },
            };

            match next {
                BusPayload::UserMessage { sequence, content } => {
                    debug!(sequence, "user message");
                    if let Flow::Shutdown = self.handle_user(sequence, content, &mut inbox, &cancel).await {
                        break;
                    }
                }
                BusPayload::ToolOutput { output } => {
                    debug!(tool_call_id = %output.tool_call_id, "tool output outside a turn ignored");
                }
                other => {
                    debug!(payload = ?other, "ignored payload on agent topic");
                }
            }
        }
        info!("controller stopped");
    }

    fn emit(&self, payload: BusPayload) {
        let _ = self.bus.publish(&self.topics.client, payload);
    }

    async fn step(&mut self, input: AgentMessage, cancel: &CancellationToken) -> Option<Option<AgentMessage>> {
        let fut = AssertUnwindSafe(self.agent.step(input)).catch_unwind();
        let outcome = tokio::select! {
            () = cancel.cancelled() => return None,
            outcome = fut => outcome,
        };
        match outcome {
            Ok(Ok(reply)) => Some(reply),
            Ok(Err(e)) => {
                warn!(error = %e, "agent step failed");
                self.emit(BusPayload::error("agent", e.to_string()));
                Some(None)
            }
            Err(_) => {
                warn!("agent panicked");
                self.emit(BusPayload::error("agent_panic", "Agent panicked while handling the message"));
                Some(None)
            }
        }
    }

    async fn handle_user(
        &mut self,
        sequence: u64,
        content: String,
        inbox: &mut Subscription<BusPayload>,
        cancel: &CancellationToken,
    ) -> Flow {
        let mut input = AgentMessage::User { content };
        let mut steps = 0u32;

        loop {
            if steps >= self.max_steps {
                warn!(sequence, max_steps = self.max_steps, "step limit exceeded");
                self.emit(BusPayload::error(
                    "step_limit",
                    format!(
                        "Agent exceeded {} steps while handling message {sequence}",
                        self.max_steps
                    ),
                ));
                return Flow::Continue;
            }
            steps += 1;

            let Some(reply) = self.step(input, cancel).await else {
                return Flow::Shutdown;
            };
            let Some(reply) = reply else {
                return Flow::Continue;
            };

            input = match reply {
                AgentMessage::Assistant { text, tool_calls } => {
                    if !text.is_empty() {
                        self.emit(BusPayload::AssistantText { text });
                    }
                    if tool_calls.is_empty() {
                        return Flow::Continue;
                    }
                    let calls = self.dispatch(tool_calls);
                    match self.collect(&calls, inbox, cancel).await {
                        Some(results) => AgentMessage::ToolResults { results },
                        None => return Flow::Shutdown,
                    }
                }
                // Informational replies go back in so the agent can keep going.
                AgentMessage::Thinking { content } => {
                    self.emit(BusPayload::Thinking {
                        content: content.clone(),
                    });
                    AgentMessage::Thinking { content }
                }
                AgentMessage::PromptRefined { prompt } => {
                    self.emit(BusPayload::PromptRefined {
                        prompt: prompt.clone(),
                    });
                    AgentMessage::PromptRefined { prompt }
                }
                terminal @ (AgentMessage::WaitForInput { .. } | AgentMessage::Finished { .. }) => {
                    for payload in reply_payloads(terminal) {
                        self.emit(payload);
                    }
                    return Flow::Continue;
                }
                other @ (AgentMessage::User { .. } | AgentMessage::ToolResults { .. }) => {
                    self.emit(unexpected_reply(&other));
                    return Flow::Continue;
                }
            };
        }
    }

    /// Give every call a unique id, announce it and hand it to the executor.
    fn dispatch(&mut self, tool_calls: Vec<ToolCall>) -> Vec<ToolCall> {
        let mut seen = HashSet::new();
        let mut calls = Vec::with_capacity(tool_calls.len());
        for mut call in tool_calls {
            if call.id.is_empty() || !seen.insert(call.id.clone()) {
                call.id = ToolCallId::new().into_inner();
                let _ = seen.insert(call.id.clone());
            }
            self.emit(BusPayload::ToolCall { call: call.clone() });
            let delivered = self
                .bus
                .publish(&self.topics.runtime, BusPayload::ToolCall { call: call.clone() });
            if delivered == 0 {
                warn!(tool_name = %call.name, "no tool executor subscribed");
                self.backlog_output(&call);
            }
            calls.push(call);
        }
        calls
    }

    /// Fail a call locally when nobody can run it.
    fn backlog_output(&mut self, call: &ToolCall) {
        self.backlog.push_front(BusPayload::tool_output(
            call,
            error_result(format!("Tool executor unavailable for '{}'", call.name)),
        ));
    }

    /// Wait for every call's output; returns them in call order.
    async fn collect(
        &mut self,
        calls: &[ToolCall],
        inbox: &mut Subscription<BusPayload>,
        cancel: &CancellationToken,
    ) -> Option<Vec<ToolOutput>> {
        let mut pending: HashMap<&str, Option<ToolOutput>> =
            calls.iter().map(|c| (c.id.as_str(), None)).collect();
        let mut remaining = calls.len();

        // Locally failed calls were pushed to the front of the backlog.
        let mut deferred = VecDeque::new();
        while let Some(payload) = self.backlog.pop_front() {
            match payload {
                BusPayload::ToolOutput { output } if matches!(pending.get(output.tool_call_id.as_str()), Some(None)) => {
                    self.emit(BusPayload::ToolOutput { output: output.clone() });
                    if let Some(slot) = pending.get_mut(output.tool_call_id.as_str()) {
                        *slot = Some(output);
                        remaining -= 1;
                    }
                }
                other => deferred.push_back(other),
            }
        }
        self.backlog = deferred;

        while remaining > 0 {
            let payload = tokio::select! {
                () = cancel.cancelled() => return None,
                msg = inbox.recv() => msg?,
            };
            match payload {
                BusPayload::ToolOutput { output } => {
                    let Some(slot) = pending.get_mut(output.tool_call_id.as_str()) else {
                        debug!(tool_call_id = %output.tool_call_id, "unexpected tool output ignored");
                        continue;
                    };
                    if slot.is_some() {
                        continue;
                    }
                    self.emit(BusPayload::ToolOutput { output: output.clone() });
                    *slot = Some(output);
                    remaining -= 1;
                }
                other => self.backlog.push_back(other),
            }
        }

        Some(
            calls
                .iter()
                .filter_map(|c| pending.remove(c.id.as_str()).flatten())
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use enclave_core::tools::text_result;
    use serde_json::json;

    use super::*;
    use crate::agent::AgentError;

    /// Replies from a script; records every input.
    struct ScriptAgent {
        replies: VecDeque<Result<Option<AgentMessage>, AgentError>>,
        seen: Arc<parking_lot::Mutex<Vec<AgentMessage>>>,
    }

    #[async_trait]
    impl Agent for ScriptAgent {
        async fn step(&mut self, message: AgentMessage) -> Result<Option<AgentMessage>, AgentError> {
            self.seen.lock().push(message);
            self.replies.pop_front().unwrap_or(Ok(None))
        }
    }

    struct Harness {
        bus: Arc<MessageBus<BusPayload>>,
        topics: Topics,
        client: Subscription<BusPayload>,
        runtime: Subscription<BusPayload>,
        seen: Arc<parking_lot::Mutex<Vec<AgentMessage>>>,
        cancel: CancellationToken,
        handle: tokio::task::JoinHandle<()>,
    }

    fn harness(replies: Vec<Result<Option<AgentMessage>, AgentError>>, max_steps: u32) -> Harness {
        let bus = Arc::new(MessageBus::new());
        let topics = Topics::for_session("s1");
        let inbox = bus.subscribe(&topics.agent).unwrap();
        let client = bus.subscribe(&topics.client).unwrap();
        let runtime = bus.subscribe(&topics.runtime).unwrap();
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let agent = ScriptAgent {
            replies: replies.into(),
            seen: seen.clone(),
        };
        let controller = Controller::new("s1", Box::new(agent), bus.clone(), topics.clone(), max_steps);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(controller.run(inbox, cancel.clone()));
        Harness {
            bus,
            topics,
            client,
            runtime,
            seen,
            cancel,
            handle,
        }
    }

    impl Harness {
        fn send(&self, sequence: u64, content: &str) {
            let _ = self.bus.publish(
                &self.topics.agent,
                BusPayload::UserMessage {
                    sequence,
                    content: content.into(),
                },
            );
        }

        async fn next_client(&mut self) -> BusPayload {
            tokio::time::timeout(Duration::from_secs(5), self.client.recv())
                .await
                .unwrap()
                .unwrap()
        }
    }

    fn assistant(text: &str, calls: Vec<ToolCall>) -> Result<Option<AgentMessage>, AgentError> {
        Ok(Some(AgentMessage::Assistant {
            text: text.into(),
            tool_calls: calls,
        }))
    }

    #[tokio::test]
    async fn plain_reply_forwarded() {
        let mut h = harness(vec![assistant("hello", vec![])], 5);
        h.send(1, "hi");
        assert_eq!(h.next_client().await, BusPayload::AssistantText { text: "hello".into() });
        assert_eq!(h.seen.lock()[0], AgentMessage::User { content: "hi".into() });
        h.cancel.cancel();
        h.handle.await.unwrap();
    }

    #[tokio::test]
    async fn tool_round_trip() {
        let call = ToolCall {
            id: String::new(),
            name: "read_file".into(),
            arguments: json!({"file_path": "a"}),
        };
        let mut h = harness(vec![assistant("", vec![call]), assistant("done", vec![])], 5);
        h.send(1, "go");

        let BusPayload::ToolCall { call } = h.runtime.recv().await.unwrap() else {
            panic!("expected tool call on runtime topic");
        };
        assert!(!call.id.is_empty());
        assert!(matches!(h.next_client().await, BusPayload::ToolCall { .. }));

        let _ = h
            .bus
            .publish(&h.topics.agent, BusPayload::tool_output(&call, text_result("content", false)));

        assert!(matches!(h.next_client().await, BusPayload::ToolOutput { .. }));
        assert_eq!(h.next_client().await, BusPayload::AssistantText { text: "done".into() });

        let seen = h.seen.lock().clone();
        let AgentMessage::ToolResults { results } = &seen[1] else {
            panic!("expected tool results");
        };
        assert_eq!(results[0].tool_call_id, call.id);
        assert_eq!(results[0].result.content, "content");
    }

    #[tokio::test]
    async fn user_message_during_turn_is_queued() {
        let call = ToolCall {
            id: "c1".into(),
            name: "read_file".into(),
            arguments: json!({}),
        };
        let mut h = harness(
            vec![assistant("", vec![call.clone()]), assistant("first", vec![]), assistant("second", vec![])],
            5,
        );
        h.send(1, "one");
        let _ = h.runtime.recv().await.unwrap();
        h.send(2, "two");
        let _ = h
            .bus
            .publish(&h.topics.agent, BusPayload::tool_output(&call, text_result("x", false)));

        let mut texts = Vec::new();
        while texts.len() < 2 {
            if let BusPayload::AssistantText { text } = h.next_client().await {
                texts.push(text);
            }
        }
        assert_eq!(texts, vec!["first", "second"]);
        assert_eq!(h.seen.lock()[2], AgentMessage::User { content: "two".into() });
    }

    #[tokio::test]
    async fn step_limit_emits_error() {
        let thinking = || {
            Ok(Some(AgentMessage::Thinking {
                content: "more".into(),
            }))
        };
        let mut h = harness(vec![thinking(), thinking(), thinking(), thinking()], 3);
        h.send(1, "loop");
        for _ in 0..3 {
            assert!(matches!(h.next_client().await, BusPayload::Thinking { .. }));
        }
        let BusPayload::Error { category, .. } = h.next_client().await else {
            panic!("expected error");
        };
        assert_eq!(category, "step_limit");
        assert_eq!(h.seen.lock().len(), 3);
    }

    #[tokio::test]
    async fn agent_error_reported() {
        let mut h = harness(vec![Err(AgentError::Step("bad input".into()))], 5);
        h.send(1, "x");
        let BusPayload::Error { category, message } = h.next_client().await else {
            panic!("expected error");
        };
        assert_eq!(category, "agent");
        assert!(message.contains("bad input"));
    }

    #[tokio::test]
    async fn finished_ends_turn() {
        let mut h = harness(
            vec![Ok(Some(AgentMessage::Finished {
                summary: Some("all done".into()),
            }))],
            5,
        );
        h.send(1, "x");
        assert_eq!(
            h.next_client().await,
            BusPayload::Finished {
                summary: Some("all done".into())
            }
        );
        assert_eq!(h.seen.lock().len(), 1);
    }

    #[tokio::test]
    async fn missing_executor_fails_call_locally() {
        let call = ToolCall {
            id: "c1".into(),
            name: "read_file".into(),
            arguments: json!({}),
        };
        let mut h = harness(vec![assistant("", vec![call]), assistant("after", vec![])], 5);
        let _ = h.bus.unsubscribe(&h.topics.runtime, h.runtime.id);
        h.send(1, "x");

        assert!(matches!(h.next_client().await, BusPayload::ToolCall { .. }));
        let BusPayload::ToolOutput { output } = h.next_client().await else {
            panic!("expected tool output");
        };
        assert!(output.result.is_error);
        assert_eq!(h.next_client().await, BusPayload::AssistantText { text: "after".into() });
    }

    #[test]
    fn reply_payloads_for_direct_mode() {
        let payloads = reply_payloads(AgentMessage::Assistant {
            text: "hi".into(),
            tool_calls: vec![ToolCall {
                id: "c".into(),
                name: "n".into(),
                arguments: json!({}),
            }],
        });
        assert_eq!(payloads.len(), 2);
        assert!(matches!(
            reply_payloads(AgentMessage::User { content: "x".into() })[0],
            BusPayload::Error { .. }
        ));
    }
}
