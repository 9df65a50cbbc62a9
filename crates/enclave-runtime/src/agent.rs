//! Agent contract.
//!
//! The runtime treats an agent as an opaque state machine: it is handed one
//! [`AgentMessage`] at a time and answers with at most one reply. Tool calls
//! in an assistant reply are executed by the runtime and fed back as
//! [`AgentMessage::ToolResults`].

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use enclave_core::tools::ToolResult;
use enclave_tools::ToolRegistry;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A tool call requested by the agent.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCall {
    /// Call id. Empty ids are replaced by the controller.
    #[serde(default)]
    pub id: String,
    /// Tool name.
    pub name: String,
    /// JSON arguments.
    #[serde(default)]
    pub arguments: Value,
}

/// Outcome of one tool call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolOutput {
    /// Id of the originating call.
    pub tool_call_id: String,
    /// Tool name.
    pub tool_name: String,
    /// Tool result.
    pub result: ToolResult,
}

/// Messages exchanged with an agent.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentMessage {
    /// User input.
    User {
        /// Text content.
        content: String,
    },
    /// Assistant reply, optionally requesting tools.
    Assistant {
        /// Reply text.
        text: String,
        /// Requested tool calls.
        #[serde(default)]
        tool_calls: Vec<ToolCall>,
    },
    /// Results for the tool calls of the previous reply, in call order.
    ToolResults {
        /// One entry per call.
        results: Vec<ToolOutput>,
    },
    /// Intermediate reasoning.
    Thinking {
        /// Reasoning text.
        content: String,
    },
    /// The agent needs user input before continuing.
    WaitForInput {
        /// Optional question for the user.
        prompt: Option<String>,
    },
    /// The agent considers the task done.
    Finished {
        /// Optional summary.
        summary: Option<String>,
    },
    /// The agent rewrote the user's prompt.
    PromptRefined {
        /// The refined prompt.
        prompt: String,
    },
}

impl AgentMessage {
    /// Snake-case tag of the variant.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::User { .. } => "user",
            Self::Assistant { .. } => "assistant",
            Self::ToolResults { .. } => "tool_results",
            Self::Thinking { .. } => "thinking",
            Self::WaitForInput { .. } => "wait_for_input",
            Self::Finished { .. } => "finished",
            Self::PromptRefined { .. } => "prompt_refined",
        }
    }
}

/// Errors raised by agents and agent factories.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// The agent failed to process a message.
    #[error("step failed: {0}")]
    Step(String),

    /// The factory does not know the requested agent type.
    #[error("unknown agent type: {0}")]
    UnknownType(String),

    /// Unexpected failure.
    #[error("internal error: {0}")]
    Internal(String),
}

/// An agent driven by the runtime.
#[async_trait]
pub trait Agent: Send {
    /// Process one message and return the reply, if any.
    async fn step(&mut self, message: AgentMessage) -> Result<Option<AgentMessage>, AgentError>;

    /// Tools the runtime may execute on the agent's behalf.
    fn tool_registry(&self) -> Option<Arc<ToolRegistry>> {
        None
    }
}

/// What a factory gets to build an agent for one session.
#[derive(Clone, Debug)]
pub struct AgentSetup {
    /// Session workspace root.
    pub workspace: PathBuf,
    /// The session's sandboxed tools.
    pub tools: ToolRegistry,
}

/// Builds agents by type name.
#[async_trait]
pub trait AgentFactory: Send + Sync {
    /// Create an agent for a session.
    async fn create_agent(
        &self,
        agent_type: &str,
        session_id: &str,
        tenant_id: &str,
        setup: AgentSetup,
    ) -> Result<Box<dyn Agent>, AgentError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn message_tagged_by_type() {
        let msg = AgentMessage::Assistant {
            text: "hi".into(),
            tool_calls: vec![ToolCall {
                id: "c1".into(),
                name: "read_file".into(),
                arguments: json!({"file_path": "a"}),
            }],
        };
        let v = serde_json::to_value(&msg).unwrap();
        assert_eq!(v["type"], "assistant");
        assert_eq!(v["tool_calls"][0]["name"], "read_file");
        assert_eq!(msg.kind(), "assistant");
    }

    #[test]
    fn tool_call_defaults() {
        let call: ToolCall = serde_json::from_value(json!({"name": "list_directory"})).unwrap();
        assert!(call.id.is_empty());
        assert!(call.arguments.is_null());
    }
}
