//! Bus payloads.

use enclave_core::tools::ToolResult;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::agent::{ToolCall, ToolOutput};

/// Everything that travels over a session bus, tagged by `type`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BusPayload {
    /// Client input for the controller.
    UserMessage {
        /// Per-broker sequence number.
        sequence: u64,
        /// Text content.
        content: String,
    },
    /// Assistant text for the client.
    AssistantText {
        /// Reply text.
        text: String,
    },
    /// A tool call: executed on the runtime topic, announced on the client
    /// topic.
    ToolCall {
        /// The call.
        call: ToolCall,
    },
    /// A tool outcome: consumed on the agent topic, announced on the client
    /// topic.
    ToolOutput {
        /// The outcome.
        output: ToolOutput,
    },
    /// Agent reasoning.
    Thinking {
        /// Reasoning text.
        content: String,
    },
    /// Agent waits for user input.
    WaitForInput {
        /// Optional question.
        prompt: Option<String>,
    },
    /// Agent finished.
    Finished {
        /// Optional summary.
        summary: Option<String>,
    },
    /// Agent refined the prompt.
    PromptRefined {
        /// Refined prompt.
        prompt: String,
    },
    /// Controller-level failure.
    Error {
        /// Human-readable message.
        message: String,
        /// Machine-readable category.
        category: String,
    },
    /// Free-form event forwarded with its own tag.
    Custom {
        /// Event type seen by the client.
        tag: String,
        /// Event fields.
        data: Value,
    },
}

impl BusPayload {
    /// Controller failure payload.
    pub fn error(category: &str, message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
            category: category.to_owned(),
        }
    }

    /// Tool outcome payload.
    pub fn tool_output(call: &ToolCall, result: ToolResult) -> Self {
        Self::ToolOutput {
            output: ToolOutput {
                tool_call_id: call.id.clone(),
                tool_name: call.name.clone(),
                result,
            },
        }
    }
}
