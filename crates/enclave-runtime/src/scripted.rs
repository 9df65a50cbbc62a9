//! A line-scripted agent for local runs and end-to-end tests.
//!
//! Input lines are interpreted as:
//!
//! - `/tool <name> <json>`: request a tool call (several lines, several calls)
//! - `/think <text>`: emit reasoning
//! - `/wait [question]`: ask for input
//! - `/finish [summary]`: finish
//! - anything else: echoed back as `echo: <line>`
//!
//! Tool results are summarized as one line per call.

use std::sync::Arc;

use async_trait::async_trait;
use enclave_core::text::truncate_str;
use enclave_tools::ToolRegistry;
use serde_json::Value;

use crate::agent::{Agent, AgentError, AgentFactory, AgentMessage, AgentSetup, ToolCall};

/// Agent type name served by [`ScriptedAgentFactory`].
pub const SCRIPTED_AGENT_TYPE: &str = "scripted";

const SUMMARY_MAX_BYTES: usize = 200;

/// Agent driven by command lines in user messages.
#[derive(Debug)]
pub struct ScriptedAgent {
    tools: Option<Arc<ToolRegistry>>,
}

impl ScriptedAgent {
    /// Agent offering `tools` to the runtime.
    pub fn new(tools: Option<Arc<ToolRegistry>>) -> Self {
        Self { tools }
    }

    fn parse_tool_line(rest: &str) -> Result<ToolCall, AgentError> {
        let rest = rest.trim();
        let (name, args) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
        if name.is_empty() {
            return Err(AgentError::Step("'/tool' needs a tool name".into()));
        }
        let arguments = if args.trim().is_empty() {
            Value::Object(serde_json::Map::new())
        } else {
            serde_json::from_str(args.trim())
                .map_err(|e| AgentError::Step(format!("invalid arguments for '{name}': {e}")))?
        };
        Ok(ToolCall {
            id: String::new(),
            name: name.to_owned(),
            arguments,
        })
    }

    fn respond(content: &str) -> Result<Option<AgentMessage>, AgentError> {
        let mut tool_calls = Vec::new();
        let mut text = Vec::new();

        for line in content.lines().map(str::trim).filter(|l| !l.is_empty()) {
            if let Some(rest) = line.strip_prefix("/tool ") {
                tool_calls.push(Self::parse_tool_line(rest)?);
            } else if let Some(rest) = line.strip_prefix("/think ") {
                return Ok(Some(AgentMessage::Thinking {
                    content: rest.to_owned(),
                }));
            } else if let Some(rest) = line.strip_prefix("/wait") {
                return Ok(Some(AgentMessage::WaitForInput {
                    prompt: Some(rest.trim().to_owned()).filter(|s| !s.is_empty()),
                }));
            } else if let Some(rest) = line.strip_prefix("/finish") {
                return Ok(Some(AgentMessage::Finished {
                    summary: Some(rest.trim().to_owned()).filter(|s| !s.is_empty()),
                }));
            } else {
                text.push(format!("echo: {line}"));
            }
        }

        if text.is_empty() && tool_calls.is_empty() {
            return Ok(None);
        }
        Ok(Some(AgentMessage::Assistant {
            text: text.join("\n"),
            tool_calls,
        }))
    }
}

#[async_trait]
impl Agent for ScriptedAgent {
    async fn step(&mut self, message: AgentMessage) -> Result<Option<AgentMessage>, AgentError> {
        match message {
            AgentMessage::User { content } => Self::respond(&content),
            AgentMessage::ToolResults { results } => {
                let lines: Vec<String> = results
                    .iter()
                    .map(|r| {
                        let status = if r.result.is_error { "error" } else { "ok" };
                        format!(
                            "{} {status}: {}",
                            r.tool_name,
                            truncate_str(&r.result.content, SUMMARY_MAX_BYTES)
                        )
                    })
                    .collect();
                Ok(Some(AgentMessage::Assistant {
                    text: lines.join("\n"),
                    tool_calls: Vec::new(),
                }))
            }
            _ => Ok(None),
        }
    }

    fn tool_registry(&self) -> Option<Arc<ToolRegistry>> {
        self.tools.clone()
    }
}

/// Factory serving [`ScriptedAgent`] under [`SCRIPTED_AGENT_TYPE`].
#[derive(Clone, Copy, Debug, Default)]
pub struct ScriptedAgentFactory;

#[async_trait]
impl AgentFactory for ScriptedAgentFactory {
    async fn create_agent(
        &self,
        agent_type: &str,
        _session_id: &str,
        _tenant_id: &str,
        setup: AgentSetup,
    ) -> Result<Box<dyn Agent>, AgentError> {
        if agent_type != SCRIPTED_AGENT_TYPE {
            return Err(AgentError::UnknownType(agent_type.to_owned()));
        }
        Ok(Box::new(ScriptedAgent::new(Some(Arc::new(setup.tools)))))
    }
}
