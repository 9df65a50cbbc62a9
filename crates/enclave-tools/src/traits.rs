//! Core trait and DI abstractions for the tool system.
//!
//! Defines [`AgentTool`], the trait every tool implements, plus the
//! [`ProcessRunner`] seam that shell tools execute through.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use enclave_core::tools::{ToolCategory, ToolDefinition, ToolResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::errors::ToolError;

// ─────────────────────────────────────────────────────────────────────────────
// Tool context
// ─────────────────────────────────────────────────────────────────────────────

/// Execution context passed to every tool invocation.
#[derive(Clone, Debug)]
pub struct ToolContext {
    /// Unique ID of this tool call.
    pub tool_call_id: String,
    /// Session that issued the call.
    pub session_id: String,
    /// Directory relative paths resolve against.
    pub working_directory: PathBuf,
    /// Cooperative cancellation, fired when the session stops.
    pub cancellation: CancellationToken,
}

impl ToolContext {
    /// Context for a call in `working_directory` with a fresh token.
    pub fn new(
        tool_call_id: impl Into<String>,
        session_id: impl Into<String>,
        working_directory: impl Into<PathBuf>,
    ) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            session_id: session_id.into(),
            working_directory: working_directory.into(),
            cancellation: CancellationToken::new(),
        }
    }
}

/// File-level effect of a tool, used to project successful calls onto
/// file audit events.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileOperation {
    /// Reads file or directory contents.
    Read,
    /// Creates or overwrites a file.
    Write,
    /// Removes a file or directory.
    Delete,
}

// ─────────────────────────────────────────────────────────────────────────────
// AgentTool trait
// ─────────────────────────────────────────────────────────────────────────────

/// The trait every tool implements.
///
/// Tool failures the agent should see (missing file, bad argument) are
/// returned as `Ok` results with `is_error` set. `Err` is reserved for
/// failures of the tool machinery itself.
#[async_trait]
pub trait AgentTool: Send + Sync {
    /// Tool name, the exact string agents use to call it.
    fn name(&self) -> &str;

    /// Tool category for grouping and sandbox policy.
    fn category(&self) -> ToolCategory;

    /// Schema for capability discovery.
    fn definition(&self) -> ToolDefinition;

    /// File effect of a successful call, if any.
    fn file_operation(&self) -> Option<FileOperation> {
        None
    }

    /// Bytes this call would add to the workspace, when known up front.
    fn write_size(&self, _params: &Value) -> Option<u64> {
        None
    }

    /// Execute the tool with JSON arguments.
    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<ToolResult, ToolError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Process execution
// ─────────────────────────────────────────────────────────────────────────────

/// Options for running a subprocess.
#[derive(Clone, Debug)]
pub struct ProcessOptions {
    /// Working directory.
    pub working_directory: PathBuf,
    /// Timeout in milliseconds.
    pub timeout_ms: u64,
    /// Cancellation token.
    pub cancellation: CancellationToken,
    /// Additional environment variables.
    pub env: HashMap<String, String>,
}

/// Output from a subprocess.
#[derive(Clone, Debug, Default)]
pub struct ProcessOutput {
    /// Standard output.
    pub stdout: String,
    /// Standard error.
    pub stderr: String,
    /// Exit code (`-1` when killed or unavailable).
    pub exit_code: i32,
    /// Duration in milliseconds.
    pub duration_ms: u64,
    /// Whether the process timed out.
    pub timed_out: bool,
    /// Whether the process was cancelled.
    pub interrupted: bool,
}

/// Shell command execution.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Run `command` through the shell.
    async fn run_command(
        &self,
        command: &str,
        opts: &ProcessOptions,
    ) -> Result<ProcessOutput, ToolError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_context_new() {
        let ctx = ToolContext::new("call-1", "sess-1", "/tmp/ws");
        assert_eq!(ctx.tool_call_id, "call-1");
        assert_eq!(ctx.working_directory, PathBuf::from("/tmp/ws"));
        assert!(!ctx.cancellation.is_cancelled());
    }

    #[test]
    fn file_operation_serde() {
        assert_eq!(
            serde_json::to_string(&FileOperation::Delete).unwrap(),
            "\"delete\""
        );
    }

    #[test]
    fn process_output_default() {
        let out = ProcessOutput::default();
        assert_eq!(out.exit_code, 0);
        assert!(!out.timed_out);
    }
}
