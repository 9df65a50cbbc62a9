//! `run_shell`: shell command execution with timeout.
//!
//! Runs `sh -c <command>` through a [`ProcessRunner`]. Combined output is
//! truncated past a fixed budget. Command screening is the sandbox's job.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use enclave_core::text::truncate_str;
use enclave_core::tools::{ToolCategory, ToolDefinition, ToolParameterSchema, ToolResult, text_result};
use serde_json::{Value, json};

use crate::errors::ToolError;
use crate::traits::{AgentTool, ProcessOptions, ProcessRunner, ToolContext};
use crate::utils::{optional_string, optional_u64, required_string};

const DEFAULT_TIMEOUT_MS: u64 = 120_000;
const MAX_TIMEOUT_MS: u64 = 600_000;
const MAX_OUTPUT_BYTES: usize = 200_000;

/// Executes shell commands.
pub struct RunShellTool {
    runner: Arc<dyn ProcessRunner>,
}

impl RunShellTool {
    /// Create the tool over the given process runner.
    pub fn new(runner: Arc<dyn ProcessRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl AgentTool for RunShellTool {
    fn name(&self) -> &str {
        "run_shell"
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Shell
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "run_shell".into(),
            description: "Run a shell command in the workspace.".into(),
            category: ToolCategory::Shell,
            parameters: ToolParameterSchema::object(
                vec![
                    (
                        "command",
                        json!({"type": "string", "description": "The shell command to run"}),
                    ),
                    (
                        "timeout",
                        json!({"type": "integer", "description": "Timeout in milliseconds (max 600000)"}),
                    ),
                    (
                        "working_directory",
                        json!({"type": "string", "description": "Directory to run in"}),
                    ),
                ],
                &["command"],
            ),
        }
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<ToolResult, ToolError> {
        let command = match required_string(&params, "command", "the shell command") {
            Ok(c) => c,
            Err(e) => return Ok(e),
        };
        let timeout_ms = optional_u64(&params, "timeout")
            .unwrap_or(DEFAULT_TIMEOUT_MS)
            .min(MAX_TIMEOUT_MS);
        let working_directory = optional_string(&params, "working_directory")
            .map_or_else(|| ctx.working_directory.clone(), PathBuf::from);

        let opts = ProcessOptions {
            working_directory,
            timeout_ms,
            cancellation: ctx.cancellation.clone(),
            env: HashMap::new(),
        };

        let output = self.runner.run_command(&command, &opts).await?;

        let mut combined = output.stdout;
        if !output.stderr.is_empty() {
            if !combined.is_empty() {
                combined.push('\n');
            }
            combined.push_str(&output.stderr);
        }

        let original_bytes = combined.len();
        let truncated = original_bytes > MAX_OUTPUT_BYTES;
        if truncated {
            let keep = truncate_str(&combined, MAX_OUTPUT_BYTES).len();
            combined.truncate(keep);
            combined.push_str("\n... [output truncated]");
        }

        let is_error = output.exit_code != 0 || output.timed_out || output.interrupted;
        Ok(text_result(combined, is_error).with_details(json!({
            "command": command,
            "exitCode": output.exit_code,
            "durationMs": output.duration_ms,
            "timedOut": output.timed_out,
            "interrupted": output.interrupted,
            "truncated": truncated,
            "originalBytes": original_bytes,
        })))
    }
}
