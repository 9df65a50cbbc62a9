//! `read_file`: read a text file.

use async_trait::async_trait;
use enclave_core::text::truncate_str;
use enclave_core::tools::{
    ToolCategory, ToolDefinition, ToolParameterSchema, ToolResult, text_result,
};
use serde_json::{Value, json};

use crate::errors::ToolError;
use crate::traits::{AgentTool, FileOperation, ToolContext};
use crate::utils::{fs_error_result, optional_u64, required_string, resolve_path};

const DEFAULT_MAX_BYTES: u64 = 1024 * 1024;

/// Reads a file as (lossy) UTF-8 text.
pub struct ReadFileTool;

#[async_trait]
impl AgentTool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Filesystem
    }

    fn file_operation(&self) -> Option<FileOperation> {
        Some(FileOperation::Read)
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "read_file".into(),
            description: "Read the contents of a text file in the workspace.".into(),
            category: ToolCategory::Filesystem,
            parameters: ToolParameterSchema::object(
                vec![
                    (
                        "file_path",
                        json!({"type": "string", "description": "Path of the file, relative to the workspace"}),
                    ),
                    (
                        "max_bytes",
                        json!({"type": "integer", "description": "Maximum bytes to return (default 1 MiB)"}),
                    ),
                ],
                &["file_path"],
            ),
        }
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<ToolResult, ToolError> {
        let file_path = match required_string(&params, "file_path", "path of the file") {
            Ok(p) => p,
            Err(e) => return Ok(e),
        };
        let max_bytes = optional_u64(&params, "max_bytes").unwrap_or(DEFAULT_MAX_BYTES);
        let resolved = resolve_path(&file_path, &ctx.working_directory);

        match tokio::fs::metadata(&resolved).await {
            Ok(meta) if meta.is_dir() => {
                return Ok(text_result(
                    format!("Is a directory: {}", resolved.display()),
                    true,
                ));
            }
            Ok(_) => {}
            Err(e) => return Ok(fs_error_result(&e, &resolved, "reading")),
        }

        let bytes = match tokio::fs::read(&resolved).await {
            Ok(b) => b,
            Err(e) => return Ok(fs_error_result(&e, &resolved, "reading")),
        };

        let text = String::from_utf8_lossy(&bytes);
        let limit = usize::try_from(max_bytes).unwrap_or(usize::MAX);
        let content = truncate_str(&text, limit);
        let truncated = content.len() < text.len();

        Ok(text_result(content, false).with_details(json!({
            "path": resolved.display().to_string(),
            "bytes": bytes.len(),
            "truncated": truncated,
        })))
    }
}
