//! `delete_file`: remove a file, or a directory when `recursive` is set.

use async_trait::async_trait;
use enclave_core::tools::{ToolCategory, ToolDefinition, ToolParameterSchema, ToolResult, text_result};
use serde_json::{Value, json};

use crate::errors::ToolError;
use crate::traits::{AgentTool, FileOperation, ToolContext};
use crate::utils::{fs_error_result, optional_bool, required_string, resolve_path};

/// Deletes a file or directory.
pub struct DeleteFileTool;

#[async_trait]
impl AgentTool for DeleteFileTool {
    fn name(&self) -> &str {
        "delete_file"
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Filesystem
    }

    fn file_operation(&self) -> Option<FileOperation> {
        Some(FileOperation::Delete)
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "delete_file".into(),
            description: "Delete a file. Directories require recursive=true.".into(),
            category: ToolCategory::Filesystem,
            parameters: ToolParameterSchema::object(
                vec![
                    (
                        "path",
                        json!({"type": "string", "description": "Path to delete, relative to the workspace"}),
                    ),
                    (
                        "recursive",
                        json!({"type": "boolean", "description": "Allow deleting a directory and its contents"}),
                    ),
                ],
                &["path"],
            ),
        }
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<ToolResult, ToolError> {
        let path = match required_string(&params, "path", "path to delete") {
            Ok(p) => p,
            Err(e) => return Ok(e),
        };
        let recursive = optional_bool(&params, "recursive").unwrap_or(false);
        let resolved = resolve_path(&path, &ctx.working_directory);

        let meta = match tokio::fs::symlink_metadata(&resolved).await {
            Ok(m) => m,
            Err(e) => return Ok(fs_error_result(&e, &resolved, "deleting")),
        };

        let outcome = if meta.is_dir() {
            if !recursive {
                return Ok(text_result(
                    format!(
                        "{} is a directory; pass recursive=true to delete it",
                        resolved.display()
                    ),
                    true,
                ));
            }
            tokio::fs::remove_dir_all(&resolved).await
        } else {
            tokio::fs::remove_file(&resolved).await
        };

        if let Err(e) = outcome {
            return Ok(fs_error_result(&e, &resolved, "deleting"));
        }

        Ok(
            text_result(format!("Deleted {}", resolved.display()), false).with_details(json!({
                "path": resolved.display().to_string(),
                "directory": meta.is_dir(),
            })),
        )
    }
}
