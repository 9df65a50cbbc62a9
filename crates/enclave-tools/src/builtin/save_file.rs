//! `save_file`: create or overwrite a file.
//!
//! Parent directories are created as needed. The write size is declared up
//! front so storage quotas can be checked before anything touches disk.

use async_trait::async_trait;
use enclave_core::tools::{ToolCategory, ToolDefinition, ToolParameterSchema, ToolResult, text_result};
use serde_json::{Value, json};

use crate::errors::ToolError;
use crate::traits::{AgentTool, FileOperation, ToolContext};
use crate::utils::{fs_error_result, required_string, resolve_path};

/// Writes text content to a file.
pub struct SaveFileTool;

#[async_trait]
impl AgentTool for SaveFileTool {
    fn name(&self) -> &str {
        "save_file"
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Filesystem
    }

    fn file_operation(&self) -> Option<FileOperation> {
        Some(FileOperation::Write)
    }

    fn write_size(&self, params: &Value) -> Option<u64> {
        params
            .get("content")
            .and_then(Value::as_str)
            .map(|c| u64::try_from(c.len()).unwrap_or(u64::MAX))
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "save_file".into(),
            description: "Write content to a file, creating it or overwriting it.".into(),
            category: ToolCategory::Filesystem,
            parameters: ToolParameterSchema::object(
                vec![
                    (
                        "file_path",
                        json!({"type": "string", "description": "Path of the file, relative to the workspace"}),
                    ),
                    (
                        "content",
                        json!({"type": "string", "description": "The content to write"}),
                    ),
                ],
                &["file_path", "content"],
            ),
        }
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<ToolResult, ToolError> {
        let file_path = match required_string(&params, "file_path", "path of the file") {
            Ok(p) => p,
            Err(e) => return Ok(e),
        };
        let content = match params.get("content") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => {
                return Ok(text_result(
                    "Missing required parameter: content (the content to write)",
                    true,
                ));
            }
            Some(_) => {
                return Ok(text_result(
                    "Invalid type for parameter: content (expected string)",
                    true,
                ));
            }
        };

        let resolved = resolve_path(&file_path, &ctx.working_directory);
        let existed = tokio::fs::try_exists(&resolved).await.unwrap_or(false);

        if let Some(parent) = resolved.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                return Ok(fs_error_result(&e, parent, "creating directory"));
            }
        }

        if let Err(e) = tokio::fs::write(&resolved, content.as_bytes()).await {
            return Ok(fs_error_result(&e, &resolved, "writing"));
        }

        let bytes = content.len();
        let verb = if existed { "overwritten" } else { "created" };
        Ok(text_result(
            format!("Wrote {bytes} bytes to {} ({verb})", resolved.display()),
            false,
        )
        .with_details(json!({
            "path": resolved.display().to_string(),
            "bytes": bytes,
            "created": !existed,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn creates_file_and_parents() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ToolContext::new("c1", "s1", dir.path());
        let r = SaveFileTool
            .execute(json!({"file_path": "a/b/c.txt", "content": "hi"}), &ctx)
            .await
            .unwrap();
        assert!(!r.is_error, "{}", r.content);
        assert!(r.content.contains("(created)"));
        assert_eq!(
            std::fs::read_to_string(dir.path().join("a/b/c.txt")).unwrap(),
            "hi"
        );
    }

    #[tokio::test]
    async fn overwrite_reported() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("x.txt"), "old").unwrap();
        let ctx = ToolContext::new("c1", "s1", dir.path());
        let r = SaveFileTool
            .execute(json!({"file_path": "x.txt", "content": "new"}), &ctx)
            .await
            .unwrap();
        assert!(r.content.contains("(overwritten)"));
        assert_eq!(r.details.unwrap()["created"], false);
    }

    #[tokio::test]
    async fn missing_content_is_error_result() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ToolContext::new("c1", "s1", dir.path());
        let r = SaveFileTool
            .execute(json!({"file_path": "x.txt"}), &ctx)
            .await
            .unwrap();
        assert!(r.is_error);
        assert!(r.content.contains("content"));
    }

    #[test]
    fn write_size_is_content_length() {
        assert_eq!(
            SaveFileTool.write_size(&json!({"file_path": "a", "content": "héllo"})),
            Some(6)
        );
        assert_eq!(SaveFileTool.write_size(&json!({"file_path": "a"})), None);
    }
}
