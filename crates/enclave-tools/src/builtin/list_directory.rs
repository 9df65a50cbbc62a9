//! `list_directory`: list the entries of a directory.

use async_trait::async_trait;
use enclave_core::tools::{ToolCategory, ToolDefinition, ToolParameterSchema, ToolResult, text_result};
use serde_json::{Value, json};

use crate::errors::ToolError;
use crate::traits::{AgentTool, FileOperation, ToolContext};
use crate::utils::{fs_error_result, optional_string, resolve_path};

/// Lists directory entries, directories suffixed with `/`.
pub struct ListDirectoryTool;

#[async_trait]
impl AgentTool for ListDirectoryTool {
    fn name(&self) -> &str {
        "list_directory"
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Filesystem
    }

    fn file_operation(&self) -> Option<FileOperation> {
        Some(FileOperation::Read)
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "list_directory".into(),
            description: "List files and directories. Defaults to the workspace root.".into(),
            category: ToolCategory::Filesystem,
            parameters: ToolParameterSchema::object(
                vec![(
                    "path",
                    json!({"type": "string", "description": "Directory to list, relative to the workspace"}),
                )],
                &[],
            ),
        }
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<ToolResult, ToolError> {
        let path = optional_string(&params, "path").unwrap_or_else(|| ".".into());
        let resolved = resolve_path(&path, &ctx.working_directory);

        let mut reader = match tokio::fs::read_dir(&resolved).await {
            Ok(r) => r,
            Err(e) => return Ok(fs_error_result(&e, &resolved, "listing")),
        };

        let mut entries = Vec::new();
        loop {
            match reader.next_entry().await {
                Ok(Some(entry)) => {
                    let mut name = entry.file_name().to_string_lossy().into_owned();
                    if entry.file_type().await.is_ok_and(|t| t.is_dir()) {
                        name.push('/');
                    }
                    entries.push(name);
                }
                Ok(None) => break,
                Err(e) => return Ok(fs_error_result(&e, &resolved, "listing")),
            }
        }
        entries.sort();

        let content = if entries.is_empty() {
            "(empty directory)".to_owned()
        } else {
            entries.join("\n")
        };
        Ok(text_result(content, false).with_details(json!({
            "path": resolved.display().to_string(),
            "count": entries.len(),
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lists_sorted_with_dir_suffix() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.txt"), "").unwrap();
        std::fs::create_dir(dir.path().join("a")).unwrap();
        let ctx = ToolContext::new("c1", "s1", dir.path());

        let r = ListDirectoryTool.execute(json!({}), &ctx).await.unwrap();
        assert!(!r.is_error);
        assert_eq!(r.content, "a/\nb.txt");
        assert_eq!(r.details.unwrap()["count"], 2);
    }

    #[tokio::test]
    async fn empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ToolContext::new("c1", "s1", dir.path());
        let r = ListDirectoryTool
            .execute(json!({"path": "."}), &ctx)
            .await
            .unwrap();
        assert_eq!(r.content, "(empty directory)");
    }

    #[tokio::test]
    async fn missing_directory_is_error_result() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ToolContext::new("c1", "s1", dir.path());
        let r = ListDirectoryTool
            .execute(json!({"path": "missing"}), &ctx)
            .await
            .unwrap();
        assert!(r.is_error);
    }
}
