//! Tool definition and result types.
//!
//! Defines the schema for tools an agent can invoke, plus the result type
//! returned by tool execution. Results are plain data: a failed tool call is a
//! result with `is_error` set, never a Rust error, so the agent can react.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ─────────────────────────────────────────────────────────────────────────────
// Tool schema
// ─────────────────────────────────────────────────────────────────────────────

/// JSON Schema-compatible parameter definition for a tool.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolParameterSchema {
    /// Top-level JSON Schema type.
    #[serde(rename = "type")]
    pub schema_type: String,
    /// Property definitions (when type is `object`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<serde_json::Map<String, Value>>,
    /// Required property names.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<Vec<String>>,
}

impl ToolParameterSchema {
    /// Object schema with the given `(name, schema)` properties.
    pub fn object(properties: Vec<(&str, Value)>, required: &[&str]) -> Self {
        let properties = properties
            .into_iter()
            .map(|(name, schema)| (name.to_owned(), schema))
            .collect();
        Self {
            schema_type: "object".into(),
            properties: Some(properties),
            required: (!required.is_empty())
                .then(|| required.iter().map(|r| (*r).to_owned()).collect()),
        }
    }

    /// Names of all declared properties.
    pub fn property_names(&self) -> Vec<&str> {
        self.properties
            .as_ref()
            .map(|p| p.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }
}

/// A tool definition exposed to the agent for capability discovery.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool name (unique identifier).
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// Tool category.
    pub category: ToolCategory,
    /// JSON Schema for the tool's parameters.
    pub parameters: ToolParameterSchema,
}

/// Tool category for grouping and sandbox policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCategory {
    /// File system operations.
    Filesystem,
    /// Shell command execution (subject to command screening).
    Shell,
    /// Background process control.
    Process,
    /// Network/HTTP operations.
    Network,
    /// Custom/user-defined.
    Custom,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tool result
// ─────────────────────────────────────────────────────────────────────────────

/// Result of a tool execution.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResult {
    /// The tool output text.
    pub content: String,
    /// Optional structured details (tool-specific metadata).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    /// Whether the execution resulted in an error.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
}

impl ToolResult {
    /// Whether the tool call succeeded.
    pub fn is_success(&self) -> bool {
        !self.is_error
    }

    /// Attach structured details.
    #[must_use]
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// Create a simple text result.
#[must_use]
pub fn text_result(text: impl Into<String>, is_error: bool) -> ToolResult {
    ToolResult {
        content: text.into(),
        details: None,
        is_error,
    }
}

/// Create an error result.
#[must_use]
pub fn error_result(message: impl Into<String>) -> ToolResult {
    text_result(message, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn object_schema_builder() {
        let schema = ToolParameterSchema::object(
            vec![
                ("file_path", json!({"type": "string"})),
                ("content", json!({"type": "string"})),
            ],
            &["file_path"],
        );
        assert_eq!(schema.schema_type, "object");
        assert_eq!(schema.required, Some(vec!["file_path".to_owned()]));
        let mut names = schema.property_names();
        names.sort_unstable();
        assert_eq!(names, vec!["content", "file_path"]);
    }

    #[test]
    fn object_schema_without_required_omits_field() {
        let schema = ToolParameterSchema::object(vec![], &[]);
        let json = serde_json::to_value(&schema).unwrap();
        assert!(json.get("required").is_none());
        assert_eq!(json["type"], "object");
    }

    #[test]
    fn error_result_is_error() {
        let r = error_result("boom");
        assert!(r.is_error);
        assert!(!r.is_success());
    }

    #[test]
    fn success_result_omits_is_error() {
        let r = text_result("ok", false).with_details(json!({"bytes": 2}));
        let json = serde_json::to_value(&r).unwrap();
        assert!(json.get("isError").is_none());
        assert_eq!(json["details"]["bytes"], 2);
        let back: ToolResult = serde_json::from_value(json).unwrap();
        assert_eq!(back, r);
    }

    #[test]
    fn category_serde() {
        assert_eq!(
            serde_json::to_string(&ToolCategory::Shell).unwrap(),
            "\"shell\""
        );
        assert_eq!(
            serde_json::to_string(&ToolCategory::Filesystem).unwrap(),
            "\"filesystem\""
        );
    }
}
