//! Parameter validation and path helpers shared by the built-in tools.
//!
//! Validation failures are returned as ready-made error results so tools can
//! hand them straight back to the agent.

use std::path::{Path, PathBuf};

use enclave_core::tools::{ToolResult, error_result};
use serde_json::Value;

/// Extract a required non-empty string parameter.
pub fn required_string(params: &Value, key: &str, what: &str) -> Result<String, ToolResult> {
    match params.get(key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.clone()),
        Some(Value::String(_)) => Err(error_result(format!(
            "Invalid value for parameter: {key} ({what} must not be empty)"
        ))),
        Some(Value::Null) | None => Err(error_result(format!(
            "Missing required parameter: {key} ({what})"
        ))),
        Some(_) => Err(error_result(format!(
            "Invalid type for parameter: {key} (expected string)"
        ))),
    }
}

/// Extract an optional string parameter. Non-strings are treated as absent.
pub fn optional_string(params: &Value, key: &str) -> Option<String> {
    params.get(key).and_then(Value::as_str).map(String::from)
}

/// Extract an optional unsigned integer parameter.
pub fn optional_u64(params: &Value, key: &str) -> Option<u64> {
    params.get(key).and_then(Value::as_u64)
}

/// Extract an optional boolean parameter.
pub fn optional_bool(params: &Value, key: &str) -> Option<bool> {
    params.get(key).and_then(Value::as_bool)
}

/// Resolve a path against a working directory.
///
/// Absolute paths are returned unchanged; relative paths are joined.
pub fn resolve_path(path: &str, working_directory: &Path) -> PathBuf {
    let p = Path::new(path);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        working_directory.join(p)
    }
}

/// Map an I/O failure to an agent-facing error result.
pub fn fs_error_result(err: &std::io::Error, path: &Path, action: &str) -> ToolResult {
    let message = match err.kind() {
        std::io::ErrorKind::NotFound => format!("File not found: {}", path.display()),
        std::io::ErrorKind::PermissionDenied => {
            format!("Permission denied {action} {}", path.display())
        }
        _ => format!("Error {action} {}: {err}", path.display()),
    };
    error_result(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn required_string_present() {
        let params = json!({"path": "a.txt"});
        assert_eq!(required_string(&params, "path", "the path").unwrap(), "a.txt");
    }

    #[test]
    fn required_string_missing() {
        let err = required_string(&json!({}), "path", "the path").unwrap_err();
        assert!(err.is_error);
        assert!(err.content.contains("Missing required parameter: path"));
    }

    #[test]
    fn required_string_wrong_type() {
        let err = required_string(&json!({"path": 3}), "path", "the path").unwrap_err();
        assert!(err.content.contains("expected string"));
    }

    #[test]
    fn required_string_blank() {
        let err = required_string(&json!({"path": "  "}), "path", "the path").unwrap_err();
        assert!(err.content.contains("must not be empty"));
    }

    #[test]
    fn resolve_relative_and_absolute() {
        let wd = Path::new("/ws");
        assert_eq!(resolve_path("a/b", wd), PathBuf::from("/ws/a/b"));
        assert_eq!(resolve_path("/etc/x", wd), PathBuf::from("/etc/x"));
    }

    #[test]
    fn fs_error_not_found_message() {
        let err = std::io::Error::new(std::io::ErrorKind::NotFound, "x");
        let r = fs_error_result(&err, Path::new("/ws/a"), "reading");
        assert_eq!(r.content, "File not found: /ws/a");
    }
}
