//! Sandboxed tool wrapper.
//!
//! [`SandboxedTool`] wraps any [`AgentTool`] and runs every call through the
//! session's [`ExecutionContext`]:
//!
//! 1. block-list
//! 2. parameter overrides (overrides win)
//! 3. path confinement for the known path parameters
//! 4. dangerous-command screening for shell tools
//! 5. quota pre-check for tools that declare a write size
//! 6. invocation under the tool timeout, with panics captured
//! 7. audit of the outcome
//!
//! Every refusal or failure comes back as an error [`ToolResult`]; the
//! wrapper itself never returns `Err`.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use enclave_core::tools::{ToolCategory, ToolDefinition, ToolResult, error_result};
use enclave_tools::{AgentTool, FileOperation, ToolContext, ToolError};
use futures::FutureExt;
use serde_json::{Map, Value, json};
use tracing::{debug, warn};

use crate::audit::{AuditSeverity, ToolCallRecord};
use crate::context::{CommandVerdict, ExecutionContext};
use crate::errors::SandboxError;

/// Parameter names treated as workspace paths. `working_directory` is
/// deliberately absent: shell tools get it pinned through overrides.
pub const PATH_PARAMETERS: [&str; 8] = [
    "file_path",
    "path",
    "directory",
    "source",
    "destination",
    "target",
    "output_path",
    "input_path",
];

/// A tool whose calls are confined to one session's sandbox.
pub struct SandboxedTool {
    inner: Arc<dyn AgentTool>,
    ctx: Arc<ExecutionContext>,
}

impl SandboxedTool {
    /// Wrap `inner` with the session context.
    pub fn new(inner: Arc<dyn AgentTool>, ctx: Arc<ExecutionContext>) -> Self {
        Self { inner, ctx }
    }

    /// The wrapped tool.
    pub fn inner(&self) -> &Arc<dyn AgentTool> {
        &self.inner
    }

    /// The session context.
    pub fn context(&self) -> &Arc<ExecutionContext> {
        &self.ctx
    }

    fn elapsed_ms(start: Instant) -> u64 {
        u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    /// Audit the outcome and hand the result back.
    fn finish(&self, params: &Value, result: ToolResult, start: Instant) -> ToolResult {
        let _ = self.ctx.log_tool_execution(ToolCallRecord {
            tool_name: self.inner.name(),
            params,
            success: result.is_success(),
            error: result.is_error.then_some(result.content.as_str()),
            duration_ms: Self::elapsed_ms(start),
        });

        if result.is_success() {
            if let Some(op) = self.inner.file_operation() {
                let path = params
                    .get("file_path")
                    .or_else(|| params.get("path"))
                    .and_then(Value::as_str)
                    .unwrap_or(".");
                let _ = self.ctx.audit().log_file_operation(
                    self.ctx.tenant_id(),
                    self.ctx.session_id(),
                    op,
                    path,
                    self.inner.name(),
                );
            }
        }
        result
    }

    /// Refuse the call: record the violation, then the failed call.
    fn refuse(
        &self,
        params: &Value,
        start: Instant,
        action: &str,
        details: Value,
        severity: AuditSeverity,
        message: String,
    ) -> ToolResult {
        warn!(
            tool_name = self.inner.name(),
            session_id = self.ctx.session_id(),
            action,
            "sandbox refused tool call"
        );
        let _ = self.ctx.log_security_violation(action, details, severity);
        self.finish(params, error_result(message), start)
    }

    /// Steps 2 and 3: merge overrides, then confine path parameters.
    fn prepare_params(&self, params: Value) -> Result<Map<String, Value>, PrepareError> {
        let mut map = match params {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                return Err(PrepareError::Invalid(format!(
                    "Tool parameters must be a JSON object, got {}",
                    json_type_name(&other)
                )));
            }
        };

        for (key, value) in self.ctx.get_overrides(self.inner.name(), self.inner.category()) {
            let _ = map.insert(key, value);
        }

        for key in PATH_PARAMETERS {
            match map.get(key) {
                None | Some(Value::Null) => {}
                Some(Value::String(raw)) => {
                    let resolved = self
                        .ctx
                        .validate_path(raw)
                        .map_err(|e| PrepareError::Path {
                            key,
                            raw: raw.clone(),
                            source: e,
                        })?;
                    let _ = map.insert(key.to_owned(), json!(resolved.display().to_string()));
                }
                Some(other) => {
                    return Err(PrepareError::Invalid(format!(
                        "Invalid type for parameter: {key} (expected string, got {})",
                        json_type_name(other)
                    )));
                }
            }
        }
        Ok(map)
    }
}

enum PrepareError {
    Invalid(String),
    Path {
        key: &'static str,
        raw: String,
        source: SandboxError,
    },
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_owned()
    }
}

#[async_trait]
impl AgentTool for SandboxedTool {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn category(&self) -> ToolCategory {
        self.inner.category()
    }

    fn definition(&self) -> ToolDefinition {
        self.inner.definition()
    }

    fn file_operation(&self) -> Option<FileOperation> {
        self.inner.file_operation()
    }

    fn write_size(&self, params: &Value) -> Option<u64> {
        self.inner.write_size(params)
    }

    async fn execute(&self, params: Value, tool_ctx: &ToolContext) -> Result<ToolResult, ToolError> {
        let start = Instant::now();
        let name = self.inner.name();

        // 1. Block-list
        if self.ctx.is_blocked(name) {
            return Ok(self.refuse(
                &params,
                start,
                "tool_blocked",
                json!({"tool": name}),
                AuditSeverity::Warning,
                format!("Tool '{name}' is blocked by sandbox policy"),
            ));
        }

        // 2 + 3. Overrides, then path confinement
        let params = match self.prepare_params(params.clone()) {
            Ok(map) => Value::Object(map),
            Err(PrepareError::Invalid(message)) => {
                return Ok(self.finish(&params, error_result(message), start));
            }
            Err(PrepareError::Path { key, raw, source }) => {
                let (severity, message) = match &source {
                    SandboxError::PathEscape { .. } => (
                        AuditSeverity::Critical,
                        format!("Path '{raw}' is outside the workspace"),
                    ),
                    other => (AuditSeverity::Error, format!("Cannot resolve path '{raw}': {other}")),
                };
                return Ok(self.refuse(
                    &params,
                    start,
                    source.category(),
                    json!({"tool": name, "parameter": key, "path": raw}),
                    severity,
                    message,
                ));
            }
        };

        // 4. Dangerous command screening
        if self.inner.category() == ToolCategory::Shell {
            if let Some(command) = params.get("command").and_then(Value::as_str) {
                match self.ctx.screen_command(command) {
                    CommandVerdict::Allowed => {}
                    CommandVerdict::Flagged(pattern) => {
                        let _ = self.ctx.log_security_violation(
                            "dangerous_command",
                            json!({"tool": name, "pattern": pattern, "command": command, "enforced": false}),
                            AuditSeverity::Warning,
                        );
                    }
                    CommandVerdict::Refused(pattern) => {
                        let command = command.to_owned();
                        return Ok(self.refuse(
                            &params,
                            start,
                            "dangerous_command",
                            json!({"tool": name, "pattern": pattern, "command": command, "enforced": true}),
                            AuditSeverity::Critical,
                            format!("Command refused by sandbox: matches dangerous pattern '{pattern}'"),
                        ));
                    }
                }
            }
        }

        // 5. Quota pre-check
        if let Some(bytes) = self.inner.write_size(&params) {
            if let Err(e) = self.ctx.check_upload(bytes) {
                let details = match &e {
                    SandboxError::QuotaExceeded {
                        ceiling,
                        current,
                        requested,
                        limit,
                    } => json!({
                        "tool": name,
                        "ceiling": ceiling,
                        "current": current,
                        "requested": requested,
                        "limit": limit,
                    }),
                    other => json!({"tool": name, "error": other.to_string()}),
                };
                return Ok(self.refuse(
                    &params,
                    start,
                    e.category(),
                    details,
                    AuditSeverity::Warning,
                    format!("Write refused: {e}"),
                ));
            }
        }

        // 6. Invoke under timeout, capturing panics
        let mut call_ctx = tool_ctx.clone();
        call_ctx.working_directory = self.ctx.workspace_root().to_path_buf();
        let timeout = self.ctx.tool_timeout();
        debug!(tool_name = name, session_id = self.ctx.session_id(), "invoking sandboxed tool");

        let invocation = AssertUnwindSafe(self.inner.execute(params.clone(), &call_ctx)).catch_unwind();
        let result = match tokio::time::timeout(timeout, invocation).await {
            Ok(Ok(Ok(result))) => result,
            Ok(Ok(Err(e))) => error_result(format!("Tool '{name}' failed: {e}")),
            Ok(Err(panic)) => {
                let message = panic_message(panic.as_ref());
                warn!(tool_name = name, panic = %message, "tool panicked");
                error_result(format!("Tool '{name}' panicked: {message}"))
            }
            Err(_) => {
                call_ctx.cancellation.cancel();
                error_result(format!(
                    "Tool '{name}' timed out after {}ms",
                    timeout.as_millis()
                ))
            }
        };

        // 7. Audit
        Ok(self.finish(&params, result, start))
    }
}
