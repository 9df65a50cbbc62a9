//! # enclave-core
//!
//! Foundation types shared by every Enclave crate.
//!
//! - **Branded IDs**: `EventId`, `ToolCallId` as newtypes for type safety
//! - **Tool schema and results**: `ToolDefinition`, `ToolResult`, `ToolCategory`
//! - **Text helpers**: UTF-8 safe truncation used by audit sanitization
//! - **Logging**: `tracing` subscriber initialization

#![deny(unsafe_code)]

pub mod ids;
pub mod logging;
pub mod text;
pub mod tools;

/// Current UTC time as an RFC 3339 string with millisecond precision.
pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
