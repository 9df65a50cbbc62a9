//! Sandbox policy settings.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// How strictly tool calls are confined.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SandboxMode {
    /// Block-list, path confinement, quotas and command screening all refuse.
    #[default]
    Strict,
    /// Same checks, but dangerous commands are only audited as warnings.
    Permissive,
    /// No enforcement. Tool calls are still audited.
    Disabled,
}

impl SandboxMode {
    /// Lowercase name as used in settings and audit details.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Strict => "strict",
            Self::Permissive => "permissive",
            Self::Disabled => "disabled",
        }
    }
}

impl fmt::Display for SandboxMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SandboxMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "permissive" => Ok(Self::Permissive),
            "disabled" | "off" => Ok(Self::Disabled),
            other => Err(format!("unknown sandbox mode: {other}")),
        }
    }
}

/// Sandbox policy applied to every session.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SandboxSettings {
    /// Enforcement mode.
    pub mode: SandboxMode,
    /// Tool names refused outright (merged with the strict-mode defaults).
    pub blocked_tools: Vec<String>,
    /// Per-tool parameter overrides, keyed by tool name. Override values win
    /// over the parameters an agent supplies.
    pub tool_overrides: HashMap<String, Map<String, Value>>,
}
