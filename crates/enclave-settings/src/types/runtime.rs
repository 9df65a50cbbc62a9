//! Runner pool and session execution settings.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// How a session runner drives its agent.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunnerMode {
    /// Messages flow through the per-session topic broker with a tool loop.
    #[default]
    Broker,
    /// Each message is one awaited agent step; no tool loop.
    Direct,
}

impl RunnerMode {
    /// Lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Broker => "broker",
            Self::Direct => "direct",
        }
    }
}

impl fmt::Display for RunnerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunnerMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "broker" => Ok(Self::Broker),
            "direct" => Ok(Self::Direct),
            other => Err(format!("unknown runner mode: {other}")),
        }
    }
}

/// Runner pool and per-session execution bounds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RuntimeSettings {
    /// Maximum concurrently registered runners.
    pub max_runners: usize,
    /// Per tool call execution timeout.
    pub tool_timeout_ms: u64,
    /// How long `stop` waits for session tasks before aborting them.
    pub stop_grace_ms: u64,
    /// Agent steps allowed while handling one user message.
    pub max_steps_per_message: u32,
    /// Default runner strategy.
    pub mode: RunnerMode,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            max_runners: 100,
            tool_timeout_ms: 120_000,
            stop_grace_ms: 5_000,
            max_steps_per_message: 50,
            mode: RunnerMode::Broker,
        }
    }
}
