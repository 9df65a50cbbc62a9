//! Per-session topic names.

use serde::Serialize;

/// The three topics a session broker wires together.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Topics {
    /// Inbound to the controller: user messages and tool outputs.
    pub agent: String,
    /// Outbound to the client forwarder.
    pub client: String,
    /// Inbound to the tool executor.
    pub runtime: String,
}

impl Topics {
    /// Topic names for `session_id`.
    pub fn for_session(session_id: &str) -> Self {
        Self {
            agent: format!("agent.{session_id}"),
            client: format!("client.{session_id}"),
            runtime: format!("runtime.{session_id}"),
        }
    }
}
