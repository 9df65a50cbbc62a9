//! # enclave-runtime
//!
//! Session execution for sandboxed agents.
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`agent`] | Agent and agent factory contracts |
//! | [`bus`] | In-process topic bus |
//! | [`topics`] | Per-session topic names |
//! | [`payload`] | Bus payloads |
//! | [`transform`] | Payload → client event mapping |
//! | [`sink`] | Client event delivery |
//! | [`controller`] | Agent step loop |
//! | [`executor`] | Tool call execution |
//! | [`broker`] | Per-session wiring of the above |
//! | [`runner`] | Session lifecycle, broker or direct |
//! | [`pool`] | Bounded runner registry |
//! | [`services`] | Shared settings and service handles |
//! | [`scripted`] | Line-scripted agent |

#![deny(unsafe_code)]

pub mod agent;
pub mod broker;
pub mod bus;
pub mod controller;
pub mod errors;
pub mod executor;
pub mod payload;
pub mod pool;
pub mod runner;
pub mod scripted;
pub mod services;
pub mod sink;
pub mod topics;
pub mod transform;

pub use agent::{Agent, AgentError, AgentFactory, AgentMessage, AgentSetup, ToolCall, ToolOutput};
pub use broker::{BrokerConfig, BrokerState, BrokerStats, SessionBroker};
pub use errors::{Result, RuntimeError};
pub use payload::BusPayload;
pub use pool::RunnerPool;
pub use runner::{RunnerStats, SessionRecord, SessionRunner};
pub use scripted::{SCRIPTED_AGENT_TYPE, ScriptedAgent, ScriptedAgentFactory};
pub use services::RuntimeServices;
pub use sink::{ChannelSink, EventSink, NullSink, SinkError};
pub use transform::{ExternalEvent, transform_event};
