//! # enclave-tools
//!
//! The [`AgentTool`] trait every tool implements, the [`ToolRegistry`] the
//! runtime dispatches through, a [`ProcessRunner`] abstraction for shell
//! execution, and the built-in workspace tools:
//!
//! | Tool | Category | Purpose |
//! |------|----------|---------|
//! | `read_file` | filesystem | Read a text file |
//! | `save_file` | filesystem | Create or overwrite a file |
//! | `list_directory` | filesystem | List directory entries |
//! | `delete_file` | filesystem | Remove a file or directory |
//! | `run_shell` | shell | Run a shell command |
//!
//! Tools here enforce nothing about confinement. The sandbox crate wraps them.

#![deny(unsafe_code)]

pub mod builtin;
pub mod errors;
pub mod process;
pub mod registry;
pub mod traits;
pub mod utils;

pub use builtin::{builtin_tools, default_tools};
pub use errors::ToolError;
pub use process::TokioProcessRunner;
pub use registry::ToolRegistry;
pub use traits::{AgentTool, FileOperation, ProcessOptions, ProcessOutput, ProcessRunner, ToolContext};
