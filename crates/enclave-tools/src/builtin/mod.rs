//! Built-in workspace tools.

mod delete_file;
mod list_directory;
mod read_file;
mod run_shell;
mod save_file;

use std::sync::Arc;

pub use delete_file::DeleteFileTool;
pub use list_directory::ListDirectoryTool;
pub use read_file::ReadFileTool;
pub use run_shell::RunShellTool;
pub use save_file::SaveFileTool;

use crate::process::TokioProcessRunner;
use crate::traits::{AgentTool, ProcessRunner};

/// The built-in tool set with shell commands executed by `runner`.
pub fn builtin_tools(runner: Arc<dyn ProcessRunner>) -> Vec<Arc<dyn AgentTool>> {
    vec![
        Arc::new(ReadFileTool),
        Arc::new(SaveFileTool),
        Arc::new(ListDirectoryTool),
        Arc::new(DeleteFileTool),
        Arc::new(RunShellTool::new(runner)),
    ]
}

/// The built-in tool set backed by real subprocesses.
pub fn default_tools() -> Vec<Arc<dyn AgentTool>> {
    builtin_tools(Arc::new(TokioProcessRunner))
}
