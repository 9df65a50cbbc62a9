//! A session's sandboxed tool set.

use std::sync::Arc;

use enclave_core::tools::ToolDefinition;
use enclave_tools::{AgentTool, ToolRegistry};
use tracing::debug;

use crate::context::ExecutionContext;
use crate::facade::SandboxedTool;

/// Every tool of one session, each wrapped with the same context.
pub struct Toolkit {
    ctx: Arc<ExecutionContext>,
    tools: Vec<Arc<SandboxedTool>>,
}

impl Toolkit {
    /// Wrap `tools` with `ctx`.
    pub fn new(ctx: Arc<ExecutionContext>, tools: Vec<Arc<dyn AgentTool>>) -> Self {
        let tools = tools
            .into_iter()
            .map(|tool| Arc::new(SandboxedTool::new(tool, ctx.clone())))
            .collect();
        Self { ctx, tools }
    }

    /// Look up a wrapped tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<SandboxedTool>> {
        self.tools.iter().find(|t| t.name() == name).cloned()
    }

    /// Definitions of every tool, sorted by name.
    pub fn describe_all(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self.tools.iter().map(|t| t.definition()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Tool names in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    /// Number of tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether the toolkit has no tools.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// A registry holding the wrapped tools, for agents and the executor.
    pub fn registry(&self) -> ToolRegistry {
        ToolRegistry::from_tools(
            self.tools
                .iter()
                .map(|t| Arc::clone(t) as Arc<dyn AgentTool>),
        )
    }

    /// Confine an agent-supplied registry to this toolkit's sandbox.
    ///
    /// Tools this toolkit already wrapped are kept as they are; every other
    /// tool is wrapped with the toolkit's context, so no call reaches a raw
    /// tool and none is audited twice.
    pub fn confine(&self, registry: &ToolRegistry) -> ToolRegistry {
        ToolRegistry::from_tools(
            registry
                .names()
                .iter()
                .filter_map(|name| registry.get(name))
                .map(|tool| {
                    if self.owns(&tool) {
                        tool
                    } else {
                        debug!(
                            session_id = self.ctx.session_id(),
                            tool_name = tool.name(),
                            "wrapping agent-supplied tool"
                        );
                        Arc::new(SandboxedTool::new(tool, self.ctx.clone())) as Arc<dyn AgentTool>
                    }
                }),
        )
    }

    /// The shared context.
    pub fn context(&self) -> &Arc<ExecutionContext> {
        &self.ctx
    }

    fn owns(&self, tool: &Arc<dyn AgentTool>) -> bool {
        self.tools
            .iter()
            .any(|own| std::ptr::addr_eq(Arc::as_ptr(own), Arc::as_ptr(tool)))
    }
}

impl std::fmt::Debug for Toolkit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Toolkit")
            .field("session_id", &self.ctx.session_id())
            .field("tools", &self.names())
            .finish()
    }
}
