use std::sync::Arc;
use std::time::Duration;

use convocore_core::config::TOOL_APPROVAL_TIMEOUT_SECS;
use convocore_core::types::{ApprovalId, RiskLevel};
use dashmap::DashMap;
use tokio::sync::oneshot;
use tracing::warn;

use crate::builtins::built_in_tools;
use crate::context::ToolContext;
use crate::optin::opt_in_tools;
use crate::tool::{Tool, ToolResult};

#[derive(Debug, Clone)]
pub enum ApprovalDecision {
    Approved { modified_args: Option<serde_json::Value> },
    Denied,
}

/// Catalogue of built-in + opt-in tools, plus the pending-approval table
/// backing the high-risk tool approval flow. MCP tools are supplied per-call
/// by the caller (they are fetched per-user through the 30-second cache in
/// `convocore-providers::mcp`, not owned by this registry).
pub struct ToolRegistry {
    built_ins: Vec<Arc<dyn Tool>>,
    opt_ins: Vec<Arc<dyn Tool>>,
    pending: DashMap<String, oneshot::Sender<ApprovalDecision>>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            built_ins: built_in_tools().into_iter().map(Arc::from).collect(),
            opt_ins: opt_in_tools().into_iter().map(Arc::from).collect(),
            pending: DashMap::new(),
        }
    }

    /// The tool set visible to one agent: every built-in, plus opt-ins and
    /// MCP tools not named in `excluded`.
    pub fn tool_set(&self, excluded: &[String], mcp_tools: &[Arc<dyn Tool>]) -> Vec<Arc<dyn Tool>> {
        self.built_ins
            .iter()
            .cloned()
            .chain(self.opt_ins.iter().filter(|t| !excluded.iter().any(|e| e == t.name())).cloned())
            .chain(mcp_tools.iter().filter(|t| !excluded.iter().any(|e| e == t.name())).cloned())
            .collect()
    }

    /// Resolve a `tool_approval_response` event. Returns `false` if no tool
    /// call is waiting under this id (already timed out or unknown).
    pub fn resolve_approval(&self, approval_id: &str, decision: ApprovalDecision) -> bool {
        match self.pending.remove(approval_id) {
            Some((_, tx)) => tx.send(decision).is_ok(),
            None => false,
        }
    }

    /// Execute a tool call end to end. Low-risk tools run immediately.
    /// High-risk tools call `emit_approval_request` (so the caller can send
    /// the `tool_approval_request` event) and then block until a matching
    /// `tool_approval_response` arrives or `TOOL_APPROVAL_TIMEOUT_SECS`
    /// elapses, whichever comes first.
    pub async fn execute<F, Fut>(
        &self,
        tool: &Arc<dyn Tool>,
        args: serde_json::Value,
        ctx: &ToolContext,
        emit_approval_request: F,
    ) -> ToolResult
    where
        F: FnOnce(String, serde_json::Value) -> Fut,
        Fut: std::future::Future<Output = ()>,
    {
        if tool.risk_level() == RiskLevel::Low {
            return tool.execute(args, ctx).await;
        }

        let approval_id = ApprovalId::new().to_string();
        let (tx, rx) = oneshot::channel();
        self.pending.insert(approval_id.clone(), tx);

        emit_approval_request(approval_id.clone(), args.clone()).await;

        match tokio::time::timeout(Duration::from_secs(TOOL_APPROVAL_TIMEOUT_SECS), rx).await {
            Ok(Ok(ApprovalDecision::Approved { modified_args })) => {
                tool.execute(modified_args.unwrap_or(args), ctx).await
            }
            Ok(Ok(ApprovalDecision::Denied)) => ToolResult::denied(tool.name(), "user_denied"),
            Ok(Err(_)) => ToolResult::denied(tool.name(), "user_denied"),
            Err(_) => {
                self.pending.remove(&approval_id);
                warn!(tool = tool.name(), approval_id, "tool approval timed out");
                ToolResult::denied(tool.name(), "timeout")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn excluded_tools_are_removed_from_the_set() {
        let registry = ToolRegistry::new();
        let excluded = vec!["play_music".to_string()];
        let set = registry.tool_set(&excluded, &[]);
        assert!(set.iter().any(|t| t.name() == "search_messages"));
        assert!(!set.iter().any(|t| t.name() == "play_music"));
    }

    #[test]
    fn built_ins_cannot_be_excluded() {
        let registry = ToolRegistry::new();
        let excluded = vec!["search_messages".to_string()];
        let set = registry.tool_set(&excluded, &[]);
        assert!(set.iter().any(|t| t.name() == "search_messages"));
    }
}
