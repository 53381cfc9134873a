use async_trait::async_trait;
use convocore_core::types::RiskLevel;
use serde::{Deserialize, Serialize};

use crate::context::ToolContext;

/// Result of executing a tool — fed back to the LLM as `tool` role content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub content: String,
    pub is_error: bool,
}

impl ToolResult {
    pub fn success(content: impl Into<String>) -> Self {
        Self { content: content.into(), is_error: false }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self { content: message.into(), is_error: true }
    }

    /// A tool-approval denial or timeout, recorded identically to any other
    /// `tool-error` so the model sees a uniform failure shape either way.
    pub fn denied(tool_name: &str, reason: &str) -> Self {
        let payload = serde_json::json!({
            "error": "tool call denied",
            "tool_name": tool_name,
            "reason": reason,
        });
        Self { content: payload.to_string(), is_error: true }
    }
}

/// Trait every built-in, opt-in, and MCP-backed tool implements.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn input_schema(&self) -> serde_json::Value;
    fn risk_level(&self) -> RiskLevel {
        RiskLevel::Low
    }
    async fn execute(&self, input: serde_json::Value, ctx: &ToolContext) -> ToolResult;
}
