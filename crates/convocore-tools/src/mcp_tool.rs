use std::sync::Arc;

use async_trait::async_trait;
use convocore_providers::mcp::{McpClient, McpServerSpec, McpToolSchema};

use crate::context::ToolContext;
use crate::tool::{Tool, ToolResult};

/// Wraps one remote MCP tool schema as a local `Tool`. Always high-risk:
/// the implementation behind an MCP server is opaque to this core.
pub struct McpTool {
    schema: McpToolSchema,
    server: McpServerSpec,
    client: Arc<dyn McpClient>,
}

impl McpTool {
    pub fn new(schema: McpToolSchema, server: McpServerSpec, client: Arc<dyn McpClient>) -> Self {
        Self { schema, server, client }
    }
}

#[async_trait]
impl Tool for McpTool {
    fn name(&self) -> &str {
        &self.schema.name
    }

    fn description(&self) -> &str {
        &self.schema.description
    }

    fn input_schema(&self) -> serde_json::Value {
        self.schema.input_schema.clone()
    }

    fn risk_level(&self) -> convocore_core::types::RiskLevel {
        convocore_core::types::RiskLevel::High
    }

    async fn execute(&self, input: serde_json::Value, _ctx: &ToolContext) -> ToolResult {
        match self.client.call_tool(&self.server, &self.schema.name, input).await {
            Ok(result) => ToolResult::success(result.to_string()),
            Err(e) => ToolResult::error(e.to_string()),
        }
    }
}
