use std::sync::Arc;

use convocore_providers::llm::{ChatMessage, ChatRequest, LlmDelta, LlmProvider, ToolDefinition};
use convocore_tools::Tool;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// The Administrator's single routing decision for one orchestration hop.
/// Exactly one of these comes out of a non-forced hop.
#[derive(Debug, Clone)]
pub enum RouteDecision {
    RouteToAgent { agent_name: String, reason: String },
    RouteToUser { final_message: String },
}

fn tool_def(tool: &dyn Tool) -> ToolDefinition {
    ToolDefinition {
        name: tool.name().to_string(),
        description: tool.description().to_string(),
        input_schema: tool.input_schema(),
    }
}

/// Ask the Administrator to pick a route. Only `route_to_agent` and
/// `route_to_user` are offered — the Administrator's job here is routing,
/// not tool use.
pub async fn decide_route(
    llm: Arc<dyn LlmProvider>,
    model: &str,
    system: &str,
    history: Vec<ChatMessage>,
    route_to_agent: &dyn Tool,
    route_to_user: &dyn Tool,
) -> convocore_providers::Result<RouteDecision> {
    let req = ChatRequest {
        model: model.to_string(),
        system: system.to_string(),
        messages: history,
        tools: vec![tool_def(route_to_agent), tool_def(route_to_user)],
        think: false,
        max_tokens: 1024,
    };

    let (tx, mut rx) = mpsc::channel(32);
    llm.chat_stream(&req, tx, CancellationToken::new()).await?;

    let mut content = String::new();
    let mut calls = Vec::new();
    while let Some(delta) = rx.recv().await {
        match delta {
            LlmDelta::Content { text } => content.push_str(&text),
            LlmDelta::ToolCalls(c) => calls = c,
            LlmDelta::Thinking { .. } | LlmDelta::Done { .. } => {}
        }
    }

    for call in &calls {
        if call.name == "route_to_agent" {
            let agent_name = call.input.get("agent_name").and_then(|v| v.as_str()).unwrap_or_default().to_string();
            let reason = call.input.get("reason").and_then(|v| v.as_str()).unwrap_or_default().to_string();
            if !agent_name.is_empty() {
                return Ok(RouteDecision::RouteToAgent { agent_name, reason });
            }
        }
        if call.name == "route_to_user" {
            let final_message = call.input.get("final_message").and_then(|v| v.as_str()).unwrap_or(&content).to_string();
            return Ok(RouteDecision::RouteToUser { final_message });
        }
    }

    // The Administrator answered in plain text instead of calling a tool —
    // treat it as addressing the user directly rather than erroring the turn.
    Ok(RouteDecision::RouteToUser { final_message: content })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use convocore_providers::llm::ToolCall;
    use convocore_tools::{ToolContext, ToolResult};

    struct RouteToAgentStub;
    #[async_trait]
    impl Tool for RouteToAgentStub {
        fn name(&self) -> &str {
            "route_to_agent"
        }
        fn description(&self) -> &str {
            "route"
        }
        fn input_schema(&self) -> serde_json::Value {
            serde_json::json!({})
        }
        async fn execute(&self, _input: serde_json::Value, _ctx: &ToolContext) -> ToolResult {
            ToolResult::success("")
        }
    }

    struct RouteToUserStub;
    #[async_trait]
    impl Tool for RouteToUserStub {
        fn name(&self) -> &str {
            "route_to_user"
        }
        fn description(&self) -> &str {
            "route"
        }
        fn input_schema(&self) -> serde_json::Value {
            serde_json::json!({})
        }
        async fn execute(&self, _input: serde_json::Value, _ctx: &ToolContext) -> ToolResult {
            ToolResult::success("")
        }
    }

    struct StubLlm {
        calls: Vec<ToolCall>,
    }

    #[async_trait]
    impl LlmProvider for StubLlm {
        fn name(&self) -> &str {
            "stub"
        }
        async fn chat_stream(
            &self,
            _req: &ChatRequest,
            tx: mpsc::Sender<LlmDelta>,
            _cancel: CancellationToken,
        ) -> convocore_providers::Result<()> {
            let _ = tx.send(LlmDelta::ToolCalls(self.calls.clone())).await;
            let _ = tx.send(LlmDelta::Done { stop_reason: "tool_calls".into(), tokens_in: 0, tokens_out: 0 }).await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn extracts_route_to_agent_from_tool_call() {
        let llm = Arc::new(StubLlm {
            calls: vec![ToolCall { id: "1".into(), name: "route_to_agent".into(), input: serde_json::json!({"agent_name": "Chef", "reason": "cooking question"}) }],
        });
        let decision = decide_route(llm, "model", "system", vec![], &RouteToAgentStub, &RouteToUserStub).await.unwrap();
        match decision {
            RouteDecision::RouteToAgent { agent_name, reason } => {
                assert_eq!(agent_name, "Chef");
                assert_eq!(reason, "cooking question");
            }
            _ => panic!("expected RouteToAgent"),
        }
    }

    #[tokio::test]
    async fn falls_back_to_route_to_user_when_no_tool_call_made() {
        let llm = Arc::new(StubLlm { calls: vec![] });
        let decision = decide_route(llm, "model", "system", vec![], &RouteToAgentStub, &RouteToUserStub).await.unwrap();
        assert!(matches!(decision, RouteDecision::RouteToUser { .. }));
    }
}
