pub mod decision;

use std::collections::HashMap;
use std::sync::Arc;

use convocore_agent::{AgentRuntime, TurnEventSink};
use convocore_core::config::MAX_ORCHESTRATION_HOPS;
use convocore_core::types::AgentId;
use convocore_protocol::events::ServerEvent;
use convocore_providers::llm::LlmProvider;
use convocore_storage::types::Agent;
use convocore_storage::StorageGateway;
use convocore_tools::{MediaHandle, Tool};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use decision::{decide_route, RouteDecision};

/// Everything one agent turn needs, pre-resolved by the caller
/// (system message assembly, tool set, and excluded-tool filtering are the
/// gateway's job — the orchestrator only drives the hop loop).
pub struct RoutableAgent {
    pub agent: Agent,
    pub model: String,
    pub system: String,
    pub tools: Vec<Arc<dyn Tool>>,
}

/// One completed hop, recorded for later inspection.
#[derive(Debug, Clone)]
pub struct HopRecord {
    pub from_agent_id: Option<String>,
    pub to_agent_id: String,
    pub reason: String,
}

pub struct OrchestrationOutcome {
    pub hops: Vec<HopRecord>,
    pub final_message: String,
}

pub struct Orchestrator {
    storage: Arc<StorageGateway>,
    runtime: Arc<AgentRuntime>,
}

impl Orchestrator {
    pub fn new(storage: Arc<StorageGateway>, runtime: Arc<AgentRuntime>) -> Self {
        Self { storage, runtime }
    }

    /// Drive group-discussion mode for one incoming user message: the
    /// Administrator routes between agents (or straight to the user) until
    /// it calls `route_to_user` or the hop cap forces it.
    #[allow(clippy::too_many_arguments)]
    #[instrument(skip_all, fields(conversation_id, frame_id))]
    pub async fn run_session(
        &self,
        conversation_id: &str,
        frame_id: &str,
        administrator: &Agent,
        admin_model: &str,
        admin_system: String,
        route_to_agent: &dyn Tool,
        route_to_user: &dyn Tool,
        llm: Arc<dyn LlmProvider>,
        routable: &HashMap<String, RoutableAgent>,
        media_by_agent: &HashMap<String, Arc<dyn MediaHandle>>,
        user_id: &str,
        sink: Arc<dyn TurnEventSink>,
        cancel: CancellationToken,
    ) -> anyhow::Result<OrchestrationOutcome> {
        let mut hops = Vec::new();
        let mut from_agent_id: Option<String> = None;
        let mut from_name: Option<String> = None;

        for hop in 0..MAX_ORCHESTRATION_HOPS {
            if cancel.is_cancelled() {
                return Ok(OrchestrationOutcome { hops, final_message: String::new() });
            }

            let forced = hop == MAX_ORCHESTRATION_HOPS - 1;
            let decision = if forced {
                info!(conversation_id, "orchestration hop cap reached, forcing route_to_user");
                RouteDecision::RouteToUser { final_message: "I've reached my routing limit for this request — let me know if you'd like to continue.".to_string() }
            } else {
                let history = self.storage.get_frame_messages(frame_id)?;
                let chat_messages = convocore_agent::history::assemble_history(&history, Some(&administrator.id));
                decide_route(llm.clone(), admin_model, &admin_system, chat_messages, route_to_agent, route_to_user).await?
            };

            match decision {
                RouteDecision::RouteToUser { final_message } => {
                    return Ok(OrchestrationOutcome { hops, final_message });
                }
                RouteDecision::RouteToAgent { agent_name, reason } => {
                    let Some(target) = routable.get(&agent_name) else {
                        return Ok(OrchestrationOutcome {
                            hops,
                            final_message: format!("I tried to route this to \"{agent_name}\", but no such agent exists."),
                        });
                    };

                    sink.emit(ServerEvent::AgentSwitch {
                        from_agent_id: from_agent_id.clone(),
                        to_agent_id: target.agent.id.clone(),
                        from_name: from_name.clone(),
                        to_name: target.agent.name.clone(),
                        reason: reason.clone(),
                    }).await;

                    let media = media_by_agent.get(&target.agent.id).cloned();
                    let outcome = self
                        .runtime
                        .run_turn(
                            conversation_id,
                            frame_id,
                            &AgentId(target.agent.id.clone()),
                            &target.agent.name,
                            target.agent.voice_reference.as_deref(),
                            &target.model,
                            target.system.clone(),
                            llm.clone(),
                            &target.tools,
                            media,
                            user_id,
                            sink.clone(),
                            cancel.clone(),
                        )
                        .await?;

                    hops.push(HopRecord { from_agent_id: from_agent_id.clone(), to_agent_id: target.agent.id.clone(), reason });
                    from_agent_id = Some(target.agent.id.clone());
                    from_name = Some(target.agent.name.clone());

                    if outcome.state.is_terminal() && outcome.state == convocore_agent::TurnState::Cancelled {
                        return Ok(OrchestrationOutcome { hops, final_message: outcome.final_content });
                    }
                    // control returns to the Administrator for the next hop
                }
            }
        }

        Ok(OrchestrationOutcome { hops, final_message: "max orchestration hops reached".to_string() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use convocore_providers::llm::{ChatRequest, LlmDelta, ToolCall};
    use convocore_storage::types::NewMessage;
    use convocore_tools::{ToolContext, ToolRegistry, ToolResult};
    use rusqlite::Connection;
    use tokio::sync::mpsc;

    fn in_memory_gateway() -> Arc<StorageGateway> {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        convocore_storage::db::init_db(&conn).unwrap();
        Arc::new(StorageGateway::new(conn))
    }

    struct RouteOnceThenUser {
        agent_name: String,
        calls: std::sync::atomic::AtomicU32,
    }

    #[async_trait]
    impl LlmProvider for RouteOnceThenUser {
        fn name(&self) -> &str {
            "stub"
        }
        async fn chat_stream(&self, _req: &ChatRequest, tx: mpsc::Sender<LlmDelta>, _cancel: CancellationToken) -> convocore_providers::Result<()> {
            let n = self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            if n == 0 {
                let _ = tx
                    .send(LlmDelta::ToolCalls(vec![ToolCall { id: "1".into(), name: "route_to_agent".into(), input: serde_json::json!({"agent_name": self.agent_name, "reason": "test"}) }]))
                    .await;
            } else if n == 1 {
                let _ = tx.send(LlmDelta::Content { text: "Hello from Chef.".into() }).await;
            } else {
                let _ = tx
                    .send(LlmDelta::ToolCalls(vec![ToolCall { id: "2".into(), name: "route_to_user".into(), input: serde_json::json!({"final_message": "done"}) }]))
                    .await;
            }
            let _ = tx.send(LlmDelta::Done { stop_reason: "stop".into(), tokens_in: 0, tokens_out: 0 }).await;
            Ok(())
        }
    }

    struct NoopSink;
    #[async_trait]
    impl TurnEventSink for NoopSink {
        async fn emit(&self, _event: ServerEvent) {}
        async fn request_tool_approval(&self, _approval_id: String, _tool_name: String, _tool_args: serde_json::Value, _description: String, _risk_level: convocore_core::types::RiskLevel) {}
    }

    struct RouteToAgentStub;
    #[async_trait]
    impl Tool for RouteToAgentStub {
        fn name(&self) -> &str { "route_to_agent" }
        fn description(&self) -> &str { "route" }
        fn input_schema(&self) -> serde_json::Value { serde_json::json!({}) }
        async fn execute(&self, _input: serde_json::Value, _ctx: &ToolContext) -> ToolResult { ToolResult::success("") }
    }

    struct RouteToUserStub;
    #[async_trait]
    impl Tool for RouteToUserStub {
        fn name(&self) -> &str { "route_to_user" }
        fn description(&self) -> &str { "route" }
        fn input_schema(&self) -> serde_json::Value { serde_json::json!({}) }
        async fn execute(&self, _input: serde_json::Value, _ctx: &ToolContext) -> ToolResult { ToolResult::success("") }
    }

    #[tokio::test]
    async fn routes_to_agent_then_finishes_on_route_to_user() {
        let storage = in_memory_gateway();
        let user = storage.create_user("alice", "hash", "").unwrap();
        let admin = storage.create_agent(&user.id, "Administrator", "route requests", "gpt-test", true).unwrap();
        let chef = storage.create_agent(&user.id, "Chef", "cooking help", "gpt-test", false).unwrap();
        let conversation = storage.create_conversation(&user.id, "chat").unwrap();
        let (frame, _) = storage.open_or_get_current_frame(&conversation.id, 30).unwrap();
        storage
            .append_message(&frame.id, NewMessage { role: convocore_core::types::MessageRole::User, content: "what should I cook?".into(), thinking: None, raw_input: None, raw_output: None, speaker_name: None, agent_id: None })
            .unwrap();

        let registry = Arc::new(ToolRegistry::new());
        let runtime = Arc::new(AgentRuntime::new(storage.clone(), registry));
        let orchestrator = Orchestrator::new(storage.clone(), runtime);

        let llm: Arc<dyn LlmProvider> = Arc::new(RouteOnceThenUser { agent_name: "Chef".into(), calls: std::sync::atomic::AtomicU32::new(0) });

        let mut routable = HashMap::new();
        routable.insert("Chef".to_string(), RoutableAgent { agent: chef.clone(), model: "gpt-test".into(), system: "You are Chef.".into(), tools: vec![] });

        let outcome = orchestrator
            .run_session(
                &conversation.id,
                &frame.id,
                &admin,
                "gpt-test",
                "You are the Administrator.".into(),
                &RouteToAgentStub,
                &RouteToUserStub,
                llm,
                &routable,
                &HashMap::new(),
                &user.id,
                Arc::new(NoopSink),
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.hops.len(), 1);
        assert_eq!(outcome.hops[0].to_agent_id, chef.id);
        assert_eq!(outcome.final_message, "done");
    }
}
