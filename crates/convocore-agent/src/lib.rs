pub mod chunker;
pub mod frame_manager;
pub mod history;
pub mod prompt;
pub mod runtime;

pub use chunker::SentenceChunker;
pub use frame_manager::FrameManager;
pub use runtime::{AgentRuntime, TurnEventSink, TurnOutcome, TurnState};

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use convocore_core::types::{AgentId, RiskLevel};
    use convocore_protocol::events::ServerEvent;
    use convocore_providers::llm::{ChatRequest, LlmDelta, LlmProvider, ToolCall};
    use convocore_providers::Result as ProviderResult;
    use convocore_storage::StorageGateway;
    use convocore_tools::{Tool, ToolContext, ToolRegistry, ToolResult};
    use rusqlite::Connection;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    use super::*;

    fn in_memory_gateway() -> Arc<StorageGateway> {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        convocore_storage::db::init_db(&conn).unwrap();
        Arc::new(StorageGateway::new(conn))
    }

    struct EchoLlm;

    #[async_trait]
    impl LlmProvider for EchoLlm {
        fn name(&self) -> &str {
            "echo"
        }

        async fn chat_stream(
            &self,
            req: &ChatRequest,
            tx: mpsc::Sender<LlmDelta>,
            _cancel: CancellationToken,
        ) -> ProviderResult<()> {
            let last_user = req.messages.last().map(|m| m.content.clone()).unwrap_or_default();
            if last_user.contains("use the tool") && req.tools.iter().any(|t| t.name == "echo_tool") {
                let _ = tx
                    .send(LlmDelta::ToolCalls(vec![ToolCall {
                        id: "call1".into(),
                        name: "echo_tool".into(),
                        input: serde_json::json!({"say": "hi"}),
                    }]))
                    .await;
            } else {
                let _ = tx.send(LlmDelta::Content { text: "Done talking.".into() }).await;
            }
            let _ = tx.send(LlmDelta::Done { stop_reason: "stop".into(), tokens_in: 0, tokens_out: 0 }).await;
            Ok(())
        }
    }

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo_tool"
        }
        fn description(&self) -> &str {
            "echoes its input"
        }
        fn input_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object"})
        }
        fn risk_level(&self) -> RiskLevel {
            RiskLevel::Low
        }
        async fn execute(&self, input: serde_json::Value, _ctx: &ToolContext) -> ToolResult {
            ToolResult::success(input.to_string())
        }
    }

    struct CollectingSink {
        events: Mutex<Vec<ServerEvent>>,
    }

    #[async_trait]
    impl TurnEventSink for CollectingSink {
        async fn emit(&self, event: ServerEvent) {
            self.events.lock().unwrap().push(event);
        }
        async fn request_tool_approval(&self, _approval_id: String, _tool_name: String, _tool_args: serde_json::Value, _description: String, _risk_level: RiskLevel) {}
    }

    #[tokio::test]
    async fn turn_without_tool_calls_streams_content_and_finishes() {
        let storage = in_memory_gateway();
        let user = storage.create_user("alice", "hash", "").unwrap();
        let agent = storage.create_agent(&user.id, "Scout", "helpful", "gpt-test", false).unwrap();
        let conversation = storage.create_conversation(&user.id, "chat").unwrap();
        let (frame, _) = storage.open_or_get_current_frame(&conversation.id, 30).unwrap();
        storage
            .append_message(
                &frame.id,
                convocore_storage::types::NewMessage {
                    role: convocore_core::types::MessageRole::User,
                    content: "hello there".into(),
                    thinking: None,
                    raw_input: None,
                    raw_output: None,
                    speaker_name: None,
                    agent_id: None,
                },
            )
            .unwrap();

        let registry = Arc::new(ToolRegistry::new());
        let runtime = AgentRuntime::new(storage.clone(), registry);
        let sink = Arc::new(CollectingSink { events: Mutex::new(vec![]) });

        let outcome = runtime
            .run_turn(
                &conversation.id,
                &frame.id,
                &AgentId(agent.id.clone()),
                &agent.name,
                None,
                "gpt-test",
                "system prompt".into(),
                Arc::new(EchoLlm),
                &[],
                None,
                &user.id,
                sink.clone(),
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.state, TurnState::Final);
        assert_eq!(outcome.final_content, "Done talking.");
        assert!(outcome.tool_calls_emitted.is_empty());
        // `done` is the caller's responsibility (one per user-visible turn,
        // not one per run_turn call), so the runtime itself must not emit it.
        let events = sink.events.lock().unwrap();
        assert!(!events.iter().any(|e| matches!(e, ServerEvent::Done { .. })));
    }

    #[tokio::test]
    async fn turn_with_tool_call_executes_and_persists_tool_message() {
        let storage = in_memory_gateway();
        let user = storage.create_user("bob", "hash", "").unwrap();
        let agent = storage.create_agent(&user.id, "Scout", "helpful", "gpt-test", false).unwrap();
        let conversation = storage.create_conversation(&user.id, "chat").unwrap();
        let (frame, _) = storage.open_or_get_current_frame(&conversation.id, 30).unwrap();
        storage
            .append_message(
                &frame.id,
                convocore_storage::types::NewMessage {
                    role: convocore_core::types::MessageRole::User,
                    content: "please use the tool".into(),
                    thinking: None,
                    raw_input: None,
                    raw_output: None,
                    speaker_name: None,
                    agent_id: None,
                },
            )
            .unwrap();

        let tools: Vec<Arc<dyn Tool>> = vec![Arc::new(EchoTool)];
        let registry = Arc::new(ToolRegistry::new());
        let runtime = AgentRuntime::new(storage.clone(), registry);
        let sink = Arc::new(CollectingSink { events: Mutex::new(vec![]) });

        let outcome = runtime
            .run_turn(
                &conversation.id,
                &frame.id,
                &AgentId(agent.id.clone()),
                &agent.name,
                None,
                "gpt-test",
                "system prompt".into(),
                Arc::new(EchoLlm),
                &tools,
                None,
                &user.id,
                sink.clone(),
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.tool_calls_emitted, vec!["echo_tool".to_string()]);
        let messages = storage.get_frame_messages(&frame.id).unwrap();
        assert!(messages.iter().any(|m| m.role == convocore_core::types::MessageRole::Tool));
    }

    struct ThinkingLlm;

    #[async_trait]
    impl LlmProvider for ThinkingLlm {
        fn name(&self) -> &str {
            "thinking"
        }
        async fn chat_stream(&self, _req: &ChatRequest, tx: mpsc::Sender<LlmDelta>, _cancel: CancellationToken) -> ProviderResult<()> {
            let _ = tx.send(LlmDelta::Thinking { text: "weighing options".into() }).await;
            let _ = tx.send(LlmDelta::Content { text: "Here you go.".into() }).await;
            let _ = tx.send(LlmDelta::Done { stop_reason: "stop".into(), tokens_in: 0, tokens_out: 0 }).await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn turn_persists_thinking_and_raw_io_on_the_assistant_message() {
        let storage = in_memory_gateway();
        let user = storage.create_user("dana", "hash", "").unwrap();
        let agent = storage.create_agent(&user.id, "Scout", "helpful", "gpt-test", false).unwrap();
        let conversation = storage.create_conversation(&user.id, "chat").unwrap();
        let (frame, _) = storage.open_or_get_current_frame(&conversation.id, 30).unwrap();
        storage
            .append_message(
                &frame.id,
                convocore_storage::types::NewMessage {
                    role: convocore_core::types::MessageRole::User,
                    content: "what should I do?".into(),
                    thinking: None,
                    raw_input: None,
                    raw_output: None,
                    speaker_name: None,
                    agent_id: None,
                },
            )
            .unwrap();

        let registry = Arc::new(ToolRegistry::new());
        let runtime = AgentRuntime::new(storage.clone(), registry);
        let sink = Arc::new(CollectingSink { events: Mutex::new(vec![]) });

        runtime
            .run_turn(
                &conversation.id,
                &frame.id,
                &AgentId(agent.id.clone()),
                &agent.name,
                None,
                "gpt-test",
                "system prompt".into(),
                Arc::new(ThinkingLlm),
                &[],
                None,
                &user.id,
                sink,
                CancellationToken::new(),
            )
            .await
            .unwrap();

        let messages = storage.get_frame_messages(&frame.id).unwrap();
        let assistant = messages.iter().find(|m| m.role == convocore_core::types::MessageRole::Assistant).unwrap();
        assert_eq!(assistant.thinking.as_deref(), Some("weighing options"));
        assert!(assistant.raw_input.is_some());
    }

    struct AlwaysToolCallLlm;

    #[async_trait]
    impl LlmProvider for AlwaysToolCallLlm {
        fn name(&self) -> &str {
            "loops"
        }
        async fn chat_stream(&self, _req: &ChatRequest, tx: mpsc::Sender<LlmDelta>, _cancel: CancellationToken) -> ProviderResult<()> {
            let _ = tx
                .send(LlmDelta::ToolCalls(vec![ToolCall { id: "call".into(), name: "echo_tool".into(), input: serde_json::json!({"say": "hi"}) }]))
                .await;
            let _ = tx.send(LlmDelta::Done { stop_reason: "tool_calls".into(), tokens_in: 0, tokens_out: 0 }).await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn turn_terminates_with_a_final_message_when_the_tool_round_cap_is_hit() {
        let storage = in_memory_gateway();
        let user = storage.create_user("erin", "hash", "").unwrap();
        let agent = storage.create_agent(&user.id, "Scout", "helpful", "gpt-test", false).unwrap();
        let conversation = storage.create_conversation(&user.id, "chat").unwrap();
        let (frame, _) = storage.open_or_get_current_frame(&conversation.id, 30).unwrap();
        storage
            .append_message(
                &frame.id,
                convocore_storage::types::NewMessage {
                    role: convocore_core::types::MessageRole::User,
                    content: "please use the tool".into(),
                    thinking: None,
                    raw_input: None,
                    raw_output: None,
                    speaker_name: None,
                    agent_id: None,
                },
            )
            .unwrap();

        let tools: Vec<Arc<dyn Tool>> = vec![Arc::new(EchoTool)];
        let registry = Arc::new(ToolRegistry::new());
        let runtime = AgentRuntime::new(storage.clone(), registry);
        let sink = Arc::new(CollectingSink { events: Mutex::new(vec![]) });

        let outcome = runtime
            .run_turn(
                &conversation.id,
                &frame.id,
                &AgentId(agent.id.clone()),
                &agent.name,
                None,
                "gpt-test",
                "system prompt".into(),
                Arc::new(AlwaysToolCallLlm),
                &tools,
                None,
                &user.id,
                sink,
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.state, TurnState::Final);
        assert_eq!(outcome.final_content, "max tool rounds reached");
    }
}
