use std::sync::Arc;

use async_trait::async_trait;
use convocore_core::config::MAX_TOOL_ROUNDS;
use convocore_core::types::{AgentId, MessageRole};
use convocore_protocol::events::ServerEvent;
use convocore_providers::llm::{ChatRequest, LlmDelta, LlmProvider, ToolDefinition};
use convocore_storage::types::NewMessage;
use convocore_storage::StorageGateway;
use convocore_tools::{ApprovalDecision, Tool, ToolContext, ToolRegistry};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{instrument, warn};

use crate::chunker::SentenceChunker;

/// Sink every turn event is sent through — implemented by the session
/// gateway to forward onto the client's channel.
#[async_trait]
pub trait TurnEventSink: Send + Sync {
    async fn emit(&self, event: ServerEvent);
    async fn request_tool_approval(&self, approval_id: String, tool_name: String, tool_args: serde_json::Value, description: String, risk_level: convocore_core::types::RiskLevel);
}

/// Per-turn state machine, exposed for callers that want to
/// observe transitions (e.g. the orchestrator deciding whether a hop ended).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Idle,
    Preparing,
    Streaming,
    ToolPending,
    Final,
    Cancelled,
}

pub struct TurnOutcome {
    pub state: TurnState,
    pub final_content: String,
    pub tool_calls_emitted: Vec<String>,
}

pub struct AgentRuntime {
    storage: Arc<StorageGateway>,
    registry: Arc<ToolRegistry>,
}

impl AgentRuntime {
    pub fn new(storage: Arc<StorageGateway>, registry: Arc<ToolRegistry>) -> Self {
        Self { storage, registry }
    }

    /// Run one agent turn to completion. `system` is the already joined
    /// six-part system message; `history` is the frame's messages so far
    /// (excluding the just-appended user turn, which the caller already
    /// persisted).
    #[instrument(skip(self, llm, tools, sink, cancel, system))]
    #[allow(clippy::too_many_arguments)]
    pub async fn run_turn(
        &self,
        conversation_id: &str,
        frame_id: &str,
        agent_id: &AgentId,
        agent_name: &str,
        voice_reference: Option<&str>,
        model: &str,
        system: String,
        llm: Arc<dyn LlmProvider>,
        tools: &[Arc<dyn Tool>],
        media: Option<Arc<dyn convocore_tools::MediaHandle>>,
        user_id: &str,
        sink: Arc<dyn TurnEventSink>,
        cancel: CancellationToken,
    ) -> anyhow::Result<TurnOutcome> {
        let mut state = TurnState::Preparing;
        let tool_defs: Vec<ToolDefinition> = tools
            .iter()
            .map(|t| ToolDefinition { name: t.name().to_string(), description: t.description().to_string(), input_schema: t.input_schema() })
            .collect();

        let ctx = ToolContext {
            conversation_id: conversation_id.to_string(),
            frame_id: frame_id.to_string(),
            user_id: user_id.to_string(),
            storage: self.storage.clone(),
            media,
        };

        let mut tool_calls_emitted = Vec::new();
        let mut final_content = String::new();

        for round in 0..MAX_TOOL_ROUNDS {
            let history = self.storage.get_frame_messages(frame_id)?;
            let chat_messages = crate::history::assemble_history(&history, None);

            let req = ChatRequest {
                model: model.to_string(),
                system: system.clone(),
                messages: chat_messages,
                tools: tool_defs.clone(),
                think: false,
                max_tokens: 4096,
            };

            let (tx, mut rx) = mpsc::channel(64);
            let llm_clone = llm.clone();
            let cancel_clone = cancel.clone();
            let req_clone = req.clone();
            let send_task = tokio::spawn(async move { llm_clone.chat_stream(&req_clone, tx, cancel_clone).await });

            state = TurnState::Streaming;
            let mut chunker = SentenceChunker::new();
            let mut thinking_buf = String::new();
            let mut content_buf = String::new();
            let mut tool_calls = Vec::new();
            let mut cancelled = false;

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        cancelled = true;
                        break;
                    }
                    delta = rx.recv() => {
                        let Some(delta) = delta else { break };
                        match delta {
                            LlmDelta::Content { text } => {
                                content_buf.push_str(&text);
                                for sentence in chunker.push(&text) {
                                    sink.emit(ServerEvent::StreamChunk {
                                        content: Some(sentence.clone()),
                                        thinking: None,
                                        role: "assistant".to_string(),
                                        agent_id: Some(agent_id.to_string()),
                                        name: agent_name.to_string(),
                                        voice_reference: voice_reference.map(str::to_string),
                                        conversation_id: conversation_id.to_string(),
                                        frame_id: frame_id.to_string(),
                                    }).await;
                                }
                            }
                            LlmDelta::Thinking { text } => {
                                thinking_buf.push_str(&text);
                                sink.emit(ServerEvent::StreamChunk {
                                    content: None,
                                    thinking: Some(text),
                                    role: "assistant".to_string(),
                                    agent_id: Some(agent_id.to_string()),
                                    name: agent_name.to_string(),
                                    voice_reference: None,
                                    conversation_id: conversation_id.to_string(),
                                    frame_id: frame_id.to_string(),
                                }).await;
                            }
                            LlmDelta::ToolCalls(calls) => {
                                tool_calls = calls;
                            }
                            LlmDelta::Done { .. } => {}
                        }
                    }
                }
            }

            if let Some(trailing) = chunker.finish() {
                sink.emit(ServerEvent::StreamChunk {
                    content: Some(trailing),
                    thinking: None,
                    role: "assistant".to_string(),
                    agent_id: Some(agent_id.to_string()),
                    name: agent_name.to_string(),
                    voice_reference: voice_reference.map(str::to_string),
                    conversation_id: conversation_id.to_string(),
                    frame_id: frame_id.to_string(),
                }).await;
            }

            let _ = send_task.await;

            // Every complete role boundary is durable before the next event:
            // content, thinking, and the raw request/response (tool_calls
            // included) that produced them all land on the same row.
            let raw_input = serde_json::to_string(&req).ok();
            let raw_output = if tool_calls.is_empty() { None } else { serde_json::to_string(&tool_calls).ok() };
            if !content_buf.is_empty() || !thinking_buf.is_empty() || !tool_calls.is_empty() {
                self.storage.upsert_streaming_message(
                    frame_id,
                    MessageRole::Assistant,
                    Some(&agent_id.to_string()),
                    &content_buf,
                    if thinking_buf.is_empty() { None } else { Some(thinking_buf.as_str()) },
                    raw_input.as_deref(),
                    raw_output.as_deref(),
                )?;
            }

            if cancelled {
                state = TurnState::Cancelled;
                final_content = content_buf;
                return Ok(TurnOutcome { state, final_content, tool_calls_emitted });
            }

            if tool_calls.is_empty() {
                state = TurnState::Final;
                final_content = content_buf;
                return Ok(TurnOutcome { state, final_content, tool_calls_emitted });
            }

            state = TurnState::ToolPending;
            for call in &tool_calls {
                tool_calls_emitted.push(call.name.clone());
                let Some(tool) = tools.iter().find(|t| t.name() == call.name) else {
                    self.storage.append_message(
                        frame_id,
                        NewMessage {
                            role: MessageRole::Tool,
                            content: format!("{{\"error\":\"unknown tool: {}\"}}", call.name),
                            thinking: None,
                            raw_input: None,
                            raw_output: None,
                            speaker_name: None,
                            agent_id: Some(agent_id.to_string()),
                        },
                    )?;
                    continue;
                };

                let sink_for_approval = sink.clone();
                let tool_name = call.name.clone();
                let result = self
                    .registry
                    .execute(tool, call.input.clone(), &ctx, move |approval_id, args| {
                        let sink = sink_for_approval.clone();
                        let tool_name = tool_name.clone();
                        let description = format!("Approve {tool_name}?");
                        async move {
                            sink.request_tool_approval(
                                approval_id,
                                tool_name,
                                args,
                                description,
                                convocore_core::types::RiskLevel::High,
                            ).await;
                        }
                    })
                    .await;

                self.storage.append_message(
                    frame_id,
                    NewMessage {
                        role: MessageRole::Tool,
                        content: result.content,
                        thinking: None,
                        raw_input: None,
                        raw_output: None,
                        speaker_name: None,
                        agent_id: Some(agent_id.to_string()),
                    },
                )?;
            }

            if round == MAX_TOOL_ROUNDS - 1 {
                warn!(conversation_id, "max tool rounds reached, synthesizing route_to_user");
                let message = "max tool rounds reached".to_string();
                sink.emit(ServerEvent::StreamChunk {
                    content: Some(message.clone()),
                    thinking: None,
                    role: "assistant".to_string(),
                    agent_id: Some(agent_id.to_string()),
                    name: agent_name.to_string(),
                    voice_reference: voice_reference.map(str::to_string),
                    conversation_id: conversation_id.to_string(),
                    frame_id: frame_id.to_string(),
                }).await;
                self.storage.upsert_streaming_message(
                    frame_id,
                    MessageRole::Assistant,
                    Some(&agent_id.to_string()),
                    &message,
                    None,
                    None,
                    None,
                )?;
                state = TurnState::Final;
                final_content = message;
                return Ok(TurnOutcome { state, final_content, tool_calls_emitted });
            }
        }

        state = TurnState::Final;
        Ok(TurnOutcome { state, final_content, tool_calls_emitted })
    }

    /// Record a `tool_approval_response` arriving from the client.
    pub fn resolve_approval(&self, approval_id: &str, approved: bool, modified_args: Option<serde_json::Value>) -> bool {
        let decision = if approved { ApprovalDecision::Approved { modified_args } } else { ApprovalDecision::Denied };
        self.registry.resolve_approval(approval_id, decision)
    }
}

impl TurnState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TurnState::Final | TurnState::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states_are_final_or_cancelled() {
        assert!(TurnState::Final.is_terminal());
        assert!(TurnState::Cancelled.is_terminal());
        assert!(!TurnState::Streaming.is_terminal());
    }
}
