use std::collections::HashMap;
use std::sync::Arc;

use convocore_agent::TurnOutcome;
use convocore_core::error::CoreError;
use convocore_core::types::{AgentId, MessageRole};
use convocore_orchestrator::RoutableAgent;
use convocore_protocol::events::{ClientEvent, ServerEvent};
use convocore_providers::llm::HttpLlmProvider;
use convocore_storage::types::{Agent, Conversation, NewMessage, User};
use tracing::warn;

use crate::app::AppState;
use crate::session::ActiveSession;
use crate::sinks::GatewaySink;

/// Event sink for turns with no WS session behind them (the OpenAI-compatible
/// HTTP endpoint) — discards streaming deltas and auto-denies tool
/// approval requests, since there is no channel to ask the caller over.
struct NullSink;

#[async_trait::async_trait]
impl convocore_agent::TurnEventSink for NullSink {
    async fn emit(&self, _event: ServerEvent) {}
    async fn request_tool_approval(&self, _approval_id: String, _tool_name: String, _tool_args: serde_json::Value, _description: String, _risk_level: convocore_core::types::RiskLevel) {}
}

/// Run one non-streaming turn for the OpenAI-compatible completions endpoint:
/// same conversation/frame/persistence machinery as the WS path, routed
/// by agent name instead of agent id, with no session to stream deltas to.
pub async fn run_completion(state: &Arc<AppState>, user_id: &str, model: &str, text: &str) -> Result<String, CoreError> {
    let user = state.storage.get_user(user_id)?;
    let title: String = text.chars().take(60).collect();
    let conversation = state.storage.create_conversation(user_id, &title)?;
    let all_agents = state.storage.list_agents(user_id)?;
    let llm = resolve_llm(state, None, &user);
    let frame_id = state.frame_manager.open_or_roll_over(&conversation.id, user.summary_model.clone(), llm.clone())?;

    state.storage.append_message(
        &frame_id,
        NewMessage { role: MessageRole::User, content: text.to_string(), thinking: None, raw_input: None, raw_output: None, speaker_name: None, agent_id: None },
    )?;

    let sink: Arc<dyn convocore_agent::TurnEventSink> = Arc::new(NullSink);
    let media = state.media.get_or_create(user_id, Arc::new(NullMediaSink) as Arc<dyn convocore_media::StreamSink>).await;
    let media_handle: Arc<dyn convocore_tools::MediaHandle> = media;
    let cancel = tokio_util::sync::CancellationToken::new();

    let content = match state.storage.get_agent_by_name(user_id, model) {
        Ok(agent) => {
            run_direct_turn(state, &conversation, &frame_id, &agent.id, &all_agents, &user, llm, media_handle, user_id, sink, cancel)
                .await
                .map(|outcome| outcome.final_content)
                .map_err(|e| CoreError::Internal(e.to_string()))?
        }
        Err(_) => run_orchestrated_turn(state, &conversation, &frame_id, &all_agents, &user, llm, media_handle, user_id, sink, cancel)
            .await
            .map(|outcome| outcome.final_message)
            .map_err(|e| CoreError::Internal(e.to_string()))?,
    };

    Ok(content)
}

/// Discards media stream events for turns with no session — a
/// headless completion that calls `play_music` gets a track resolved and
/// silently dropped chunks rather than a panic.
struct NullMediaSink;

#[async_trait::async_trait]
impl convocore_media::StreamSink for NullMediaSink {
    async fn emit_chunk(&self, _data: String, _chunk_index: u64, _is_last: bool) {}
    async fn emit_state(&self, _state: convocore_protocol::media::MediaStatePayload) {}
    async fn emit_error(&self, _error: String) {}
}

/// Resolve the LLM this turn talks to: the agent-level override if present,
/// then the user's own default, then the deployment default.
fn resolve_llm(state: &AppState, model_override: Option<&str>, user: &User) -> Arc<dyn convocore_providers::llm::LlmProvider> {
    let base_url = model_override
        .map(str::to_string)
        .or_else(|| user.default_model_url.clone())
        .or_else(|| state.config.providers.default_llm_url.clone())
        .unwrap_or_else(|| "http://127.0.0.1:11434/v1".to_string());
    Arc::new(HttpLlmProvider::new(base_url))
}

/// A user message may carry images; blob storage for them is out of scope
/// here (it lives behind a separate UUID-keyed store), so they are inlined
/// as data URIs directly in the persisted content the way a deployment
/// without that store would have to.
fn content_with_images(text: &str, images: &[String]) -> String {
    if images.is_empty() {
        return text.to_string();
    }
    let mut content = text.to_string();
    for image in images {
        content.push_str(&format!("\n![image](data:image/jpeg;base64,{image})"));
    }
    content
}

fn build_system_and_tools(
    state: &AppState,
    agent: &Agent,
    user: &User,
    other_agents: &[Agent],
) -> anyhow::Result<(String, Vec<Arc<dyn convocore_tools::Tool>>)> {
    let enabled_skills = state.storage.list_skills(&user.id)?;
    let system = convocore_agent::prompt::assemble_system_messages(agent, user, &enabled_skills, other_agents).join("\n\n");
    let tools = state.tools.tool_set(&agent.excluded_tools, &[]);
    Ok((system, tools))
}

/// Entry point for `ClientEvent::ChatRequest`, dispatched from `dispatch.rs`.
/// Resolves or creates the conversation and frame, persists the user's turn,
/// then runs either a direct single-agent turn (an `agent_id` was given) or
/// hands off to the Administrator-routed orchestrator.
pub async fn handle_chat_request(state: Arc<AppState>, session: Arc<ActiveSession>, user_id: String, event: ClientEvent) {
    let ClientEvent::ChatRequest { text, model_name, conversation_id, agent_id, images } = event else {
        return;
    };

    if let Err(err) = run_chat_request(&state, &session, &user_id, text, model_name, conversation_id, agent_id, images).await {
        warn!(user_id, error = %err, "chat request failed");
        session.emit(ServerEvent::error(err.to_string(), err.code()));
        session.chat_active.store(false, std::sync::atomic::Ordering::SeqCst);
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_chat_request(
    state: &Arc<AppState>,
    session: &Arc<ActiveSession>,
    user_id: &str,
    text: String,
    model_name: Option<String>,
    conversation_id: Option<String>,
    agent_id: Option<String>,
    images: Vec<String>,
) -> Result<(), CoreError> {
    let user = state.storage.get_user(user_id)?;

    let conversation: Conversation = match conversation_id {
        Some(id) => state.storage.get_conversation(&id)?,
        None => {
            let title: String = text.chars().take(60).collect();
            state.storage.create_conversation(user_id, &title)?
        }
    };
    *session.conversation_id.lock().unwrap() = Some(conversation.id.clone());

    let all_agents = state.storage.list_agents(user_id)?;

    let llm = resolve_llm(state, model_name.as_deref(), &user);

    let frame_id = state
        .frame_manager
        .open_or_roll_over(&conversation.id, user.summary_model.clone(), llm.clone())?;

    state.storage.append_message(
        &frame_id,
        NewMessage {
            role: MessageRole::User,
            content: content_with_images(&text, &images),
            thinking: None,
            raw_input: None,
            raw_output: None,
            speaker_name: None,
            agent_id: None,
        },
    )?;

    session.chat_active.store(true, std::sync::atomic::Ordering::SeqCst);
    let turn_cancel = session.start_new_turn();
    let sink: Arc<dyn convocore_agent::TurnEventSink> = Arc::new(GatewaySink::new(session.clone()));
    let media = state.media.get_or_create(user_id, Arc::new(GatewaySink::new(session.clone())) as Arc<dyn convocore_media::StreamSink>).await;
    let media_handle: Arc<dyn convocore_tools::MediaHandle> = media;

    let is_direct = agent_id.is_some();
    let outcome_result = if let Some(agent_id) = agent_id {
        run_direct_turn(state, &conversation, &frame_id, &agent_id, &all_agents, &user, llm, media_handle, user_id, sink.clone(), turn_cancel)
            .await
            .map(|outcome| outcome.final_content)
    } else {
        run_orchestrated_turn(state, &conversation, &frame_id, &all_agents, &user, llm, media_handle, user_id, sink.clone(), turn_cancel)
            .await
            .map(|outcome| outcome.final_message)
    };

    session.chat_active.store(false, std::sync::atomic::Ordering::SeqCst);

    match outcome_result {
        Ok(final_message) => {
            // The Administrator's route_to_user message is never streamed by
            // run_turn itself (that only runs for the agents it routes to) —
            // surface and persist it here before the turn is done.
            if !is_direct && !final_message.is_empty() {
                let administrator = state.storage.get_administrator(user_id)?;
                sink.emit(ServerEvent::StreamChunk {
                    content: Some(final_message.clone()),
                    thinking: None,
                    role: "assistant".to_string(),
                    agent_id: Some(administrator.id.clone()),
                    name: administrator.name.clone(),
                    voice_reference: administrator.voice_reference.clone(),
                    conversation_id: conversation.id.clone(),
                    frame_id: frame_id.clone(),
                }).await;
                state.storage.upsert_streaming_message(
                    &frame_id,
                    MessageRole::Assistant,
                    Some(&administrator.id),
                    &final_message,
                    None,
                    None,
                    None,
                )?;
            }
            session.emit(ServerEvent::Done { conversation_id: conversation.id, frame_id });
            Ok(())
        }
        Err(err) => Err(CoreError::Internal(err.to_string())),
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_direct_turn(
    state: &Arc<AppState>,
    conversation: &Conversation,
    frame_id: &str,
    agent_id: &str,
    all_agents: &[Agent],
    user: &User,
    llm: Arc<dyn convocore_providers::llm::LlmProvider>,
    media: Arc<dyn convocore_tools::MediaHandle>,
    user_id: &str,
    sink: Arc<dyn convocore_agent::TurnEventSink>,
    cancel: tokio_util::sync::CancellationToken,
) -> anyhow::Result<TurnOutcome> {
    let agent = state.storage.get_agent(agent_id)?;
    let other_agents: Vec<Agent> = all_agents.iter().filter(|a| a.id != agent.id).cloned().collect();
    let (system, tools) = build_system_and_tools(state, &agent, user, &other_agents)?;

    state
        .agent_runtime
        .run_turn(
            &conversation.id,
            frame_id,
            &AgentId(agent.id.clone()),
            &agent.name,
            agent.voice_reference.as_deref(),
            &agent.model_name,
            system,
            llm,
            &tools,
            Some(media),
            user_id,
            sink,
            cancel,
        )
        .await
}

#[allow(clippy::too_many_arguments)]
async fn run_orchestrated_turn(
    state: &Arc<AppState>,
    conversation: &Conversation,
    frame_id: &str,
    all_agents: &[Agent],
    user: &User,
    llm: Arc<dyn convocore_providers::llm::LlmProvider>,
    media: Arc<dyn convocore_tools::MediaHandle>,
    user_id: &str,
    sink: Arc<dyn convocore_agent::TurnEventSink>,
    cancel: tokio_util::sync::CancellationToken,
) -> anyhow::Result<convocore_orchestrator::OrchestrationOutcome> {
    let administrator = state.storage.get_administrator(user_id)?;
    let route_to_agent = convocore_tools::optin::RouteToAgent;
    let route_to_user = convocore_tools::optin::RouteToUser;

    let routable_agents: Vec<&Agent> = all_agents.iter().filter(|a| a.id != administrator.id).collect();
    let mut routable = HashMap::new();
    let mut media_by_agent = HashMap::new();
    for agent in &routable_agents {
        let other_agents: Vec<Agent> = all_agents.iter().filter(|a| a.id != (*agent).id).cloned().collect();
        let (system, tools) = build_system_and_tools(state, agent, user, &other_agents)?;
        routable.insert(agent.name.clone(), RoutableAgent { agent: (*agent).clone(), model: agent.model_name.clone(), system, tools });
        media_by_agent.insert(agent.id.clone(), media.clone());
    }

    let (admin_system, _) = build_system_and_tools(state, &administrator, user, &all_agents.iter().filter(|a| a.id != administrator.id).cloned().collect::<Vec<_>>())?;

    state
        .orchestrator
        .run_session(
            &conversation.id,
            frame_id,
            &administrator,
            &administrator.model_name,
            admin_system,
            &route_to_agent,
            &route_to_user,
            llm,
            &routable,
            &media_by_agent,
            user_id,
            sink,
            cancel,
        )
        .await
}
