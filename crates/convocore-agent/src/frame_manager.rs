use std::sync::Arc;

use convocore_core::config::AGENT_MEMORY_MAX_CHARS;
use convocore_providers::llm::{ChatMessage, ChatRequest, LlmDelta, LlmProvider};
use convocore_storage::StorageGateway;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Opens or reuses the conversation's current frame and, on rollover,
/// schedules the outgoing frame's summarization and memory-consolidation
/// jobs as detached tasks rather than a persisted job queue.
pub struct FrameManager {
    storage: Arc<StorageGateway>,
    idle_threshold_minutes: i64,
}

impl FrameManager {
    pub fn new(storage: Arc<StorageGateway>, idle_threshold_minutes: i64) -> Self {
        Self { storage, idle_threshold_minutes }
    }

    /// Returns the frame id to use for the incoming message, spawning
    /// summarize/consolidate jobs for the frame being closed, if any.
    pub fn open_or_roll_over(
        &self,
        conversation_id: &str,
        summary_model: Option<String>,
        llm: Arc<dyn LlmProvider>,
    ) -> convocore_storage::Result<String> {
        let (frame, rolled_over) = self
            .storage
            .open_or_get_current_frame(conversation_id, self.idle_threshold_minutes)?;

        if rolled_over {
            if let Some(previous) = self.storage.list_frames(conversation_id)?.iter().rev().nth(1).cloned() {
                self.spawn_close_jobs(previous.id, summary_model, llm)?;
            }
        }

        Ok(frame.id)
    }

    /// Consolidation runs only for agents that actually produced a message in
    /// the closing frame — an agent that never spoke had nothing in this
    /// session worth folding into its memory.
    fn spawn_close_jobs(
        &self,
        closing_frame_id: String,
        summary_model: Option<String>,
        llm: Arc<dyn LlmProvider>,
    ) -> convocore_storage::Result<()> {
        let participating_agent_ids: std::collections::HashSet<String> = self
            .storage
            .get_frame_messages(&closing_frame_id)?
            .into_iter()
            .filter_map(|m| m.agent_id)
            .collect();

        let Some(model) = summary_model else {
            info!(frame_id = %closing_frame_id, "no summary_model configured, skipping frame-close jobs");
            return Ok(());
        };

        let storage = self.storage.clone();
        let frame_id = closing_frame_id.clone();
        let llm_for_summary = llm.clone();
        let model_for_summary = model.clone();
        tokio::spawn(async move {
            if let Err(e) = summarize_frame(&storage, &frame_id, &model_for_summary, llm_for_summary).await {
                warn!(frame_id = %frame_id, error = %e, "frame summarization failed");
            }
        });

        for agent_id in participating_agent_ids {
            let storage = self.storage.clone();
            let frame_id = closing_frame_id.clone();
            let llm = llm.clone();
            let model = model.clone();
            tokio::spawn(async move {
                if let Err(e) = consolidate_agent_memory(&storage, &frame_id, &agent_id, &model, llm).await {
                    warn!(frame_id = %frame_id, agent_id = %agent_id, error = %e, "memory consolidation failed");
                }
            });
        }
        Ok(())
    }
}

async fn run_summary_prompt(
    llm: Arc<dyn LlmProvider>,
    model: &str,
    system_instruction: &str,
    content: &str,
) -> convocore_providers::Result<String> {
    let req = ChatRequest {
        model: model.to_string(),
        system: system_instruction.to_string(),
        messages: vec![ChatMessage { role: convocore_core::types::MessageRole::User, content: content.to_string() }],
        tools: vec![],
        think: false,
        max_tokens: 1024,
    };
    let (tx, mut rx) = mpsc::channel(32);
    let cancel = CancellationToken::new();
    llm.chat_stream(&req, tx, cancel).await?;

    let mut out = String::new();
    while let Some(delta) = rx.recv().await {
        if let LlmDelta::Content { text } = delta {
            out.push_str(&text);
        }
    }
    Ok(out)
}

async fn summarize_frame(
    storage: &StorageGateway,
    frame_id: &str,
    model: &str,
    llm: Arc<dyn LlmProvider>,
) -> anyhow::Result<()> {
    let messages = storage.get_frame_messages(frame_id)?;
    if messages.is_empty() {
        return Ok(());
    }
    let transcript = messages
        .iter()
        .map(|m| format!("{}: {}", m.role, m.content))
        .collect::<Vec<_>>()
        .join("\n");

    let summary = run_summary_prompt(llm, model, "Summarize this conversation frame in a few sentences.", &transcript).await?;
    storage.set_frame_summary(frame_id, summary.trim())?;
    Ok(())
}

async fn consolidate_agent_memory(
    storage: &StorageGateway,
    frame_id: &str,
    agent_id: &str,
    model: &str,
    llm: Arc<dyn LlmProvider>,
) -> anyhow::Result<()> {
    let agent = storage.get_agent(agent_id)?;
    let messages = storage.get_frame_messages(frame_id)?;
    if messages.is_empty() {
        return Ok(());
    }
    let transcript = messages
        .iter()
        .map(|m| format!("{}: {}", m.role, m.content))
        .collect::<Vec<_>>()
        .join("\n");

    let instruction = format!(
        "You are {}. Your current memory is:\n{}\n\nUpdate your memory given this new session, in at most {} characters.",
        agent.name,
        agent.memory.as_deref().unwrap_or("(none yet)"),
        AGENT_MEMORY_MAX_CHARS,
    );
    let mut updated = run_summary_prompt(llm, model, &instruction, &transcript).await?;
    if updated.len() > AGENT_MEMORY_MAX_CHARS {
        let boundary = updated
            .char_indices()
            .map(|(i, _)| i)
            .take_while(|&i| i <= AGENT_MEMORY_MAX_CHARS)
            .last()
            .unwrap_or(0);
        updated.truncate(boundary);
    }
    storage.update_agent_memory(agent_id, updated.trim())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use convocore_providers::Result as ProviderResult;
    use rusqlite::Connection;

    fn in_memory_gateway() -> Arc<StorageGateway> {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        convocore_storage::db::init_db(&conn).unwrap();
        Arc::new(StorageGateway::new(conn))
    }

    /// Returns a reply one multibyte character ('é', 2 bytes) longer than
    /// `AGENT_MEMORY_MAX_CHARS` bytes, landing the byte-length cutoff mid-char.
    struct OverlongMultibyteLlm;

    #[async_trait]
    impl LlmProvider for OverlongMultibyteLlm {
        fn name(&self) -> &str {
            "overlong"
        }
        async fn chat_stream(&self, _req: &ChatRequest, tx: mpsc::Sender<LlmDelta>, _cancel: CancellationToken) -> ProviderResult<()> {
            let mut reply = "é".repeat(AGENT_MEMORY_MAX_CHARS / 2 + 1);
            reply.push('x');
            let _ = tx.send(LlmDelta::Content { text: reply }).await;
            let _ = tx.send(LlmDelta::Done { stop_reason: "stop".into(), tokens_in: 0, tokens_out: 0 }).await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn consolidation_truncates_multibyte_memory_without_panicking() {
        let storage = in_memory_gateway();
        let user = storage.create_user("mia", "hash", "").unwrap();
        let agent = storage.create_agent(&user.id, "Scout", "helpful", "gpt-test", false).unwrap();
        let conversation = storage.create_conversation(&user.id, "chat").unwrap();
        let (frame, _) = storage.open_or_get_current_frame(&conversation.id, 30).unwrap();
        storage
            .append_message(
                &frame.id,
                convocore_storage::types::NewMessage {
                    role: convocore_core::types::MessageRole::User,
                    content: "hi".into(),
                    thinking: None,
                    raw_input: None,
                    raw_output: None,
                    speaker_name: None,
                    agent_id: None,
                },
            )
            .unwrap();

        consolidate_agent_memory(&storage, &frame.id, &agent.id, "gpt-test", Arc::new(OverlongMultibyteLlm))
            .await
            .unwrap();

        let updated = storage.get_agent(&agent.id).unwrap();
        let memory = updated.memory.unwrap();
        assert!(memory.len() <= AGENT_MEMORY_MAX_CHARS);
        assert!(memory.is_char_boundary(memory.len()));
    }

    struct EchoLlm;

    #[async_trait]
    impl LlmProvider for EchoLlm {
        fn name(&self) -> &str {
            "echo"
        }
        async fn chat_stream(&self, _req: &ChatRequest, tx: mpsc::Sender<LlmDelta>, _cancel: CancellationToken) -> ProviderResult<()> {
            let _ = tx.send(LlmDelta::Content { text: "updated memory".into() }).await;
            let _ = tx.send(LlmDelta::Done { stop_reason: "stop".into(), tokens_in: 0, tokens_out: 0 }).await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn rollover_only_consolidates_agents_that_spoke_in_the_closing_frame() {
        let storage = in_memory_gateway();
        let user = storage.create_user("noah", "hash", "").unwrap();
        let speaker = storage.create_agent(&user.id, "Scout", "helpful", "gpt-test", false).unwrap();
        let silent = storage.create_agent(&user.id, "Bystander", "idle", "gpt-test", false).unwrap();
        let conversation = storage.create_conversation(&user.id, "chat").unwrap();

        let (frame1, _) = storage.open_or_get_current_frame(&conversation.id, 30).unwrap();
        storage
            .append_message(
                &frame1.id,
                convocore_storage::types::NewMessage {
                    role: convocore_core::types::MessageRole::Assistant,
                    content: "hello".into(),
                    thinking: None,
                    raw_input: None,
                    raw_output: None,
                    speaker_name: None,
                    agent_id: Some(speaker.id.clone()),
                },
            )
            .unwrap();

        let manager = FrameManager::new(storage.clone(), 0);
        manager
            .open_or_roll_over(&conversation.id, Some("gpt-test".to_string()), Arc::new(EchoLlm))
            .unwrap();

        // Close jobs run as detached tasks; give them a turn to complete.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        assert_eq!(storage.get_agent(&speaker.id).unwrap().memory.as_deref(), Some("updated memory"));
        assert_eq!(storage.get_agent(&silent.id).unwrap().memory, None);
    }
}
