use convocore_core::types::MessageRole;
use convocore_providers::llm::ChatMessage;
use convocore_storage::types::Message;

/// All messages of the current frame, chronological, with system/
/// administrator turns filtered out. Image references on user messages are
/// left as their stored markdown-link form; the caller attaches bytes by
/// reference, never inline, matching the blob-store model used elsewhere.
pub fn assemble_history(messages: &[Message], administrator_agent_id: Option<&str>) -> Vec<ChatMessage> {
    messages
        .iter()
        .filter(|m| !is_administrator_turn(m, administrator_agent_id))
        .map(|m| ChatMessage { role: m.role, content: m.content.clone() })
        .collect()
}

fn is_administrator_turn(message: &Message, administrator_agent_id: Option<&str>) -> bool {
    match (message.agent_id.as_deref(), administrator_agent_id) {
        (Some(agent_id), Some(admin_id)) => agent_id == admin_id,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(role: MessageRole, agent_id: Option<&str>, content: &str) -> Message {
        Message {
            id: "m".into(),
            frame_id: "f".into(),
            agent_id: agent_id.map(str::to_string),
            role,
            content: content.into(),
            thinking: None,
            raw_input: None,
            raw_output: None,
            speaker_name: None,
            created_at: "".into(),
        }
    }

    #[test]
    fn filters_out_administrator_turns() {
        let messages = vec![
            message(MessageRole::User, None, "hi"),
            message(MessageRole::Assistant, Some("admin-1"), "routing..."),
            message(MessageRole::Assistant, Some("scout-1"), "hello!"),
        ];
        let history = assemble_history(&messages, Some("admin-1"));
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].content, "hello!");
    }

    #[test]
    fn keeps_everything_when_no_administrator_configured() {
        let messages = vec![message(MessageRole::User, None, "hi")];
        let history = assemble_history(&messages, None);
        assert_eq!(history.len(), 1);
    }
}
