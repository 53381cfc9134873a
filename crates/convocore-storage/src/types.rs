use convocore_core::types::{McpTransport, MessageRole};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub password_hash: String,
    pub system_prompt: String,
    pub preferred_name: Option<String>,
    pub default_model_url: Option<String>,
    pub summary_model: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub system_prompt: String,
    pub model_name: String,
    pub voice_reference: Option<String>,
    pub avatar: Option<String>,
    pub excluded_tools: Vec<String>,
    pub think_mode: bool,
    pub memory: Option<String>,
    pub trigger_word: Option<String>,
    pub is_administrator: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl Agent {
    pub fn description_line(&self) -> String {
        let first_line = self.system_prompt.lines().next().unwrap_or("").trim();
        format!("{}: {}", self.name, first_line)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    pub id: String,
    pub conversation_id: String,
    pub summary: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub frame_id: String,
    pub agent_id: Option<String>,
    pub role: MessageRole,
    pub content: String,
    pub thinking: Option<String>,
    pub raw_input: Option<String>,
    pub raw_output: Option<String>,
    pub speaker_name: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMessage {
    pub role: MessageRole,
    pub content: String,
    pub thinking: Option<String>,
    pub raw_input: Option<String>,
    pub raw_output: Option<String>,
    pub speaker_name: Option<String>,
    pub agent_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Skill {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub instructions: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpServer {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub transport: McpTransport,
    pub url: Option<String>,
    pub command: Option<String>,
    pub args: Vec<String>,
    pub env: std::collections::HashMap<String, String>,
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaceIdentity {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FacePhoto {
    pub id: String,
    pub identity_id: String,
    pub embedding: Vec<f32>,
    pub photo_blob_uuid: String,
    pub created_at: String,
}

/// A single regex match from `search_messages`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageSearchHit {
    pub message_id: String,
    pub frame_id: String,
    pub snippet: String,
    pub created_at: String,
}

/// Summary stats for `get_conversation_info`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationInfo {
    pub message_count: u64,
    pub first_message_at: Option<String>,
    pub last_message_at: Option<String>,
}
