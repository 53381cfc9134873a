use serde::{Deserialize, Serialize};

/// First event sent by the server on every new connection, before
/// authentication. Carries a random nonce a signed-token deployment can bind
/// into its token to resist replay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectChallenge {
    pub nonce: String,
}

/// The only event a pre-auth connection accepts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectParams {
    pub token: String,
}

/// Snapshot sent immediately after successful auth, and again after
/// every reconnect before the buffered outbound queue is flushed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectedSnapshot {
    pub chat_active: bool,
    pub conversation_id: Option<String>,
    pub media_state: crate::media::MediaStateValue,
    pub vision_enabled: bool,
}
