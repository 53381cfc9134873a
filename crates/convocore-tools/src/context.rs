use std::sync::Arc;

use async_trait::async_trait;
use convocore_storage::StorageGateway;

/// Minimal surface a per-user media player exposes to the music tools, defined
/// here rather than depending on `convocore-media` directly — the registry
/// knows only the shape it needs to inject, not the concrete implementation.
#[async_trait]
pub trait MediaHandle: Send + Sync {
    async fn play(&self, query: &str) -> Result<String, String>;
    async fn control(&self, action: &str) -> Result<String, String>;
    async fn queue_snapshot(&self) -> String;
}

/// Values the registry injects into every tool call before dispatch.
/// The LLM never supplies these fields itself.
pub struct ToolContext {
    pub conversation_id: String,
    pub frame_id: String,
    pub user_id: String,
    pub storage: Arc<StorageGateway>,
    pub media: Option<Arc<dyn MediaHandle>>,
}
