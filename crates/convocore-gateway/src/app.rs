use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use convocore_agent::{AgentRuntime, FrameManager};
use convocore_core::config::CoreConfig;
use convocore_media::MediaManager;
use convocore_orchestrator::Orchestrator;
use convocore_storage::StorageGateway;
use convocore_tools::ToolRegistry;
use convocore_vision::VisionManager;

use crate::session::SessionRegistry;

/// Central shared state, passed as `Arc<AppState>` to every handler — storage,
/// the tool registry, the agent runtime and orchestrator, the frame manager,
/// and the media/vision session managers.
pub struct AppState {
    pub config: CoreConfig,
    pub storage: Arc<StorageGateway>,
    pub tools: Arc<ToolRegistry>,
    pub agent_runtime: Arc<AgentRuntime>,
    pub orchestrator: Arc<Orchestrator>,
    pub frame_manager: Arc<FrameManager>,
    pub media: Arc<MediaManager>,
    pub vision: Arc<VisionManager>,
    pub sessions: SessionRegistry,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: CoreConfig,
        storage: Arc<StorageGateway>,
        tools: Arc<ToolRegistry>,
        agent_runtime: Arc<AgentRuntime>,
        orchestrator: Arc<Orchestrator>,
        frame_manager: Arc<FrameManager>,
        media: Arc<MediaManager>,
        vision: Arc<VisionManager>,
    ) -> Self {
        Self { config, storage, tools, agent_runtime, orchestrator, frame_manager, media, vision, sessions: SessionRegistry::new() }
    }
}

/// Assemble the full Axum router: the WS session endpoint plus the minimal
/// ambient HTTP surface (`/health`, OpenAI-compatible completions).
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(crate::http::health::health_handler))
        .route("/v1/chat/completions", post(crate::http::openai_compat::chat_completions))
        .route("/ws", get(crate::ws::connection::ws_handler))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
