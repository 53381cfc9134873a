use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{info, warn};

use convocore_agent::{AgentRuntime, FrameManager};
use convocore_core::config::CoreConfig;
use convocore_media::{HttpTrackResolver, MediaManager};
use convocore_orchestrator::Orchestrator;
use convocore_storage::StorageGateway;
use convocore_tools::ToolRegistry;
use convocore_vision::{HttpFaceDetector, HttpGestureDetector, VisionManager};

use convocore_gateway::app;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "convocore_gateway=info,tower_http=debug".into()))
        .init();

    let config_path = std::env::var("CONVOCORE_CONFIG").ok();
    let config = CoreConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        warn!("config load failed ({e}), using defaults");
        CoreConfig::default()
    });

    let storage = Arc::new(StorageGateway::open(&config.database.dsn)?);
    let tools = Arc::new(ToolRegistry::new());
    let agent_runtime = Arc::new(AgentRuntime::new(storage.clone(), tools.clone()));
    let orchestrator = Arc::new(Orchestrator::new(storage.clone(), agent_runtime.clone()));
    let frame_manager = Arc::new(FrameManager::new(storage.clone(), config.frames.idle_threshold_minutes));

    let track_resolver = Arc::new(HttpTrackResolver::new(config.providers.media_index_url.clone().unwrap_or_else(|| "http://127.0.0.1:9200".to_string())));
    let media = Arc::new(MediaManager::new(track_resolver));

    let face_detector = Arc::new(HttpFaceDetector::new(config.providers.face_detector_url.clone().unwrap_or_else(|| "http://127.0.0.1:9300".to_string())));
    let gesture_detector = Arc::new(HttpGestureDetector::new(config.providers.gesture_detector_url.clone().unwrap_or_else(|| "http://127.0.0.1:9301".to_string())));
    let vision = Arc::new(VisionManager::new(face_detector, gesture_detector, storage.clone()));

    let bind = config.gateway.bind.clone();
    let port = config.gateway.port;
    let state = Arc::new(app::AppState::new(config, storage, tools, agent_runtime, orchestrator, frame_manager, media, vision));
    let router = app::build_router(state);

    let addr: SocketAddr = format!("{bind}:{port}").parse()?;
    info!("convocore gateway listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}
