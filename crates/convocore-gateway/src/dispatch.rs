use std::sync::Arc;

use convocore_protocol::events::{ClientEvent, ServerEvent};
use convocore_tools::ApprovalDecision;
use tracing::warn;

use crate::app::AppState;
use crate::session::ActiveSession;
use crate::sinks::GatewaySink;

/// Route one authenticated-phase `ClientEvent`. The handshake frames never
/// reach here — the connection loop handles those itself since they affect
/// the heartbeat/auth state machine directly.
pub async fn route(state: Arc<AppState>, session: Arc<ActiveSession>, user_id: String, event: ClientEvent) {
    match event {
        ClientEvent::ChatRequest { .. } => {
            crate::chat::handle_chat_request(state, session, user_id, event).await;
        }
        ClientEvent::Cancel => {
            session.current_turn_cancel().cancel();
        }
        ClientEvent::ToolApprovalResponse { approval_id, approved, modified_args } => {
            let decision = if approved { ApprovalDecision::Approved { modified_args } } else { ApprovalDecision::Denied };
            if !state.tools.resolve_approval(&approval_id, decision) {
                warn!(approval_id, "tool approval response for unknown or expired approval");
            }
        }
        ClientEvent::VisionStart { enable_face, enable_pose, enable_hands } => {
            let conn_id = session.conn_id.lock().unwrap().clone();
            match state.vision.start(&conn_id, &user_id, enable_face, enable_pose || enable_hands) {
                Ok(()) => session.vision_enabled.store(true, std::sync::atomic::Ordering::SeqCst),
                Err(err) => session.emit(ServerEvent::error(err.to_string(), "VISION_START_FAILED")),
            }
        }
        ClientEvent::VisionFrame { frame } => {
            let conn_id = session.conn_id.lock().unwrap().clone();
            if let Some(vision_session) = state.vision.get(&conn_id) {
                if let Some(result) = vision_session.process_frame(&frame).await {
                    session.emit(ServerEvent::VisionResult(result));
                }
            }
        }
        ClientEvent::VisionStop => {
            let conn_id = session.conn_id.lock().unwrap().clone();
            state.vision.stop(&conn_id);
            session.vision_enabled.store(false, std::sync::atomic::Ordering::SeqCst);
        }
        ClientEvent::MediaPlay { query } => media_call(&state, &session, &user_id, |p, q| async move { p.play(&q).await }, query).await,
        ClientEvent::MediaQueueAdd { query } => media_call(&state, &session, &user_id, |p, q| async move { p.queue_add(&q).await }, query).await,
        ClientEvent::MediaPause => media_call_simple(&state, &session, &user_id, |p| async move { p.pause().await }).await,
        ClientEvent::MediaResume => media_call_simple(&state, &session, &user_id, |p| async move { p.resume().await }).await,
        ClientEvent::MediaSkip => media_call_simple(&state, &session, &user_id, |p| async move { p.skip().await }).await,
        ClientEvent::MediaStop => media_call_simple(&state, &session, &user_id, |p| async move { p.stop().await }).await,
        ClientEvent::MediaQueueRemove { index } => media_call(&state, &session, &user_id, |p, i| async move { p.queue_remove(i).await }, index).await,
        ClientEvent::MediaVolume { volume } => media_call(&state, &session, &user_id, |p, v| async move { p.volume(v).await }, volume).await,
        ClientEvent::Pong => {}
    }
}

async fn get_player(state: &Arc<AppState>, session: &Arc<ActiveSession>, user_id: &str) -> Arc<convocore_media::Player> {
    let sink = Arc::new(GatewaySink::new(session.clone())) as Arc<dyn convocore_media::StreamSink>;
    state.media.get_or_create(user_id, sink).await
}

async fn media_call<T, F, Fut>(state: &Arc<AppState>, session: &Arc<ActiveSession>, user_id: &str, f: F, arg: T)
where
    F: FnOnce(Arc<convocore_media::Player>, T) -> Fut,
    Fut: std::future::Future<Output = Result<String, String>>,
{
    let player = get_player(state, session, user_id).await;
    if let Err(err) = f(player, arg).await {
        session.emit(ServerEvent::MediaError { error: err, code: Some("MEDIA_COMMAND_FAILED".to_string()) });
    }
}

async fn media_call_simple<F, Fut>(state: &Arc<AppState>, session: &Arc<ActiveSession>, user_id: &str, f: F)
where
    F: FnOnce(Arc<convocore_media::Player>) -> Fut,
    Fut: std::future::Future<Output = Result<String, String>>,
{
    let player = get_player(state, session, user_id).await;
    if let Err(err) = f(player).await {
        session.emit(ServerEvent::MediaError { error: err, code: Some("MEDIA_COMMAND_FAILED".to_string()) });
    }
}
