use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::Sleep;
use tracing::{info, warn};

use convocore_core::config::{HANDSHAKE_TIMEOUT_MS, HEARTBEAT_GRACE_SECS, HEARTBEAT_INTERVAL_SECS, MAX_PAYLOAD_BYTES};
use convocore_protocol::events::{ClientEvent, ServerEvent};
use convocore_protocol::media::{MediaStatePayload, MediaStateValue};

use crate::app::AppState;
use crate::session::ActiveSession;
use crate::{auth, handshake};

/// Everything that exists only once a connection has authenticated — kept
/// as one bundle so the pre-auth/post-auth split in the select loop is a
/// single `Option` rather than several independently-tracked fields.
struct AuthedCtx {
    user_id: String,
    session: Arc<ActiveSession>,
    outbound_rx: mpsc::Receiver<ServerEvent>,
    superseded: tokio_util::sync::CancellationToken,
}

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_connection(socket, state))
}

/// Per-connection task: pre-auth handshake, then the authenticated
/// event loop, for the lifetime of one WS connection.
async fn handle_connection(socket: WebSocket, state: Arc<AppState>) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    info!(conn_id, "new WS connection");

    let (mut tx, mut rx) = socket.split();

    let nonce = handshake::make_nonce();
    if tx.send(Message::Text(handshake::challenge_json(&nonce).into())).await.is_err() {
        return;
    }

    let handshake_deadline = tokio::time::Instant::now() + Duration::from_millis(HANDSHAKE_TIMEOUT_MS);
    let mut handshake_timer = Box::pin(tokio::time::sleep_until(handshake_deadline));

    let mut heartbeat = tokio::time::interval(Duration::from_secs(HEARTBEAT_INTERVAL_SECS));
    heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    heartbeat.tick().await; // first tick fires immediately; discard it

    let mut grace_timer: Option<Pin<Box<Sleep>>> = None;
    let mut authed: Option<AuthedCtx> = None;

    loop {
        let authed_present = authed.is_some();
        tokio::select! {
            msg = rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if text.len() > MAX_PAYLOAD_BYTES {
                            warn!(conn_id, size = text.len(), "payload too large, closing");
                            break;
                        }
                        if let Some(ctx) = authed.as_ref() {
                            if !handle_authenticated_text(&state, ctx, &mut grace_timer, &text).await {
                                break;
                            }
                        } else {
                            match handle_preauth_text(&state, &conn_id, &mut tx, &text).await {
                                Ok(Some(ctx)) => authed = Some(ctx),
                                Ok(None) => {}
                                Err(()) => break,
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        warn!(conn_id, error = %err, "WS read error, closing");
                        break;
                    }
                }
            }

            Some(event) = async {
                match authed.as_mut() {
                    Some(ctx) => ctx.outbound_rx.recv().await,
                    None => std::future::pending().await,
                }
            }, if authed_present => {
                if tx.send(Message::Text(event.to_json().into())).await.is_err() {
                    break;
                }
            }

            _ = heartbeat.tick(), if authed_present => {
                if grace_timer.is_some() {
                    warn!(conn_id, "heartbeat grace already pending, missed pong, closing");
                    break;
                }
                if tx.send(Message::Text(ServerEvent::Ping.to_json().into())).await.is_err() {
                    break;
                }
                grace_timer = Some(Box::pin(tokio::time::sleep(Duration::from_secs(HEARTBEAT_GRACE_SECS))));
            }

            _ = async { grace_timer.as_mut().unwrap().as_mut().await }, if grace_timer.is_some() => {
                warn!(conn_id, "heartbeat grace expired, closing");
                break;
            }

            _ = &mut handshake_timer, if !authed_present => {
                warn!(conn_id, "handshake timeout, closing");
                break;
            }

            _ = async {
                match authed.as_ref() {
                    Some(ctx) => ctx.superseded.cancelled().await,
                    None => std::future::pending().await,
                }
            }, if authed_present => {
                info!(conn_id, "connection superseded by a newer one, closing");
                break;
            }
        }
    }

    if let Some(ctx) = authed {
        state.sessions.disconnect(&ctx.user_id, &conn_id);
    }
    state.vision.stop(&conn_id);
    info!(conn_id, "WS connection closed");
}

/// Parse and act on one pre-auth frame. `Ok(Some(ctx))` on successful
/// `connect`, `Ok(None)` to keep waiting, `Err(())` to close the connection.
async fn handle_preauth_text(
    state: &Arc<AppState>,
    conn_id: &str,
    tx: &mut futures_util::stream::SplitSink<WebSocket, Message>,
    text: &str,
) -> Result<Option<AuthedCtx>, ()> {
    let Some(params) = handshake::parse_connect(text) else {
        warn!(conn_id, "non-connect frame before authentication, closing");
        return Err(());
    };

    let user_id = match auth::verify_token(&params.token, &state.config.auth) {
        Ok(id) => id,
        Err(reason) => {
            warn!(conn_id, %reason, "authentication failed");
            let _ = tx.send(Message::Text(ServerEvent::error(reason, "UNAUTHENTICATED").to_json().into())).await;
            return Err(());
        }
    };

    let (outbound_tx, outbound_rx) = mpsc::channel(128);
    let session = state.sessions.connect(&user_id, conn_id.to_string(), outbound_tx);
    let superseded = session.superseded_token();

    let media_state = match state.media.get(&user_id).await {
        Some(player) => player.snapshot().await,
        None => MediaStatePayload { state: MediaStateValue::Idle, current_track: None, queue: Vec::new(), volume: 1.0 },
    };

    let snapshot = ServerEvent::Connected {
        chat_active: session.chat_active.load(std::sync::atomic::Ordering::SeqCst),
        conversation_id: session.conversation_id.lock().unwrap().clone(),
        media_state,
        vision_enabled: session.vision_enabled.load(std::sync::atomic::Ordering::SeqCst),
    };
    if tx.send(Message::Text(snapshot.to_json().into())).await.is_err() {
        return Err(());
    }

    for queued in session.outbound.drain() {
        if tx.send(Message::Text(queued.to_json().into())).await.is_err() {
            return Err(());
        }
    }

    info!(conn_id, user_id, "client authenticated");
    Ok(Some(AuthedCtx { user_id, session, outbound_rx, superseded }))
}

/// Handle one authenticated-phase frame. Returns `false` to close the
/// connection (malformed frame, protocol violation).
async fn handle_authenticated_text(state: &Arc<AppState>, ctx: &AuthedCtx, grace_timer: &mut Option<Pin<Box<Sleep>>>, text: &str) -> bool {
    let event: ClientEvent = match serde_json::from_str(text) {
        Ok(event) => event,
        Err(err) => {
            warn!(error = %err, "malformed client event, ignoring");
            return true;
        }
    };

    if matches!(event, ClientEvent::Pong) {
        *grace_timer = None;
        return true;
    }

    crate::dispatch::route(state.clone(), ctx.session.clone(), ctx.user_id.clone(), event).await;
    true
}
