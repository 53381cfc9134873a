use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::app::AppState;

/// POST /v1/chat/completions — a thin translation onto the same direct-agent
/// or orchestrated turn the WS gateway runs, for tooling that already speaks
/// the OpenAI chat-completions shape. Always answers as one complete
/// `chat.completion`, even when the caller asked for `stream: true` — there
/// is no session here to stream deltas to.
pub async fn chat_completions(State(state): State<Arc<AppState>>, headers: HeaderMap, Json(req): Json<OpenAiRequest>) -> Result<impl IntoResponse, (StatusCode, Json<OpenAiError>)> {
    let user_id = authenticate(&state, &headers).map_err(|reason| (StatusCode::UNAUTHORIZED, Json(OpenAiError::new(&reason))))?;

    let message = req.last_user_message().ok_or_else(|| (StatusCode::BAD_REQUEST, Json(OpenAiError::new("no user message found"))))?;

    info!(model = %req.model, "OpenAI-compatible completion request");

    match crate::chat::run_completion(&state, &user_id, &req.model, &message).await {
        Ok(content) => {
            let reply = OpenAiResponse {
                id: format!("chatcmpl-{}", uuid::Uuid::new_v4()),
                object: "chat.completion".to_string(),
                model: req.model.clone(),
                choices: vec![Choice { index: 0, message: OpenAiMessage { role: "assistant".to_string(), content: Some(content) }, finish_reason: "stop".to_string() }],
            };
            Ok((StatusCode::OK, Json(reply)))
        }
        Err(err) => {
            warn!(error = %err, "completion failed");
            Err((StatusCode::INTERNAL_SERVER_ERROR, Json(OpenAiError::new(&err.to_string()))))
        }
    }
}

fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<String, String> {
    let token = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| "missing bearer token".to_string())?;
    crate::auth::verify_token(token, &state.config.auth)
}

#[derive(Deserialize)]
#[allow(dead_code)]
pub struct OpenAiRequest {
    pub model: String,
    pub messages: Vec<OpenAiMessage>,
    #[serde(default)]
    pub stream: bool,
}

impl OpenAiRequest {
    fn last_user_message(&self) -> Option<String> {
        self.messages.iter().rev().find(|m| m.role == "user").and_then(|m| m.content.clone())
    }
}

#[derive(Serialize, Deserialize, Clone)]
pub struct OpenAiMessage {
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

#[derive(Serialize)]
struct OpenAiResponse {
    id: String,
    object: String,
    model: String,
    choices: Vec<Choice>,
}

#[derive(Serialize)]
struct Choice {
    index: u32,
    message: OpenAiMessage,
    finish_reason: String,
}

#[derive(Serialize)]
pub struct OpenAiError {
    error: ErrorBody,
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
    #[serde(rename = "type")]
    error_type: String,
}

impl OpenAiError {
    fn new(msg: &str) -> Self {
        Self { error: ErrorBody { message: msg.to_string(), error_type: "invalid_request_error".to_string() } }
    }
}
