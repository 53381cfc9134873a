use serde::{Deserialize, Serialize};

use crate::media::MediaStatePayload;
use crate::vision::VisionResultPayload;

/// Client → server events. Tagged on `type`, snake_case to match the
/// wire vocabulary literally.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    ChatRequest {
        text: String,
        model_name: Option<String>,
        conversation_id: Option<String>,
        agent_id: Option<String>,
        #[serde(default)]
        images: Vec<String>,
    },
    Cancel,
    ToolApprovalResponse {
        approval_id: String,
        approved: bool,
        modified_args: Option<serde_json::Value>,
    },
    VisionStart {
        enable_face: bool,
        enable_pose: bool,
        enable_hands: bool,
    },
    VisionFrame {
        frame: String,
    },
    VisionStop,
    MediaPlay {
        query: String,
    },
    MediaQueueAdd {
        query: String,
    },
    MediaPause,
    MediaResume,
    MediaSkip,
    MediaStop,
    MediaQueueRemove {
        index: usize,
    },
    MediaVolume {
        volume: f32,
    },
    Pong,
}

/// Server → client events.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    Connected {
        chat_active: bool,
        conversation_id: Option<String>,
        media_state: MediaStatePayload,
        vision_enabled: bool,
    },
    StreamChunk {
        content: Option<String>,
        thinking: Option<String>,
        role: String,
        agent_id: Option<String>,
        name: String,
        voice_reference: Option<String>,
        conversation_id: String,
        frame_id: String,
    },
    Done {
        conversation_id: String,
        frame_id: String,
    },
    AgentSwitch {
        from_agent_id: Option<String>,
        to_agent_id: String,
        from_name: Option<String>,
        to_name: String,
        reason: String,
    },
    ToolApprovalRequest {
        approval_id: String,
        tool_name: String,
        tool_args: serde_json::Value,
        description: String,
        risk_level: String,
    },
    VisionResult(VisionResultPayload),
    MediaState(MediaStatePayload),
    MediaChunk {
        data: String,
        chunk_index: u64,
        is_last: bool,
        format: String,
        sample_rate: u32,
    },
    MediaError {
        error: String,
        code: Option<String>,
    },
    Error {
        error: String,
        code: Option<String>,
    },
    Ping,
}

impl ServerEvent {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("ServerEvent serialization is infallible")
    }

    pub fn error(message: impl Into<String>, code: impl Into<String>) -> Self {
        ServerEvent::Error { error: message.into(), code: Some(code.into()) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_request_round_trips() {
        let raw = r#"{"type":"chat_request","text":"hello","model_name":null,"conversation_id":null,"agent_id":null}"#;
        let ev: ClientEvent = serde_json::from_str(raw).unwrap();
        match ev {
            ClientEvent::ChatRequest { text, images, .. } => {
                assert_eq!(text, "hello");
                assert!(images.is_empty());
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn server_event_tag_matches_wire_vocabulary() {
        let ev = ServerEvent::Done { conversation_id: "c1".into(), frame_id: "f1".into() };
        let json = ev.to_json();
        assert!(json.contains(r#""type":"done""#));
    }

    #[test]
    fn pong_has_no_payload_fields() {
        let ev: ClientEvent = serde_json::from_str(r#"{"type":"pong"}"#).unwrap();
        assert!(matches!(ev, ClientEvent::Pong));
    }
}
