use std::sync::Arc;

use async_trait::async_trait;
use convocore_agent::TurnEventSink;
use convocore_core::types::RiskLevel;
use convocore_protocol::events::ServerEvent;
use convocore_protocol::media::MediaStatePayload;
use convocore_media::StreamSink;

use crate::session::ActiveSession;

/// Adapts one user's `ActiveSession` to the agent runtime's `TurnEventSink`
/// and the media player's `StreamSink`, so neither crate needs to know this
/// gateway exists. Both traits forward straight into `ActiveSession::emit`,
/// which already knows how to buffer when the channel is briefly unattached.
pub struct GatewaySink {
    session: Arc<ActiveSession>,
}

impl GatewaySink {
    pub fn new(session: Arc<ActiveSession>) -> Self {
        Self { session }
    }
}

#[async_trait]
impl TurnEventSink for GatewaySink {
    async fn emit(&self, event: ServerEvent) {
        self.session.emit(event);
    }

    async fn request_tool_approval(
        &self,
        approval_id: String,
        tool_name: String,
        tool_args: serde_json::Value,
        description: String,
        risk_level: RiskLevel,
    ) {
        self.session.emit(ServerEvent::ToolApprovalRequest {
            approval_id,
            tool_name,
            tool_args,
            description,
            risk_level: format!("{risk_level:?}").to_lowercase(),
        });
    }
}

#[async_trait]
impl StreamSink for GatewaySink {
    async fn emit_chunk(&self, data: String, chunk_index: u64, is_last: bool) {
        self.session.emit(ServerEvent::MediaChunk { data, chunk_index, is_last, format: "mp3".to_string(), sample_rate: 44_100 });
    }

    async fn emit_state(&self, state: MediaStatePayload) {
        self.session.emit(ServerEvent::MediaState(state));
    }

    async fn emit_error(&self, error: String) {
        self.session.emit(ServerEvent::MediaError { error, code: Some("MEDIA_ERROR".to_string()) });
    }
}
