use async_trait::async_trait;
use serde::Deserialize;

use crate::context::ToolContext;
use crate::tool::{Tool, ToolResult};

pub struct PlayMusic;

#[derive(Deserialize)]
struct PlayMusicArgs {
    query: String,
}

#[async_trait]
impl Tool for PlayMusic {
    fn name(&self) -> &str {
        "play_music"
    }

    fn description(&self) -> &str {
        "Search for and start playing a track on the user's media player."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": { "query": { "type": "string" } },
            "required": ["query"],
        })
    }

    async fn execute(&self, input: serde_json::Value, ctx: &ToolContext) -> ToolResult {
        let args: PlayMusicArgs = match serde_json::from_value(input) {
            Ok(a) => a,
            Err(e) => return ToolResult::error(format!("invalid arguments: {e}")),
        };
        let Some(media) = &ctx.media else {
            return ToolResult::error("no media player active for this user");
        };
        match media.play(&args.query).await {
            Ok(track) => ToolResult::success(track),
            Err(e) => ToolResult::error(e),
        }
    }
}

pub struct MusicControl;

#[derive(Deserialize)]
struct MusicControlArgs {
    action: String,
}

#[async_trait]
impl Tool for MusicControl {
    fn name(&self) -> &str {
        "music_control"
    }

    fn description(&self) -> &str {
        "Control playback: pause, resume, skip, or stop."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": { "action": { "type": "string", "enum": ["pause", "resume", "skip", "stop"] } },
            "required": ["action"],
        })
    }

    async fn execute(&self, input: serde_json::Value, ctx: &ToolContext) -> ToolResult {
        let args: MusicControlArgs = match serde_json::from_value(input) {
            Ok(a) => a,
            Err(e) => return ToolResult::error(format!("invalid arguments: {e}")),
        };
        let Some(media) = &ctx.media else {
            return ToolResult::error("no media player active for this user");
        };
        match media.control(&args.action).await {
            Ok(msg) => ToolResult::success(msg),
            Err(e) => ToolResult::error(e),
        }
    }
}

pub struct GetMusicQueue;

#[async_trait]
impl Tool for GetMusicQueue {
    fn name(&self) -> &str {
        "get_music_queue"
    }

    fn description(&self) -> &str {
        "Current playback state and queued tracks."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _input: serde_json::Value, ctx: &ToolContext) -> ToolResult {
        let Some(media) = &ctx.media else {
            return ToolResult::success("{\"state\":\"idle\",\"queue\":[]}");
        };
        ToolResult::success(media.queue_snapshot().await)
    }
}

pub struct RouteToAgent;

#[derive(Deserialize)]
struct RouteToAgentArgs {
    agent_name: String,
    reason: String,
}

#[async_trait]
impl Tool for RouteToAgent {
    fn name(&self) -> &str {
        "route_to_agent"
    }

    fn description(&self) -> &str {
        "Hand the conversation off to a named agent for the next turn."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "agent_name": { "type": "string" },
                "reason": { "type": "string" },
            },
            "required": ["agent_name", "reason"],
        })
    }

    async fn execute(&self, input: serde_json::Value, _ctx: &ToolContext) -> ToolResult {
        let args: RouteToAgentArgs = match serde_json::from_value(input) {
            Ok(a) => a,
            Err(e) => return ToolResult::error(format!("invalid arguments: {e}")),
        };
        // The orchestrator intercepts this call by name before it reaches
        // here in normal operation; this handler only covers direct
        // single-agent invocations (acknowledges and no-ops).
        ToolResult::success(format!("routing to {} ({})", args.agent_name, args.reason))
    }
}

pub struct RouteToUser;

#[derive(Deserialize)]
struct RouteToUserArgs {
    final_message: String,
}

#[async_trait]
impl Tool for RouteToUser {
    fn name(&self) -> &str {
        "route_to_user"
    }

    fn description(&self) -> &str {
        "End the orchestration turn and address the user directly."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": { "final_message": { "type": "string" } },
            "required": ["final_message"],
        })
    }

    async fn execute(&self, input: serde_json::Value, _ctx: &ToolContext) -> ToolResult {
        let args: RouteToUserArgs = match serde_json::from_value(input) {
            Ok(a) => a,
            Err(e) => return ToolResult::error(format!("invalid arguments: {e}")),
        };
        ToolResult::success(args.final_message)
    }
}

pub fn opt_in_tools() -> Vec<Box<dyn Tool>> {
    vec![
        Box::new(PlayMusic),
        Box::new(MusicControl),
        Box::new(GetMusicQueue),
        Box::new(RouteToAgent),
        Box::new(RouteToUser),
    ]
}
