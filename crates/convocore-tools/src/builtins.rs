use async_trait::async_trait;
use serde::Deserialize;

use crate::context::ToolContext;
use crate::tool::{Tool, ToolResult};

pub struct SearchMessages;

#[derive(Deserialize)]
struct SearchMessagesArgs {
    pattern: String,
    #[serde(default)]
    case_sensitive: bool,
    date_from: Option<String>,
    date_to: Option<String>,
    #[serde(default = "default_limit")]
    limit: u32,
}

fn default_limit() -> u32 {
    20
}

#[async_trait]
impl Tool for SearchMessages {
    fn name(&self) -> &str {
        "search_messages"
    }

    fn description(&self) -> &str {
        "Regex search within the active conversation. Returns matching snippets."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "pattern": { "type": "string" },
                "case_sensitive": { "type": "boolean" },
                "date_from": { "type": "string" },
                "date_to": { "type": "string" },
                "limit": { "type": "integer" },
            },
            "required": ["pattern"],
        })
    }

    async fn execute(&self, input: serde_json::Value, ctx: &ToolContext) -> ToolResult {
        let args: SearchMessagesArgs = match serde_json::from_value(input) {
            Ok(a) => a,
            Err(e) => return ToolResult::error(format!("invalid arguments: {e}")),
        };
        match ctx.storage.search_messages(
            &ctx.conversation_id,
            &args.pattern,
            args.case_sensitive,
            args.date_from.as_deref(),
            args.date_to.as_deref(),
            args.limit,
        ) {
            Ok(hits) => ToolResult::success(serde_json::to_string(&hits).unwrap_or_default()),
            Err(e) => ToolResult::error(e.to_string()),
        }
    }
}

pub struct GetConversationInfo;

#[async_trait]
impl Tool for GetConversationInfo {
    fn name(&self) -> &str {
        "get_conversation_info"
    }

    fn description(&self) -> &str {
        "Message count and first/last timestamp for the active conversation."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _input: serde_json::Value, ctx: &ToolContext) -> ToolResult {
        match ctx.storage.conversation_info(&ctx.conversation_id) {
            Ok(info) => ToolResult::success(serde_json::to_string(&info).unwrap_or_default()),
            Err(e) => ToolResult::error(e.to_string()),
        }
    }
}

pub struct GetFrameSummaries;

#[async_trait]
impl Tool for GetFrameSummaries {
    fn name(&self) -> &str {
        "get_frame_summaries"
    }

    fn description(&self) -> &str {
        "List past frames of the active conversation with their summaries."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _input: serde_json::Value, ctx: &ToolContext) -> ToolResult {
        match ctx.storage.list_frames(&ctx.conversation_id) {
            Ok(frames) => {
                let summaries: Vec<_> = frames
                    .into_iter()
                    .map(|f| serde_json::json!({ "frame_id": f.id, "summary": f.summary, "created_at": f.created_at }))
                    .collect();
                ToolResult::success(serde_json::to_string(&summaries).unwrap_or_default())
            }
            Err(e) => ToolResult::error(e.to_string()),
        }
    }
}

pub struct GetFrameMessages;

#[derive(Deserialize)]
struct GetFrameMessagesArgs {
    frame_id: String,
}

#[async_trait]
impl Tool for GetFrameMessages {
    fn name(&self) -> &str {
        "get_frame_messages"
    }

    fn description(&self) -> &str {
        "Messages of a specific past frame."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": { "frame_id": { "type": "string" } },
            "required": ["frame_id"],
        })
    }

    async fn execute(&self, input: serde_json::Value, ctx: &ToolContext) -> ToolResult {
        let args: GetFrameMessagesArgs = match serde_json::from_value(input) {
            Ok(a) => a,
            Err(e) => return ToolResult::error(format!("invalid arguments: {e}")),
        };
        match ctx.storage.get_frame_messages(&args.frame_id) {
            Ok(messages) => ToolResult::success(serde_json::to_string(&messages).unwrap_or_default()),
            Err(e) => ToolResult::error(e.to_string()),
        }
    }
}

pub struct GetSkillInstructions;

#[derive(Deserialize)]
struct GetSkillInstructionsArgs {
    name: String,
}

#[async_trait]
impl Tool for GetSkillInstructions {
    fn name(&self) -> &str {
        "get_skill_instructions"
    }

    fn description(&self) -> &str {
        "Fetch the full instruction text of a named skill."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": { "name": { "type": "string" } },
            "required": ["name"],
        })
    }

    async fn execute(&self, input: serde_json::Value, ctx: &ToolContext) -> ToolResult {
        let args: GetSkillInstructionsArgs = match serde_json::from_value(input) {
            Ok(a) => a,
            Err(e) => return ToolResult::error(format!("invalid arguments: {e}")),
        };
        match ctx.storage.get_skill_by_name(&ctx.user_id, &args.name) {
            Ok(skill) => ToolResult::success(skill.instructions),
            Err(e) => ToolResult::error(e.to_string()),
        }
    }
}

pub fn built_in_tools() -> Vec<Box<dyn Tool>> {
    vec![
        Box::new(SearchMessages),
        Box::new(GetConversationInfo),
        Box::new(GetFrameSummaries),
        Box::new(GetFrameMessages),
        Box::new(GetSkillInstructions),
    ]
}
