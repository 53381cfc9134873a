use async_trait::async_trait;
use convocore_core::types::MessageRole;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{ProviderError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub input: serde_json::Value,
}

/// A single turn request to an LLM provider. `system` carries the
/// assembled system message list joined as one block;
/// `messages` carries only the conversational history.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub system: String,
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<ToolDefinition>,
    pub think: bool,
    pub max_tokens: u32,
}

/// One element of the lazy delta sequence `chat_stream` produces.
#[derive(Debug, Clone)]
pub enum LlmDelta {
    Content { text: String },
    Thinking { text: String },
    ToolCalls(Vec<ToolCall>),
    Done { stop_reason: String, tokens_in: u32, tokens_out: u32 },
}

/// Common interface to every LLM backend. Adapters are stateless — no DB, no
/// user identity — the caller supplies all context as explicit arguments.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Stream response deltas through `tx`. Must stop promptly and drop the
    /// underlying HTTP stream when `cancel` fires.
    async fn chat_stream(
        &self,
        req: &ChatRequest,
        tx: mpsc::Sender<LlmDelta>,
        cancel: CancellationToken,
    ) -> Result<()>;

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

/// Parse a single SSE line into its event/data half, mirroring the line
/// framing every SSE-speaking remote in this stack uses.
#[derive(Debug)]
pub enum SseParsed {
    Event(String),
    Data(String),
}

pub fn parse_sse_line(line: &str) -> Option<SseParsed> {
    if let Some(event_type) = line.strip_prefix("event: ") {
        Some(SseParsed::Event(event_type.to_string()))
    } else {
        line.strip_prefix("data: ").map(|data| SseParsed::Data(data.to_string()))
    }
}

/// OpenAI-compatible chat-completions client, speaking SSE for streaming
/// responses over a shared pooled HTTP client. This is the adapter behind
/// `DEFAULT_LLM_URL` and the only concrete LLM backend this core ships;
/// any OpenAI-wire-compatible endpoint (vLLM, Ollama's OpenAI shim, etc.)
/// works without code changes.
pub struct HttpLlmProvider {
    client: reqwest::Client,
    base_url: String,
}

impl HttpLlmProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { client: reqwest::Client::new(), base_url: base_url.into() }
    }
}

#[derive(Serialize)]
struct OpenAiChatRequest<'a> {
    model: &'a str,
    messages: Vec<OpenAiMessage<'a>>,
    stream: bool,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<OpenAiTool<'a>>,
}

#[derive(Serialize)]
struct OpenAiMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct OpenAiTool<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: OpenAiFunction<'a>,
}

#[derive(Serialize)]
struct OpenAiFunction<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a serde_json::Value,
}

#[derive(Deserialize)]
struct OpenAiStreamChunk {
    choices: Vec<OpenAiStreamChoice>,
}

#[derive(Deserialize)]
struct OpenAiStreamChoice {
    delta: OpenAiStreamDelta,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Default)]
struct OpenAiStreamDelta {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<OpenAiStreamToolCall>,
}

#[derive(Deserialize)]
struct OpenAiStreamToolCall {
    id: Option<String>,
    function: OpenAiStreamFunctionCall,
}

#[derive(Deserialize)]
struct OpenAiStreamFunctionCall {
    name: Option<String>,
    arguments: Option<String>,
}

#[async_trait]
impl LlmProvider for HttpLlmProvider {
    fn name(&self) -> &str {
        "openai-compatible"
    }

    async fn chat_stream(
        &self,
        req: &ChatRequest,
        tx: mpsc::Sender<LlmDelta>,
        cancel: CancellationToken,
    ) -> Result<()> {
        let mut messages = Vec::with_capacity(req.messages.len() + 1);
        if !req.system.is_empty() {
            messages.push(OpenAiMessage { role: "system", content: &req.system });
        }
        messages.extend(req.messages.iter().map(|m| OpenAiMessage { role: role_str(m.role), content: &m.content }));

        let body = OpenAiChatRequest {
            model: &req.model,
            messages,
            stream: true,
            max_tokens: req.max_tokens,
            tools: req
                .tools
                .iter()
                .map(|t| OpenAiTool {
                    kind: "function",
                    function: OpenAiFunction {
                        name: &t.name,
                        description: &t.description,
                        parameters: &t.input_schema,
                    },
                })
                .collect(),
        };

        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(ProviderError::Cancelled),
            resp = self.client.post(&url).json(&body).send() => resp?,
        };

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api { status, message });
        }

        let mut stream = response.bytes_stream();
        use futures_util::StreamExt;
        let mut buf = String::new();
        let mut accumulated_tool_calls: Vec<ToolCall> = Vec::new();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Err(ProviderError::Cancelled),
                chunk = stream.next() => {
                    let Some(chunk) = chunk else { break };
                    let chunk = chunk?;
                    buf.push_str(&String::from_utf8_lossy(&chunk));

                    while let Some(pos) = buf.find('\n') {
                        let line = buf[..pos].trim_end_matches('\r').to_string();
                        buf.drain(..=pos);
                        let Some(SseParsed::Data(data)) = parse_sse_line(&line) else { continue };
                        if data == "[DONE]" {
                            let _ = tx
                                .send(LlmDelta::Done {
                                    stop_reason: "stop".into(),
                                    tokens_in: 0,
                                    tokens_out: 0,
                                })
                                .await;
                            return Ok(());
                        }
                        let parsed: OpenAiStreamChunk = serde_json::from_str(&data)
                            .map_err(|e| ProviderError::Parse(e.to_string()))?;
                        for choice in parsed.choices {
                            if let Some(text) = choice.delta.content {
                                let _ = tx.send(LlmDelta::Content { text }).await;
                            }
                            for tc in choice.delta.tool_calls {
                                accumulated_tool_calls.push(ToolCall {
                                    id: tc.id.unwrap_or_default(),
                                    name: tc.function.name.unwrap_or_default(),
                                    input: tc
                                        .function
                                        .arguments
                                        .and_then(|a| serde_json::from_str(&a).ok())
                                        .unwrap_or(serde_json::Value::Null),
                                });
                            }
                            if let Some(reason) = choice.finish_reason {
                                if !accumulated_tool_calls.is_empty() {
                                    let _ = tx
                                        .send(LlmDelta::ToolCalls(std::mem::take(&mut accumulated_tool_calls)))
                                        .await;
                                }
                                let _ = tx
                                    .send(LlmDelta::Done { stop_reason: reason, tokens_in: 0, tokens_out: 0 })
                                    .await;
                                return Ok(());
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

fn role_str(role: MessageRole) -> &'static str {
    match role {
        MessageRole::User => "user",
        MessageRole::Assistant => "assistant",
        MessageRole::Tool => "tool",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sse_line_parses_event_and_data() {
        assert!(matches!(parse_sse_line("event: message"), Some(SseParsed::Event(_))));
        assert!(matches!(parse_sse_line("data: {}"), Some(SseParsed::Data(_))));
        assert!(parse_sse_line("other").is_none());
    }
}
