use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use convocore_core::types::McpTransport;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;

use crate::error::{ProviderError, Result};

const TOOL_CACHE_TTL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct McpServerSpec {
    pub id: String,
    pub transport: McpTransport,
    pub url: Option<String>,
    pub command: Option<String>,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpToolSchema {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// MCP client adapter: a consumer of remote MCP servers, the opposite
/// direction from exposing tools to an external MCP client.
#[async_trait]
pub trait McpClient: Send + Sync {
    async fn list_tools(&self, server: &McpServerSpec) -> Result<Vec<McpToolSchema>>;
    async fn call_tool(
        &self,
        server: &McpServerSpec,
        name: &str,
        args: serde_json::Value,
    ) -> Result<serde_json::Value>;
}

struct CacheEntry {
    fetched_at: Instant,
    tools: Vec<McpToolSchema>,
}

/// Per-user, 30-second-TTL cache of `list_tools` results, keyed by
/// `(user_id, server_id)` so two users never share one server's tool list.
/// `DashMap`'s sharded locking gives short insert/lookup/remove critical
/// sections without a dedicated per-user mutex.
pub struct McpToolCache {
    entries: DashMap<(String, String), CacheEntry>,
}

impl Default for McpToolCache {
    fn default() -> Self {
        Self::new()
    }
}

impl McpToolCache {
    pub fn new() -> Self {
        Self { entries: DashMap::new() }
    }

    /// Returns the cached tool list if present and unexpired, else calls
    /// `fill` to populate it.
    pub async fn get_or_fill<F, Fut>(&self, user_id: &str, server_id: &str, fill: F) -> Result<Vec<McpToolSchema>>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<Vec<McpToolSchema>>>,
    {
        let key = (user_id.to_string(), server_id.to_string());
        if let Some(entry) = self.entries.get(&key) {
            if entry.fetched_at.elapsed() < TOOL_CACHE_TTL {
                return Ok(entry.tools.clone());
            }
        }
        let tools = fill().await?;
        self.entries.insert(key, CacheEntry { fetched_at: Instant::now(), tools: tools.clone() });
        Ok(tools)
    }

    pub fn invalidate(&self, user_id: &str, server_id: &str) {
        self.entries.remove(&(user_id.to_string(), server_id.to_string()));
    }
}

#[derive(Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: serde_json::Value,
}

#[derive(Deserialize)]
struct JsonRpcResponse {
    result: Option<serde_json::Value>,
    error: Option<JsonRpcError>,
}

#[derive(Deserialize)]
struct JsonRpcError {
    message: String,
}

/// Default MCP client covering both transports a configured MCP server names:
/// a spawned stdio subprocess speaking newline-delimited JSON-RPC 2.0, or an
/// HTTP/SSE endpoint reached the same way the LLM adapter reaches its
/// remote. One request id counter per call keeps the protocol framing
/// trivial since this client never pipelines requests to the same server.
pub struct DefaultMcpClient {
    http: reqwest::Client,
}

impl Default for DefaultMcpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl DefaultMcpClient {
    pub fn new() -> Self {
        Self { http: reqwest::Client::new() }
    }

    async fn rpc_stdio(&self, server: &McpServerSpec, method: &str, params: serde_json::Value) -> Result<serde_json::Value> {
        let command = server
            .command
            .as_deref()
            .ok_or_else(|| ProviderError::McpUnavailable("stdio server missing command".into()))?;

        let mut child = Command::new(command)
            .args(&server.args)
            .envs(&server.env)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .spawn()
            .map_err(|e| ProviderError::McpUnavailable(e.to_string()))?;

        let request = JsonRpcRequest { jsonrpc: "2.0", id: 1, method, params };
        let line = serde_json::to_string(&request).map_err(|e| ProviderError::Parse(e.to_string()))?;

        let mut stdin = child.stdin.take().ok_or_else(|| ProviderError::McpUnavailable("no stdin".into()))?;
        stdin.write_all(line.as_bytes()).await.map_err(|e| ProviderError::McpUnavailable(e.to_string()))?;
        stdin.write_all(b"\n").await.map_err(|e| ProviderError::McpUnavailable(e.to_string()))?;
        drop(stdin);

        let stdout = child.stdout.take().ok_or_else(|| ProviderError::McpUnavailable("no stdout".into()))?;
        let mut reader = BufReader::new(stdout).lines();
        let Some(response_line) = reader.next_line().await.map_err(|e| ProviderError::McpUnavailable(e.to_string()))? else {
            return Err(ProviderError::McpUnavailable("server closed stdout without responding".into()));
        };

        let response: JsonRpcResponse =
            serde_json::from_str(&response_line).map_err(|e| ProviderError::Parse(e.to_string()))?;
        if let Some(error) = response.error {
            return Err(ProviderError::McpUnavailable(error.message));
        }
        response.result.ok_or_else(|| ProviderError::McpUnavailable("empty result".into()))
    }

    async fn rpc_sse(&self, server: &McpServerSpec, method: &str, params: serde_json::Value) -> Result<serde_json::Value> {
        let url = server
            .url
            .as_deref()
            .ok_or_else(|| ProviderError::McpUnavailable("sse server missing url".into()))?;

        let request = JsonRpcRequest { jsonrpc: "2.0", id: 1, method, params };
        let response = self.http.post(url).json(&request).send().await?;
        if !response.status().is_success() {
            return Err(ProviderError::McpUnavailable(format!("status {}", response.status())));
        }
        let parsed: JsonRpcResponse = response.json().await.map_err(|e| ProviderError::Parse(e.to_string()))?;
        if let Some(error) = parsed.error {
            return Err(ProviderError::McpUnavailable(error.message));
        }
        parsed.result.ok_or_else(|| ProviderError::McpUnavailable("empty result".into()))
    }

    async fn rpc(&self, server: &McpServerSpec, method: &str, params: serde_json::Value) -> Result<serde_json::Value> {
        match server.transport {
            McpTransport::Stdio => self.rpc_stdio(server, method, params).await,
            McpTransport::Sse => self.rpc_sse(server, method, params).await,
        }
    }
}

#[async_trait]
impl McpClient for DefaultMcpClient {
    async fn list_tools(&self, server: &McpServerSpec) -> Result<Vec<McpToolSchema>> {
        let result = self.rpc(server, "tools/list", serde_json::json!({})).await?;
        serde_json::from_value(
            result
                .get("tools")
                .cloned()
                .ok_or_else(|| ProviderError::Parse("missing tools field".into()))?,
        )
        .map_err(|e| ProviderError::Parse(e.to_string()))
    }

    async fn call_tool(&self, server: &McpServerSpec, name: &str, args: serde_json::Value) -> Result<serde_json::Value> {
        self.rpc(server, "tools/call", serde_json::json!({ "name": name, "arguments": args })).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cache_fills_once_and_serves_from_cache_within_ttl() {
        let cache = McpToolCache::new();
        let calls = std::sync::atomic::AtomicUsize::new(0);
        let tool = McpToolSchema { name: "t".into(), description: "".into(), input_schema: serde_json::json!({}) };

        for _ in 0..3 {
            let tools = cache
                .get_or_fill("user-1", "server-1", || async {
                    calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                    Ok(vec![tool.clone()])
                })
                .await
                .unwrap();
            assert_eq!(tools.len(), 1);
        }
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cache_is_scoped_per_user() {
        let cache = McpToolCache::new();
        let tool_a = McpToolSchema { name: "a".into(), description: "".into(), input_schema: serde_json::json!({}) };
        let tool_b = McpToolSchema { name: "b".into(), description: "".into(), input_schema: serde_json::json!({}) };

        cache.get_or_fill("user-1", "server-1", || async { Ok(vec![tool_a.clone()]) }).await.unwrap();
        let for_user_2 = cache
            .get_or_fill("user-2", "server-1", || async { Ok(vec![tool_b.clone()]) })
            .await
            .unwrap();
        assert_eq!(for_user_2[0].name, "b");
    }
}
