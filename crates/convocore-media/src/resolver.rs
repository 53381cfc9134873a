use async_trait::async_trait;
use convocore_protocol::media::Track;

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("no results for query: {0}")]
    NotFound(String),
    #[error("media index request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Resolves a free-text query against an external media index. The
/// HTTP implementation is the only backend this core ships; tests use a
/// canned stub.
#[async_trait]
pub trait TrackResolver: Send + Sync {
    async fn resolve(&self, query: &str) -> Result<Track, ResolveError>;
}

pub struct HttpTrackResolver {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTrackResolver {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { client: reqwest::Client::new(), base_url: base_url.into() }
    }
}

#[derive(serde::Deserialize)]
struct SearchResponse {
    results: Vec<Track>,
}

#[async_trait]
impl TrackResolver for HttpTrackResolver {
    async fn resolve(&self, query: &str) -> Result<Track, ResolveError> {
        let url = format!("{}/search", self.base_url.trim_end_matches('/'));
        let resp: SearchResponse = self.client.get(&url).query(&[("q", query)]).send().await?.json().await?;
        resp.results.into_iter().next().ok_or_else(|| ResolveError::NotFound(query.to_string()))
    }
}
