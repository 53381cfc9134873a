use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde::Serialize;

use crate::error::{ProviderError, Result};

/// ASR adapter. Input is always 16-bit PCM, 16 kHz, mono.
#[async_trait]
pub trait AsrProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn transcribe(&self, pcm16le_16khz_mono: &[u8], language: Option<&str>, fast: bool) -> Result<String>;
}

/// HTTP-backed transcriber. Tracks whether the remote model has been warmed
/// up yet purely for logging/observability — the first call always pays the
/// remote's own lazy-load cost, this flag just lets us log it once.
pub struct HttpAsrProvider {
    client: reqwest::Client,
    base_url: String,
    loaded: AtomicBool,
}

impl HttpAsrProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { client: reqwest::Client::new(), base_url: base_url.into(), loaded: AtomicBool::new(false) }
    }
}

#[derive(Serialize)]
struct TranscribeQuery<'a> {
    language: Option<&'a str>,
    fast: bool,
}

#[async_trait]
impl AsrProvider for HttpAsrProvider {
    fn name(&self) -> &str {
        "asr"
    }

    async fn transcribe(&self, pcm16le_16khz_mono: &[u8], language: Option<&str>, fast: bool) -> Result<String> {
        if !self.loaded.swap(true, Ordering::SeqCst) {
            tracing::info!(provider = self.name(), "lazy-loading ASR model on first transcription");
        }

        let url = format!("{}/transcribe", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .query(&TranscribeQuery { language, fast })
            .body(pcm16le_16khz_mono.to_vec())
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ProviderError::AsrUnavailable(format!("status {}", response.status())));
        }
        response.text().await.map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_provider_is_not_marked_loaded() {
        let provider = HttpAsrProvider::new("http://localhost:9000");
        assert!(!provider.loaded.load(Ordering::SeqCst));
    }
}
