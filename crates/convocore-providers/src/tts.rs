use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{ProviderError, Result};

const MAX_CHUNK_CHARS: usize = 200;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Voice {
    pub id: String,
    pub name: String,
    pub provider: String,
}

/// TTS adapter. `synthesize` is responsible for splitting long text
/// into ≤200-character chunks along paragraph/sentence boundaries and
/// concatenating the resulting WAV bytes — callers always get one finished
/// clip back.
#[async_trait]
pub trait TtsProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn synthesize(&self, text: &str, voice_reference: &str) -> Result<Vec<u8>>;

    async fn list_voices(&self) -> Result<Vec<Voice>>;
}

/// Split `text` into pieces no longer than `MAX_CHUNK_CHARS`, preferring to
/// break on a paragraph boundary, then a sentence boundary, falling back to
/// a hard cut only when a single sentence itself exceeds the limit.
pub fn split_for_synthesis(text: &str) -> Vec<String> {
    let mut chunks = Vec::new();
    for paragraph in text.split("\n\n") {
        let paragraph = paragraph.trim();
        if paragraph.is_empty() {
            continue;
        }
        if paragraph.len() <= MAX_CHUNK_CHARS {
            chunks.push(paragraph.to_string());
            continue;
        }
        let mut current = String::new();
        for sentence in split_sentences(paragraph) {
            if current.len() + sentence.len() > MAX_CHUNK_CHARS && !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
            }
            if sentence.len() > MAX_CHUNK_CHARS {
                for hard_chunk in sentence.as_bytes().chunks(MAX_CHUNK_CHARS) {
                    chunks.push(String::from_utf8_lossy(hard_chunk).to_string());
                }
            } else {
                current.push_str(&sentence);
            }
        }
        if !current.is_empty() {
            chunks.push(current);
        }
    }
    if chunks.is_empty() && !text.trim().is_empty() {
        chunks.push(text.trim().to_string());
    }
    chunks
}

fn split_sentences(paragraph: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    for ch in paragraph.chars() {
        current.push(ch);
        if matches!(ch, '.' | '?' | '!') {
            out.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

/// Concatenate a sequence of WAV byte buffers into one, keeping the first
/// buffer's header and appending only subsequent buffers' data sections.
/// Assumes all inputs share the same format (sample rate/channels/bit depth),
/// which holds for chunks synthesized by the same voice in one call.
pub fn concat_wav(chunks: &[Vec<u8>]) -> Vec<u8> {
    match chunks.len() {
        0 => Vec::new(),
        1 => chunks[0].clone(),
        _ => {
            let mut out = chunks[0].clone();
            for chunk in &chunks[1..] {
                if chunk.len() > 44 {
                    out.extend_from_slice(&chunk[44..]);
                }
            }
            out
        }
    }
}

/// HTTP-backed synthesizer speaking to one of `DEFAULT_TTS_PROVIDER`'s
/// remote services (gpt-sovits / index-tts) — both expose a simple
/// text-in/WAV-out POST endpoint, so one client covers both.
pub struct HttpTtsProvider {
    client: reqwest::Client,
    base_url: String,
    provider_name: String,
}

impl HttpTtsProvider {
    pub fn new(base_url: impl Into<String>, provider_name: impl Into<String>) -> Self {
        Self { client: reqwest::Client::new(), base_url: base_url.into(), provider_name: provider_name.into() }
    }
}

#[derive(Serialize)]
struct SynthesizeRequest<'a> {
    text: &'a str,
    voice_reference: &'a str,
}

#[async_trait]
impl TtsProvider for HttpTtsProvider {
    fn name(&self) -> &str {
        &self.provider_name
    }

    async fn synthesize(&self, text: &str, voice_reference: &str) -> Result<Vec<u8>> {
        let chunks = split_for_synthesis(text);
        let mut wavs = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let url = format!("{}/synthesize", self.base_url.trim_end_matches('/'));
            let response = self
                .client
                .post(&url)
                .json(&SynthesizeRequest { text: &chunk, voice_reference })
                .send()
                .await?;
            if !response.status().is_success() {
                return Err(ProviderError::TtsUnavailable(format!(
                    "{} returned {}",
                    self.provider_name,
                    response.status()
                )));
            }
            wavs.push(response.bytes().await?.to_vec());
        }
        Ok(concat_wav(&wavs))
    }

    async fn list_voices(&self) -> Result<Vec<Voice>> {
        let url = format!("{}/voices", self.base_url.trim_end_matches('/'));
        let response = self.client.get(&url).send().await?;
        response
            .json::<Vec<Voice>>()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_long_paragraph_on_sentence_boundaries() {
        let text = "One sentence here. Another sentence follows! And a third one?";
        let chunks = split_for_synthesis(text);
        assert!(chunks.iter().all(|c| c.len() <= MAX_CHUNK_CHARS));
        assert_eq!(chunks.join(""), text);
    }

    #[test]
    fn short_text_is_single_chunk() {
        let chunks = split_for_synthesis("hi there");
        assert_eq!(chunks, vec!["hi there".to_string()]);
    }

    #[test]
    fn concat_wav_keeps_single_header() {
        let a = vec![0u8; 60];
        let b = vec![1u8; 60];
        let out = concat_wav(&[a.clone(), b.clone()]);
        assert_eq!(out.len(), 44 + 16 + 16);
        assert_eq!(&out[..44], &a[..44]);
    }
}
