use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use convocore_protocol::media::MediaStatePayload;
use futures_util::StreamExt;

pub const MEDIA_CHUNK_BYTES: usize = 32 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("stream source request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Output side of a playing track — implemented by the gateway connection
/// that owns this user's WS to forward `media_chunk`/`media_state`/
/// `media_error` events.
#[async_trait]
pub trait StreamSink: Send + Sync {
    async fn emit_chunk(&self, data: String, chunk_index: u64, is_last: bool);
    async fn emit_state(&self, state: MediaStatePayload);
    async fn emit_error(&self, error: String);
}

/// Fetch `url` and split its bytes into `MEDIA_CHUNK_BYTES` base64 frames,
/// calling `on_chunk` per frame between reads so the caller can check a
/// cooperative pause/stop flag. `on_chunk` returns `false` to stop
/// streaming early.
pub async fn stream_url_chunked<F, Fut>(client: &reqwest::Client, url: &str, mut on_chunk: F) -> Result<(), StreamError>
where
    F: FnMut(Vec<u8>, bool) -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let response = client.get(url).send().await?;
    let mut byte_stream = response.bytes_stream();
    let mut buf: Vec<u8> = Vec::with_capacity(MEDIA_CHUNK_BYTES);

    while let Some(chunk) = byte_stream.next().await {
        let chunk = chunk?;
        buf.extend_from_slice(&chunk);
        while buf.len() >= MEDIA_CHUNK_BYTES {
            let rest = buf.split_off(MEDIA_CHUNK_BYTES);
            let ready = std::mem::replace(&mut buf, rest);
            if !on_chunk(ready, false).await {
                return Ok(());
            }
        }
    }
    on_chunk(buf, true).await;
    Ok(())
}

pub fn encode_chunk(bytes: &[u8]) -> String {
    BASE64.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_to_valid_base64() {
        let encoded = encode_chunk(b"hello");
        assert_eq!(encoded, "aGVsbG8=");
    }
}
