use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;

use crate::detector::{DetectedFace, FaceDetector, GestureDetector};
use convocore_protocol::vision::BoundingBox;

/// Calls an external inference service over HTTP, the same shape as
/// `convocore_media::resolver::HttpTrackResolver` and
/// `convocore_providers::llm::HttpLlmProvider` — this core does not itself
/// run face or gesture models, it proxies frames to whatever service is
/// configured and reshapes the response.
pub struct HttpFaceDetector {
    client: reqwest::Client,
    base_url: String,
}

impl HttpFaceDetector {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { client: reqwest::Client::new(), base_url: base_url.into() }
    }
}

#[derive(Deserialize)]
struct FaceDetectResponse {
    faces: Vec<FaceDetectEntry>,
}

#[derive(Deserialize)]
struct FaceDetectEntry {
    bbox: BoundingBox,
    embedding: Vec<f32>,
}

#[async_trait]
impl FaceDetector for HttpFaceDetector {
    async fn detect(&self, jpeg_bytes: &[u8]) -> Result<Vec<DetectedFace>, String> {
        let url = format!("{}/detect/face", self.base_url.trim_end_matches('/'));
        let body = serde_json::json!({ "jpeg_base64": base64::engine::general_purpose::STANDARD.encode(jpeg_bytes) });
        let resp: FaceDetectResponse = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| e.to_string())?
            .error_for_status()
            .map_err(|e| e.to_string())?
            .json()
            .await
            .map_err(|e| e.to_string())?;
        Ok(resp.faces.into_iter().map(|f| DetectedFace { bbox: f.bbox, embedding: f.embedding }).collect())
    }
}

pub struct HttpGestureDetector {
    client: reqwest::Client,
    base_url: String,
}

impl HttpGestureDetector {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { client: reqwest::Client::new(), base_url: base_url.into() }
    }
}

#[derive(Deserialize)]
struct GestureDetectResponse {
    gestures: Vec<String>,
}

#[async_trait]
impl GestureDetector for HttpGestureDetector {
    async fn detect(&self, jpeg_bytes: &[u8]) -> Result<Vec<String>, String> {
        let url = format!("{}/detect/gesture", self.base_url.trim_end_matches('/'));
        let body = serde_json::json!({ "jpeg_base64": base64::engine::general_purpose::STANDARD.encode(jpeg_bytes) });
        let resp: GestureDetectResponse = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| e.to_string())?
            .error_for_status()
            .map_err(|e| e.to_string())?
            .json()
            .await
            .map_err(|e| e.to_string())?;
        Ok(resp.gestures)
    }
}
