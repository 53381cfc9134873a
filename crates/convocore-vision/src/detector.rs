use async_trait::async_trait;
use convocore_protocol::vision::BoundingBox;

/// One detected face before identity matching — the detector only localizes
/// and embeds, `VisionSession` does the embedding-cache lookup.
pub struct DetectedFace {
    pub bbox: BoundingBox,
    pub embedding: Vec<f32>,
}

#[async_trait]
pub trait FaceDetector: Send + Sync {
    async fn detect(&self, jpeg_bytes: &[u8]) -> Result<Vec<DetectedFace>, String>;
}

#[async_trait]
pub trait GestureDetector: Send + Sync {
    async fn detect(&self, jpeg_bytes: &[u8]) -> Result<Vec<String>, String>;
}
