use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaceResult {
    /// `None` when the embedding matched no known identity above threshold.
    pub name: Option<String>,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

/// Wire payload for a `vision_result` server event. Never carries image bytes.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct VisionResultPayload {
    pub faces: Vec<FaceResult>,
    pub gestures: Vec<String>,
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self { x: 0.0, y: 0.0, width: 0.0, height: 0.0 }
    }
}
