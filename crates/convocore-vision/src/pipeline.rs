use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use convocore_protocol::vision::{FaceResult, VisionResultPayload};
use tracing::warn;

use crate::detector::{FaceDetector, GestureDetector};
use crate::embedding::EmbeddingCache;

pub const FACE_MATCH_THRESHOLD: f32 = 0.6;

/// One connection's vision processing state. Frames that arrive while
/// `in_flight` is set are dropped rather than queued — backpressure, not
/// buffering, since a stale frame is worthless once a newer one has arrived.
pub struct VisionSession {
    face_detector: Arc<dyn FaceDetector>,
    gesture_detector: Arc<dyn GestureDetector>,
    known_faces: EmbeddingCache,
    enable_face: AtomicBool,
    enable_gesture: AtomicBool,
    in_flight: AtomicBool,
}

impl VisionSession {
    pub fn new(face_detector: Arc<dyn FaceDetector>, gesture_detector: Arc<dyn GestureDetector>, known_faces: EmbeddingCache) -> Self {
        Self {
            face_detector,
            gesture_detector,
            known_faces,
            enable_face: AtomicBool::new(false),
            enable_gesture: AtomicBool::new(false),
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn set_enabled(&self, enable_face: bool, enable_gesture: bool) {
        self.enable_face.store(enable_face, Ordering::SeqCst);
        self.enable_gesture.store(enable_gesture, Ordering::SeqCst);
    }

    pub fn disable_all(&self) {
        self.enable_face.store(false, Ordering::SeqCst);
        self.enable_gesture.store(false, Ordering::SeqCst);
    }

    /// Process one incoming base64 JPEG frame, or silently drop it if a
    /// previous frame is still being processed. Returns `None` on drop.
    pub async fn process_frame(&self, base64_jpeg: &str) -> Option<VisionResultPayload> {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            return None;
        }
        let result = self.process_frame_inner(base64_jpeg).await;
        self.in_flight.store(false, Ordering::SeqCst);
        Some(result)
    }

    async fn process_frame_inner(&self, base64_jpeg: &str) -> VisionResultPayload {
        let bytes = match BASE64.decode(base64_jpeg) {
            Ok(b) => b,
            Err(e) => {
                warn!(error = %e, "failed to decode vision frame");
                return VisionResultPayload::default();
            }
        };

        let mut payload = VisionResultPayload::default();

        if self.enable_face.load(Ordering::SeqCst) {
            match self.face_detector.detect(&bytes).await {
                Ok(faces) => {
                    payload.faces = faces
                        .into_iter()
                        .map(|f| {
                            let matched = self.known_faces.best_match(&f.embedding, FACE_MATCH_THRESHOLD);
                            let (name, confidence) = match matched {
                                Some((name, score)) => (Some(name.to_string()), score),
                                None => (None, 0.0),
                            };
                            FaceResult { name, confidence, bbox: f.bbox }
                        })
                        .collect();
                }
                Err(e) => warn!(error = %e, "face detection failed"),
            }
        }

        if self.enable_gesture.load(Ordering::SeqCst) {
            match self.gesture_detector.detect(&bytes).await {
                Ok(gestures) => payload.gestures = gestures,
                Err(e) => warn!(error = %e, "gesture detection failed"),
            }
        }

        payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::KnownEmbedding;
    use async_trait::async_trait;
    use convocore_protocol::vision::BoundingBox;
    use crate::detector::DetectedFace;

    struct OneFaceDetector;
    #[async_trait]
    impl FaceDetector for OneFaceDetector {
        async fn detect(&self, _jpeg_bytes: &[u8]) -> Result<Vec<DetectedFace>, String> {
            Ok(vec![DetectedFace { bbox: BoundingBox::default(), embedding: vec![1.0, 0.0] }])
        }
    }

    struct NoGestures;
    #[async_trait]
    impl GestureDetector for NoGestures {
        async fn detect(&self, _jpeg_bytes: &[u8]) -> Result<Vec<String>, String> {
            Ok(vec![])
        }
    }

    fn b64(bytes: &[u8]) -> String {
        BASE64.encode(bytes)
    }

    #[tokio::test]
    async fn disabled_session_returns_empty_payload() {
        let session = VisionSession::new(Arc::new(OneFaceDetector), Arc::new(NoGestures), EmbeddingCache::new(vec![]));
        let result = session.process_frame(&b64(b"jpeg")).await.unwrap();
        assert!(result.faces.is_empty());
    }

    #[tokio::test]
    async fn enabled_session_matches_known_face() {
        let cache = EmbeddingCache::new(vec![KnownEmbedding { identity_name: "Alice".into(), vector: vec![1.0, 0.0] }]);
        let session = VisionSession::new(Arc::new(OneFaceDetector), Arc::new(NoGestures), cache);
        session.set_enabled(true, false);
        let result = session.process_frame(&b64(b"jpeg")).await.unwrap();
        assert_eq!(result.faces.len(), 1);
        assert_eq!(result.faces[0].name.as_deref(), Some("Alice"));
    }

    #[tokio::test]
    async fn concurrent_frame_is_dropped_while_one_is_in_flight() {
        let session = Arc::new(VisionSession::new(Arc::new(OneFaceDetector), Arc::new(NoGestures), EmbeddingCache::new(vec![])));
        session.in_flight.store(true, Ordering::SeqCst);
        let result = session.process_frame(&b64(b"jpeg")).await;
        assert!(result.is_none());
    }
}
