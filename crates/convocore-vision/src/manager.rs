use std::sync::Arc;

use convocore_storage::StorageGateway;
use dashmap::DashMap;

use crate::detector::{FaceDetector, GestureDetector};
use crate::embedding::{EmbeddingCache, KnownEmbedding};
use crate::pipeline::VisionSession;

/// Owns one `VisionSession` per connection, keyed by connection id. Lookup
/// and insert/remove are the only operations held under the map's lock —
/// frame processing itself runs against the session `Arc` outside any lock,
/// the same snapshot-read discipline `convocore-providers`' MCP tool cache
/// uses.
pub struct VisionManager {
    face_detector: Arc<dyn FaceDetector>,
    gesture_detector: Arc<dyn GestureDetector>,
    storage: Arc<StorageGateway>,
    sessions: DashMap<String, Arc<VisionSession>>,
}

impl VisionManager {
    pub fn new(face_detector: Arc<dyn FaceDetector>, gesture_detector: Arc<dyn GestureDetector>, storage: Arc<StorageGateway>) -> Self {
        Self { face_detector, gesture_detector, storage, sessions: DashMap::new() }
    }

    /// Start a vision session for this connection, loading the user's known
    /// face embeddings once up front.
    pub fn start(&self, conn_id: &str, user_id: &str, enable_face: bool, enable_gesture: bool) -> convocore_storage::Result<()> {
        let known = self
            .storage
            .list_face_embeddings(user_id)?
            .into_iter()
            .flat_map(|(identity, photos)| {
                photos.into_iter().map(move |photo| KnownEmbedding { identity_name: identity.name.clone(), vector: photo.embedding })
            })
            .collect();

        let session = Arc::new(VisionSession::new(self.face_detector.clone(), self.gesture_detector.clone(), EmbeddingCache::new(known)));
        session.set_enabled(enable_face, enable_gesture);
        self.sessions.insert(conn_id.to_string(), session);
        Ok(())
    }

    pub fn get(&self, conn_id: &str) -> Option<Arc<VisionSession>> {
        self.sessions.get(conn_id).map(|entry| entry.clone())
    }

    pub fn stop(&self, conn_id: &str) {
        self.sessions.remove(conn_id);
    }
}
