pub mod detector;
pub mod embedding;
pub mod manager;
pub mod pipeline;
pub mod remote;

pub use detector::{DetectedFace, FaceDetector, GestureDetector};
pub use embedding::{cosine_similarity, EmbeddingCache, KnownEmbedding};
pub use manager::VisionManager;
pub use pipeline::{VisionSession, FACE_MATCH_THRESHOLD};
pub use remote::{HttpFaceDetector, HttpGestureDetector};
