use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaStateValue {
    Idle,
    Playing,
    Paused,
}

/// A resolved playable track, as returned by the external media index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Track {
    pub title: String,
    pub stream_url: String,
    pub duration_secs: Option<u32>,
    pub artist: Option<String>,
}

/// Wire payload for a `media_state` server event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaStatePayload {
    pub state: MediaStateValue,
    pub current_track: Option<Track>,
    pub queue: Vec<Track>,
    pub volume: f32,
}
