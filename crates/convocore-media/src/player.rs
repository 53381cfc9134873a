use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use convocore_protocol::media::{MediaStatePayload, MediaStateValue, Track};
use convocore_tools::MediaHandle;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::resolver::TrackResolver;
use crate::stream::{encode_chunk, stream_url_chunked, StreamSink};

/// One user's media-player state: `{playing-state, current-track,
/// queue, volume}`. `generation` is bumped on every stop/skip/new-track so
/// an in-flight stream loop from a superseded track can tell it's stale and
/// quit without an explicit cancellation channel.
struct PlayerState {
    value: MediaStateValue,
    current_track: Option<Track>,
    queue: Vec<Track>,
    volume: f32,
    paused: bool,
    generation: u64,
}

impl PlayerState {
    fn new() -> Self {
        Self { value: MediaStateValue::Idle, current_track: None, queue: Vec::new(), volume: 1.0, paused: false, generation: 0 }
    }

    fn snapshot(&self) -> MediaStatePayload {
        MediaStatePayload { state: self.value, current_track: self.current_track.clone(), queue: self.queue.clone(), volume: self.volume }
    }
}

/// A single user's player. Created lazily on first `play`, discarded on
/// logout by whatever owns the `MediaManager`.
pub struct Player {
    client: reqwest::Client,
    resolver: Arc<dyn TrackResolver>,
    sink: Arc<dyn StreamSink>,
    state: Mutex<PlayerState>,
}

impl Player {
    pub fn new(resolver: Arc<dyn TrackResolver>, sink: Arc<dyn StreamSink>) -> Self {
        Self { client: reqwest::Client::new(), resolver, sink, state: Mutex::new(PlayerState::new()) }
    }

    pub async fn snapshot(&self) -> MediaStatePayload {
        self.state.lock().await.snapshot()
    }

    async fn emit_state(&self) {
        let snapshot = self.state.lock().await.snapshot();
        self.sink.emit_state(snapshot).await;
    }

    pub async fn play(&self, query: &str) -> Result<String, String> {
        let track = self.resolver.resolve(query).await.map_err(|e| e.to_string())?;
        let title = track.title.clone();
        self.begin_track(track).await;
        Ok(format!("now playing: {title}"))
    }

    pub async fn queue_add(&self, query: &str) -> Result<String, String> {
        let track = self.resolver.resolve(query).await.map_err(|e| e.to_string())?;
        let title = track.title.clone();
        let should_start = {
            let mut state = self.state.lock().await;
            let idle = state.value == MediaStateValue::Idle;
            state.queue.push(track.clone());
            idle
        };
        self.emit_state().await;
        if should_start {
            self.advance().await;
        }
        Ok(format!("queued: {title}"))
    }

    pub async fn queue_remove(&self, index: usize) -> Result<String, String> {
        let mut state = self.state.lock().await;
        if index >= state.queue.len() {
            return Err(format!("no track at index {index}"));
        }
        Ok(format!("removed: {}", state.queue.remove(index).title))
    }

    pub async fn pause(&self) -> Result<String, String> {
        {
            let mut state = self.state.lock().await;
            if state.value != MediaStateValue::Playing {
                return Err("nothing is playing".to_string());
            }
            state.paused = true;
            state.value = MediaStateValue::Paused;
        }
        self.emit_state().await;
        Ok("paused".to_string())
    }

    pub async fn resume(&self) -> Result<String, String> {
        {
            let mut state = self.state.lock().await;
            if state.value != MediaStateValue::Paused {
                return Err("nothing is paused".to_string());
            }
            state.paused = false;
            state.value = MediaStateValue::Playing;
        }
        self.emit_state().await;
        Ok("resumed".to_string())
    }

    pub async fn skip(&self) -> Result<String, String> {
        self.bump_generation().await;
        self.advance().await;
        Ok("skipped".to_string())
    }

    pub async fn stop(&self) -> Result<String, String> {
        self.bump_generation().await;
        {
            let mut state = self.state.lock().await;
            state.value = MediaStateValue::Idle;
            state.current_track = None;
            state.queue.clear();
        }
        self.emit_state().await;
        Ok("stopped".to_string())
    }

    pub async fn volume(&self, v: f32) -> Result<String, String> {
        let v = v.clamp(0.0, 1.0);
        self.state.lock().await.volume = v;
        self.emit_state().await;
        Ok(format!("volume set to {v:.2}"))
    }

    async fn bump_generation(&self) -> u64 {
        let mut state = self.state.lock().await;
        state.generation += 1;
        state.generation
    }

    /// Start `track` and keep playing whatever the queue yields next until
    /// the queue drains or a stop/skip bumps past this run's generation.
    /// A loop rather than mutual recursion with `advance` — each iteration
    /// plays one track to completion and then looks at the queue itself.
    async fn begin_track(&self, first: Track) {
        let mut track = first;
        loop {
            let generation = self.bump_generation().await;
            {
                let mut state = self.state.lock().await;
                state.current_track = Some(track.clone());
                state.value = MediaStateValue::Playing;
                state.paused = false;
            }
            self.emit_state().await;

            let mut chunk_index: u64 = 0;
            let result = stream_url_chunked(&self.client, &track.stream_url, |bytes, is_last| {
                let chunk_index_now = chunk_index;
                chunk_index += 1;
                async move {
                    loop {
                        let (current_generation, paused) = {
                            let state = self.state.lock().await;
                            (state.generation, state.paused)
                        };
                        if current_generation != generation {
                            return false;
                        }
                        if !paused {
                            break;
                        }
                        tokio::time::sleep(Duration::from_millis(200)).await;
                    }
                    self.sink.emit_chunk(encode_chunk(&bytes), chunk_index_now, is_last).await;
                    true
                }
            })
            .await;

            if let Err(e) = result {
                warn!(track = %track.title, error = %e, "media streaming failed");
                self.sink.emit_error(format!("playback failed: {e}")).await;
                return;
            }

            let next = {
                let mut state = self.state.lock().await;
                if state.generation != generation {
                    return; // superseded by a stop/skip/new play while we were streaming
                }
                if state.queue.is_empty() {
                    state.value = MediaStateValue::Idle;
                    state.current_track = None;
                    None
                } else {
                    Some(state.queue.remove(0))
                }
            };
            self.emit_state().await;

            match next {
                Some(t) => {
                    info!(track = %t.title, "auto-advancing to next queued track");
                    track = t;
                }
                None => return,
            }
        }
    }

    /// Pop the next queued track and start it, if any — used by `skip` (when
    /// nothing is left playing after bumping past the current track) and
    /// `queue_add` (when the player was idle).
    async fn advance(&self) {
        let next = {
            let mut state = self.state.lock().await;
            if state.queue.is_empty() {
                None
            } else {
                Some(state.queue.remove(0))
            }
        };
        if let Some(track) = next {
            self.begin_track(track).await;
        } else {
            self.emit_state().await;
        }
    }
}

#[async_trait]
impl MediaHandle for Player {
    async fn play(&self, query: &str) -> Result<String, String> {
        Player::play(self, query).await
    }

    async fn control(&self, action: &str) -> Result<String, String> {
        match action {
            "pause" => self.pause().await,
            "resume" => self.resume().await,
            "skip" => self.skip().await,
            "stop" => self.stop().await,
            other => Err(format!("unknown action: {other}")),
        }
    }

    async fn queue_snapshot(&self) -> String {
        let payload = self.snapshot().await;
        serde_json::to_string(&payload).unwrap_or_else(|_| "{}".to_string())
    }
}
