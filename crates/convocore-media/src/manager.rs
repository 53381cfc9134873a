use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::info;

use crate::player::Player;
use crate::resolver::TrackResolver;
use crate::stream::StreamSink;

/// Owns every active user's `Player`, created lazily on first `media_play`
/// and dropped on logout — the same per-id `HashMap` manager shape this
/// codebase uses for per-user stateful sessions elsewhere, here keyed by
/// user id instead of a terminal session id.
pub struct MediaManager {
    resolver: Arc<dyn TrackResolver>,
    players: Mutex<HashMap<String, Arc<Player>>>,
}

impl MediaManager {
    pub fn new(resolver: Arc<dyn TrackResolver>) -> Self {
        Self { resolver, players: Mutex::new(HashMap::new()) }
    }

    /// Get this user's player, creating it if this is their first media call.
    pub async fn get_or_create(&self, user_id: &str, sink: Arc<dyn StreamSink>) -> Arc<Player> {
        let mut players = self.players.lock().await;
        players
            .entry(user_id.to_string())
            .or_insert_with(|| {
                info!(user_id, "creating media player");
                Arc::new(Player::new(self.resolver.clone(), sink))
            })
            .clone()
    }

    pub async fn get(&self, user_id: &str) -> Option<Arc<Player>> {
        self.players.lock().await.get(user_id).cloned()
    }

    /// Discard this user's player on logout. In-flight streaming
    /// tasks hold their own `Arc<Player>` clone and finish naturally; they
    /// just won't be reachable for new commands afterward.
    pub async fn discard(&self, user_id: &str) {
        if self.players.lock().await.remove(user_id).is_some() {
            info!(user_id, "discarded media player on logout");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use convocore_protocol::media::{MediaStatePayload, Track};
    use crate::resolver::ResolveError;

    struct StubResolver;
    #[async_trait]
    impl TrackResolver for StubResolver {
        async fn resolve(&self, query: &str) -> Result<Track, ResolveError> {
            Ok(Track { title: query.to_string(), stream_url: "http://example.invalid/stream".into(), duration_secs: None, artist: None })
        }
    }

    struct NoopSink;
    #[async_trait]
    impl StreamSink for NoopSink {
        async fn emit_chunk(&self, _data: String, _chunk_index: u64, _is_last: bool) {}
        async fn emit_state(&self, _state: MediaStatePayload) {}
        async fn emit_error(&self, _error: String) {}
    }

    #[tokio::test]
    async fn same_user_gets_same_player_instance() {
        let manager = MediaManager::new(Arc::new(StubResolver));
        let p1 = manager.get_or_create("u1", Arc::new(NoopSink)).await;
        let p2 = manager.get_or_create("u1", Arc::new(NoopSink)).await;
        assert!(Arc::ptr_eq(&p1, &p2));
    }

    #[tokio::test]
    async fn discard_removes_the_player() {
        let manager = MediaManager::new(Arc::new(StubResolver));
        manager.get_or_create("u1", Arc::new(NoopSink)).await;
        manager.discard("u1").await;
        assert!(manager.get("u1").await.is_none());
    }
}
