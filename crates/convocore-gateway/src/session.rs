use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use convocore_protocol::events::ServerEvent;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Outbound events produced while no connection is attached (the gap between
/// a disconnect and the client's reconnect). Bounded, drop-oldest above the
/// high-water mark — except `VisionResult`, which is never buffered: a stale
/// vision frame's result is worthless by the time it could be delivered,
/// the same reasoning the vision pipeline uses to drop frames in flight.
const OUTBOUND_QUEUE_CAPACITY: usize = 256;

pub struct OutboundQueue {
    buffer: Mutex<VecDeque<ServerEvent>>,
}

impl OutboundQueue {
    fn new() -> Self {
        Self { buffer: Mutex::new(VecDeque::new()) }
    }

    fn push(&self, event: ServerEvent) {
        if matches!(event, ServerEvent::VisionResult(_)) {
            return;
        }
        let mut buf = self.buffer.lock().unwrap();
        if buf.len() >= OUTBOUND_QUEUE_CAPACITY {
            buf.pop_front();
        }
        buf.push_back(event);
    }

    pub fn drain(&self) -> Vec<ServerEvent> {
        std::mem::take(&mut *self.buffer.lock().unwrap()).into_iter().collect()
    }
}

/// One user's logical session — survives reconnects. The `sender`
/// half is swapped on every (re)connect; `superseded` is cancelled and
/// replaced with a fresh token on every reconnect, so the connection being
/// kicked off observes cancellation while the new connection gets its own
/// token to watch.
pub struct ActiveSession {
    pub user_id: String,
    pub conn_id: Mutex<String>,
    sender: Mutex<Option<mpsc::Sender<ServerEvent>>>,
    pub outbound: OutboundQueue,
    superseded: Mutex<CancellationToken>,
    pub turn_cancel: Mutex<CancellationToken>,
    pub chat_active: AtomicBool,
    pub conversation_id: Mutex<Option<String>>,
    pub vision_enabled: AtomicBool,
}

impl ActiveSession {
    fn new(user_id: String, conn_id: String, sender: mpsc::Sender<ServerEvent>) -> Self {
        Self {
            user_id,
            conn_id: Mutex::new(conn_id),
            sender: Mutex::new(Some(sender)),
            outbound: OutboundQueue::new(),
            superseded: Mutex::new(CancellationToken::new()),
            turn_cancel: Mutex::new(CancellationToken::new()),
            chat_active: AtomicBool::new(false),
            conversation_id: Mutex::new(None),
            vision_enabled: AtomicBool::new(false),
        }
    }

    /// Cancel the token the currently-attached connection is watching and
    /// install a fresh one, so the new connection that is about to
    /// `reattach` doesn't see itself as already superseded.
    fn supersede(&self) {
        let mut token = self.superseded.lock().unwrap();
        token.cancel();
        *token = CancellationToken::new();
    }

    /// Snapshot of the token the currently-attached connection should watch
    /// to learn it has been replaced by a reconnect. Captured once per
    /// connection right after it attaches, not re-read live, so a later
    /// `supersede()` cancelling a *different* connection's token can't also
    /// cancel this one's.
    pub fn superseded_token(&self) -> CancellationToken {
        self.superseded.lock().unwrap().clone()
    }

    /// Attach a freshly (re)connected channel to this existing logical
    /// session, replacing whichever sender served the previous connection.
    fn reattach(&self, conn_id: String, sender: mpsc::Sender<ServerEvent>) {
        *self.conn_id.lock().unwrap() = conn_id;
        *self.sender.lock().unwrap() = Some(sender);
    }

    /// Detach the live channel without dropping the logical session — called
    /// when a connection ends on its own (not superseded). Subsequent events
    /// fall into the outbound queue until a reconnect reattaches.
    fn detach(&self) {
        *self.sender.lock().unwrap() = None;
    }

    /// Send an event to the attached connection if one exists and has room;
    /// otherwise buffer it (except `VisionResult`, see `OutboundQueue::push`).
    pub fn emit(&self, event: ServerEvent) {
        let sender = self.sender.lock().unwrap().clone();
        match sender {
            Some(tx) => {
                if tx.try_send(event.clone()).is_err() {
                    self.outbound.push(event);
                }
            }
            None => self.outbound.push(event),
        }
    }

    pub fn current_turn_cancel(&self) -> CancellationToken {
        self.turn_cancel.lock().unwrap().clone()
    }

    pub fn start_new_turn(&self) -> CancellationToken {
        let token = CancellationToken::new();
        *self.turn_cancel.lock().unwrap() = token.clone();
        token
    }
}

/// Per-user registry of logical sessions. Replacing an entry for a
/// user already present cancels the prior connection's `superseded` token —
/// the old physical channel is closed, the logical session (frame state,
/// media player, outbound queue) carries over untouched.
pub struct SessionRegistry {
    sessions: DashMap<String, Arc<ActiveSession>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self { sessions: DashMap::new() }
    }

    /// Attach a connection for `user_id`, creating the logical session if
    /// this is the user's first connect, or reattaching (and superseding any
    /// prior connection) otherwise.
    pub fn connect(&self, user_id: &str, conn_id: String, sender: mpsc::Sender<ServerEvent>) -> Arc<ActiveSession> {
        if let Some(existing) = self.sessions.get(user_id) {
            info!(user_id, "superseding prior connection");
            existing.supersede();
            existing.reattach(conn_id, sender);
            return existing.clone();
        }
        let session = Arc::new(ActiveSession::new(user_id.to_string(), conn_id, sender));
        self.sessions.insert(user_id.to_string(), session.clone());
        session
    }

    /// Called when a connection task ends. Only detaches the live channel if
    /// this connection is still the one attached — a connection that was
    /// superseded must not clobber the newer one's state on its own cleanup.
    pub fn disconnect(&self, user_id: &str, conn_id: &str) {
        if let Some(session) = self.sessions.get(user_id) {
            if *session.conn_id.lock().unwrap() == conn_id {
                session.detach();
            }
        }
    }

    pub fn get(&self, user_id: &str) -> Option<Arc<ActiveSession>> {
        self.sessions.get(user_id).map(|entry| entry.clone())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
