use crate::session::{Delivery, Session, SessionId};
use relay_shared::protocol::Payload;
use std::collections::HashMap;
use tokio::sync::mpsc;

/// Per-broadcast delivery tally. Never reported back to the sender.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub dropped_full: usize,
    pub dropped_closed: usize,
}

impl BroadcastReport {
    pub fn targets(&self) -> usize {
        self.delivered + self.dropped_full + self.dropped_closed
    }
}

/// Session registry and fan-out. Owned by the relay loop task.
pub struct Relay {
    sessions: HashMap<SessionId, Session>,
    next_session_id: u64,
}

impl Relay {
    pub fn new() -> Self {
        Self {
            sessions: HashMap::new(),
            next_session_id: 1,
        }
    }

    /// Register a new session whose outbound payloads go to `outbox`.
    pub fn on_connect(&mut self, outbox: mpsc::Sender<Payload>) -> SessionId {
        let id = SessionId::new(self.next_session_id);
        self.next_session_id += 1;
        self.sessions.insert(id, Session::new(id, outbox));
        id
    }

    /// Deliver `payload` to every registered session except `from`.
    ///
    /// Each peer gets a clone of the same buffer. A peer whose outbox is full
    /// or closed misses this payload; the rest are unaffected.
    pub fn on_message(&self, from: SessionId, payload: &Payload) -> BroadcastReport {
        let mut report = BroadcastReport::default();
        for session in self.sessions.values().filter(|s| s.id != from) {
            match session.deliver(payload.clone()) {
                Delivery::Delivered => report.delivered += 1,
                Delivery::Full => {
                    tracing::warn!(
                        "Session {} outbox full, dropping message from {}",
                        session.id,
                        from
                    );
                    report.dropped_full += 1;
                }
                Delivery::Closed => report.dropped_closed += 1,
            }
        }
        report
    }

    /// Remove a session. Returns false if it was not registered.
    pub fn on_disconnect(&mut self, id: SessionId) -> bool {
        self.sessions.remove(&id).is_some()
    }

    pub fn contains(&self, id: SessionId) -> bool {
        self.sessions.contains_key(&id)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

impl Default for Relay {
    fn default() -> Self {
        Self::new()
    }
}
