use std::fmt;

use relay_shared::protocol::Payload;
use tokio::sync::mpsc::{self, error::TrySendError};

/// Identifier of one realtime connection. Never reused within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outcome of handing one payload to one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    /// Outbox at capacity; the payload was dropped for this session only.
    Full,
    /// The connection task is gone; the session is waiting to be removed.
    Closed,
}

/// A registered session as seen by the relay.
#[derive(Debug)]
pub struct Session {
    pub id: SessionId,
    outbox: mpsc::Sender<Payload>,
}

impl Session {
    pub fn new(id: SessionId, outbox: mpsc::Sender<Payload>) -> Self {
        Self { id, outbox }
    }

    /// Queue `payload` for the connection without waiting.
    pub fn deliver(&self, payload: Payload) -> Delivery {
        match self.outbox.try_send(payload) {
            Ok(()) => Delivery::Delivered,
            Err(TrySendError::Full(_)) => Delivery::Full,
            Err(TrySendError::Closed(_)) => Delivery::Closed,
        }
    }

    pub fn is_open(&self) -> bool {
        !self.outbox.is_closed()
    }
}
