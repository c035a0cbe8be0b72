use crate::relay::Relay;
use crate::session::SessionId;
use relay_shared::protocol::Payload;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Commands from client connections to the relay loop
pub enum RelayCommand {
    Connect {
        outbox: mpsc::Sender<Payload>,
        response: oneshot::Sender<SessionId>,
    },
    Message {
        from: SessionId,
        payload: Payload,
    },
    Disconnect {
        id: SessionId,
    },
}

/// Run the relay loop. Owns the session registry; commands are applied one
/// at a time so registry changes never interleave with a broadcast.
pub async fn run_relay_loop(mut cmd_rx: mpsc::Receiver<RelayCommand>, mut relay: Relay) {
    while let Some(cmd) = cmd_rx.recv().await {
        match cmd {
            RelayCommand::Connect { outbox, response } => {
                let id = relay.on_connect(outbox);
                if response.send(id).is_err() {
                    // Connection went away before it learned its id
                    relay.on_disconnect(id);
                    continue;
                }
                tracing::debug!("Session {} registered ({} open)", id, relay.session_count());
            }
            RelayCommand::Message { from, payload } => {
                let report = relay.on_message(from, &payload);
                tracing::trace!(
                    "Session {} message relayed to {}/{} peers",
                    from,
                    report.delivered,
                    report.targets()
                );
            }
            RelayCommand::Disconnect { id } => {
                if relay.on_disconnect(id) {
                    tracing::debug!("Session {} removed ({} open)", id, relay.session_count());
                }
            }
        }
    }

    tracing::info!("Relay loop ended");
}

/// Cloneable front door to the relay loop, one per connection task.
#[derive(Clone)]
pub struct RelayHandle {
    cmd_tx: mpsc::Sender<RelayCommand>,
}

impl RelayHandle {
    pub fn new(cmd_tx: mpsc::Sender<RelayCommand>) -> Self {
        Self { cmd_tx }
    }

    /// Register a session. `None` means the relay loop has stopped.
    pub async fn connect(&self, outbox: mpsc::Sender<Payload>) -> Option<SessionId> {
        let (response, resp_rx) = oneshot::channel();
        self.cmd_tx
            .send(RelayCommand::Connect { outbox, response })
            .await
            .ok()?;
        resp_rx.await.ok()
    }

    /// Queue a payload for broadcast. Returns false if the relay loop has stopped.
    pub async fn message(&self, from: SessionId, payload: Payload) -> bool {
        self.cmd_tx
            .send(RelayCommand::Message { from, payload })
            .await
            .is_ok()
    }

    pub async fn disconnect(&self, id: SessionId) -> bool {
        self.cmd_tx
            .send(RelayCommand::Disconnect { id })
            .await
            .is_ok()
    }
}

/// Spawn the relay loop with an empty registry.
pub fn spawn_relay(command_queue_capacity: usize) -> (RelayHandle, JoinHandle<()>) {
    let (cmd_tx, cmd_rx) = mpsc::channel(command_queue_capacity);
    let task = tokio::spawn(run_relay_loop(cmd_rx, Relay::new()));
    (RelayHandle::new(cmd_tx), task)
}
