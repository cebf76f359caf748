use gosight_model::AlertEvent;
use tokio::sync::{broadcast, mpsc};
use tracing::warn;

/// Fan-out seam for alert events. Sends never block: the manager emits while
/// holding its state lock, so a slow subscriber only loses its own backlog.
#[derive(Clone)]
pub struct AlertEmitter {
    tx: broadcast::Sender<AlertEvent>,
}

impl AlertEmitter {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AlertEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: AlertEvent) {
        // No subscribers is a valid steady state.
        let _ = self.tx.send(event);
    }
}

impl Default for AlertEmitter {
    fn default() -> Self {
        Self::new(256)
    }
}

/// Handle to the notification pipeline. Bounded; a full queue drops the
/// event with a warning rather than stalling alert handling.
#[derive(Clone)]
pub struct AlertDispatcher {
    tx: mpsc::Sender<AlertEvent>,
}

impl AlertDispatcher {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<AlertEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    pub fn dispatch(&self, event: AlertEvent) {
        if let Err(err) = self.tx.try_send(event) {
            warn!(error = %err, "notification queue full; dropping alert dispatch");
        }
    }
}
