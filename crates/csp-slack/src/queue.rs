//! Serialized hand-off between the Slack transports and the event worker.
//!
//! Socket Mode and webhook handlers publish; exactly one worker consumes.
//! Events are processed in arrival order, one at a time.

use tokio::sync::mpsc;

use crate::events::SlackEvent;

/// Bounded FIFO of inbound events.
pub struct EventQueue {
    tx: mpsc::Sender<SlackEvent>,
    rx: tokio::sync::Mutex<mpsc::Receiver<SlackEvent>>,
}

impl EventQueue {
    /// Create a queue with the given buffer capacity.
    pub fn new(buffer_size: usize) -> Self {
        let (tx, rx) = mpsc::channel(buffer_size);
        EventQueue {
            tx,
            rx: tokio::sync::Mutex::new(rx),
        }
    }

    /// Enqueue an event (waits while the buffer is full).
    pub async fn publish(&self, event: SlackEvent) -> Result<(), mpsc::error::SendError<SlackEvent>> {
        self.tx.send(event).await
    }

    /// Next event in arrival order. `None` once every sender is dropped.
    pub async fn consume(&self) -> Option<SlackEvent> {
        let mut rx = self.rx.lock().await;
        rx.recv().await
    }

    /// A sender handle for a transport task.
    pub fn sender(&self) -> mpsc::Sender<SlackEvent> {
        self.tx.clone()
    }
}
