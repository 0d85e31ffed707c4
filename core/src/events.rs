use inventory_api::Host;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

/// Host lifecycle notification delivered by a watch source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    Added(Host),
    Removed(Host),
}

/// Small fan-out bus between the host watch and the cleanup loops.
pub struct EventBus {
    subscribers: Vec<UnboundedSender<HostEvent>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            subscribers: Vec::new(),
        }
    }

    /// Subscribe to host events, returning a receiver for them.
    pub fn subscribe(&mut self) -> UnboundedReceiver<HostEvent> {
        let (tx, rx) = unbounded_channel();
        self.subscribers.push(tx);
        rx
    }

    /// Publish an event to every live subscriber; closed ones are dropped.
    pub fn publish(&mut self, event: HostEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
