//! The single broadcast group every live connection joins.

use slotgate_events::ServerEvent;
use tokio::sync::broadcast;
use tracing::debug;

/// Events buffered per receiver before a slow connection starts lagging.
pub const DEFAULT_GROUP_CAPACITY: usize = 256;

/// Fan-out of slot changes to every connected observer.
#[derive(Clone)]
pub struct BroadcastGroup {
    tx: broadcast::Sender<ServerEvent>,
}

impl BroadcastGroup {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Joins the group. Membership ends when the receiver is dropped.
    pub fn join(&self) -> broadcast::Receiver<ServerEvent> {
        self.tx.subscribe()
    }

    /// Sends `event` to every member. Returns how many members it reached;
    /// an empty group is not an error.
    pub fn publish(&self, event: ServerEvent) -> usize {
        let name = event.name();
        match self.tx.send(event) {
            Ok(reached) => {
                debug!(event = name, reached, "Broadcast sent");
                reached
            }
            Err(_) => 0,
        }
    }

    pub fn member_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for BroadcastGroup {
    fn default() -> Self {
        Self::new(DEFAULT_GROUP_CAPACITY)
    }
}
