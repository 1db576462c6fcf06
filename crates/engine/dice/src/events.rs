use crate::ledger::{GroupResult, RemovedDie, RollResult};
use tokio::sync::broadcast;

/// Notifications published by a [`DiceBox`](crate::DiceBox)
#[derive(Debug, Clone, PartialEq)]
pub enum DiceEvent {
    /// One die was read
    DieComplete(RollResult),
    /// Every die on the board has settled
    RollComplete(Vec<GroupResult>),
    /// One die left the board
    RemoveComplete(RemovedDie),
    /// A theme finished loading
    ThemeLoaded(String),
}

/// Thin wrapper around a broadcast channel; publishing with no subscribers
/// is not an error.
#[derive(Clone)]
pub struct EventHub {
    sender: broadcast::Sender<DiceEvent>,
}

impl EventHub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DiceEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: DiceEvent) {
        let _ = self.sender.send(event);
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new(256)
    }
}
