//! # Event bus for broadcasting monitor events.
//!
//! [`EventBus`] is a thin wrapper around [`tokio::sync::broadcast`] that provides
//! non-blocking event publishing from the detector, the orchestrator and the runtime.
//!
//! ## Architecture
//! ```text
//! Publishers:                      Receivers:
//!   Detector     ──┐           ┌──► Orchestrator (StateChanged, Acknowledged)
//!   Orchestrator ──┼─► EventBus ┼──► Detector     (ActionIssued, Acknowledged)
//!   Monitor      ──┤           ├──► Collector    (StateChanged → health mirror)
//!   SubscriberSet──┘           └──► subscriber_listener ──► SubscriberSet
//! ```
//!
//! ## Rules
//! - **Non-blocking publish**: `publish()` never blocks; it calls `broadcast::Sender::send`.
//! - **Bounded capacity**: a single ring buffer stores recent events for all receivers.
//! - **Lag handling**: slow receivers get `RecvError::Lagged(n)` and skip `n` oldest items.
//! - **No persistence**: events are lost if there are no active receivers at send time,
//!   so components subscribe before they are spawned.

use tokio::sync::broadcast;

use super::event::MonitorEvent;

/// Broadcast channel for monitor events.
///
/// Cheap to clone (internally holds an `Arc`-backed sender).
#[derive(Clone, Debug)]
pub struct EventBus {
    tx: broadcast::Sender<MonitorEvent>,
}

impl EventBus {
    /// Creates a new bus with the given channel capacity.
    ///
    /// Capacity is **shared** across all receivers; the minimum is 1 (clamped).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, _rx) = broadcast::channel::<MonitorEvent>(capacity);
        Self { tx }
    }

    /// Publishes an event to all active receivers.
    ///
    /// If there are no receivers, the event is dropped.
    pub fn publish(&self, ev: MonitorEvent) {
        let _ = self.tx.send(ev);
    }

    /// Creates a new receiver that will observe subsequent events.
    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.tx.subscribe()
    }

    /// Number of live receivers.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;

    #[tokio::test]
    async fn receivers_see_events_sent_after_subscribing() {
        let bus = EventBus::new(0);
        bus.publish(MonitorEvent::new(EventKind::ShutdownRequested));

        let mut rx = bus.subscribe();
        bus.publish(MonitorEvent::new(EventKind::AllStoppedWithin));
        assert_eq!(rx.recv().await.unwrap().kind, EventKind::AllStoppedWithin);
        assert_eq!(bus.receiver_count(), 1);
    }
}
