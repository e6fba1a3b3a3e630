//! # Event bus for broadcasting runtime events.
//!
//! [`Bus`] wraps [`tokio::sync::broadcast`] so the gate, the run loop and the idle
//! timer can publish without ever waiting on a consumer.
//!
//! ## Architecture
//! ```text
//! Publishers:                         Receivers:
//!   ReadySignal ──┐
//!   Run loop    ──┼──────► Bus ───┬──► subscriber_listener ────► SubscriberSet
//!   Sequencer   ──┤  (broadcast)  │     (in Engine)
//!   IdleTimer   ──┘               └──► Engine::subscribe()
//! ```
//!
//! ## Rules
//! - `publish()` never blocks and never fails; with no receivers the event is dropped.
//! - One shared ring buffer of `capacity` events; a receiver that falls behind gets
//!   `RecvError::Lagged(n)` and resumes at the oldest retained event.
//! - A receiver only observes events published after it subscribed.

use tokio::sync::broadcast;

use super::event::Event;

/// Cloneable publish handle for runtime events.
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a bus retaining at most `capacity` events (min 1).
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel::<Event>(capacity.max(1));
        Self { tx }
    }

    /// Fire-and-forget publish.
    pub fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// Creates an independent receiver for subsequent events.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Number of receivers currently subscribed.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;

    #[tokio::test]
    async fn receivers_only_see_later_events() {
        let bus = Bus::new(0);
        bus.publish(Event::new(EventKind::RunStarted));

        let mut rx = bus.subscribe();
        assert_eq!(bus.receiver_count(), 1);
        bus.publish(Event::new(EventKind::RunFinished));

        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.kind, EventKind::RunFinished);
    }
}
