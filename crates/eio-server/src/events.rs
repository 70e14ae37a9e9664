//! Observer bus.
//!
//! Every state transition, inbound message, upgrade and error of every session
//! is published as an [`EngineEvent`] on a `broadcast` channel. Consumers
//! subscribe to one [`EventKind`] or to all of them.

use eio_core::{Payload, SessionId, TransportKind};
use tokio::sync::broadcast;
use tracing::warn;

use crate::error::EngineError;
use crate::state::{CloseReason, ReadyState};

/// Default bus capacity before slow subscribers start lagging.
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Something observable happened to a session.
#[derive(Clone, Debug)]
pub enum EngineEvent {
    /// A session completed its handshake.
    Connection {
        /// Session id.
        sid: SessionId,
        /// Transport the session opened on.
        transport: TransportKind,
    },
    /// Lifecycle transition.
    StateChange {
        /// Session id.
        sid: SessionId,
        /// Previous state.
        from: ReadyState,
        /// New state.
        to: ReadyState,
    },
    /// Inbound application message.
    Message {
        /// Session id.
        sid: SessionId,
        /// Message data.
        payload: Payload,
    },
    /// The session now runs on `transport`.
    Upgrade {
        /// Session id.
        sid: SessionId,
        /// New active transport.
        transport: TransportKind,
    },
    /// A pending upgrade was discarded; the session stays on its transport.
    UpgradeFailed {
        /// Session id.
        sid: SessionId,
        /// Why the probe failed.
        error: EngineError,
    },
    /// A session-level error.
    Error {
        /// Session id.
        sid: SessionId,
        /// The error.
        error: EngineError,
    },
    /// The session closed. Emitted exactly once per session.
    Close {
        /// Session id.
        sid: SessionId,
        /// Why it closed.
        reason: CloseReason,
    },
}

/// Discriminant of [`EngineEvent`], used to filter subscriptions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// [`EngineEvent::Connection`]
    Connection,
    /// [`EngineEvent::StateChange`]
    StateChange,
    /// [`EngineEvent::Message`]
    Message,
    /// [`EngineEvent::Upgrade`]
    Upgrade,
    /// [`EngineEvent::UpgradeFailed`]
    UpgradeFailed,
    /// [`EngineEvent::Error`]
    Error,
    /// [`EngineEvent::Close`]
    Close,
}

impl EngineEvent {
    /// The kind of this event.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Connection { .. } => EventKind::Connection,
            Self::StateChange { .. } => EventKind::StateChange,
            Self::Message { .. } => EventKind::Message,
            Self::Upgrade { .. } => EventKind::Upgrade,
            Self::UpgradeFailed { .. } => EventKind::UpgradeFailed,
            Self::Error { .. } => EventKind::Error,
            Self::Close { .. } => EventKind::Close,
        }
    }

    /// The session this event belongs to.
    pub fn sid(&self) -> &SessionId {
        match self {
            Self::Connection { sid, .. }
            | Self::StateChange { sid, .. }
            | Self::Message { sid, .. }
            | Self::Upgrade { sid, .. }
            | Self::UpgradeFailed { sid, .. }
            | Self::Error { sid, .. }
            | Self::Close { sid, .. } => sid,
        }
    }
}

/// Fan-out of [`EngineEvent`]s to any number of subscribers.
#[derive(Clone, Debug)]
pub struct EventBus {
    tx: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    /// Create a bus holding up to `capacity` undelivered events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish an event. Publishing with no subscribers is not an error.
    pub fn emit(&self, event: EngineEvent) {
        let _ = self.tx.send(event);
    }

    /// Subscribe to events of one kind.
    pub fn subscribe(&self, kind: EventKind) -> Subscription {
        Subscription {
            rx: self.tx.subscribe(),
            filter: Some(kind),
        }
    }

    /// Subscribe to every event.
    pub fn subscribe_all(&self) -> Subscription {
        Subscription {
            rx: self.tx.subscribe(),
            filter: None,
        }
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

/// A (possibly filtered) stream of events.
#[derive(Debug)]
pub struct Subscription {
    rx: broadcast::Receiver<EngineEvent>,
    filter: Option<EventKind>,
}

impl Subscription {
    /// Wait for the next matching event; `None` once the bus is gone.
    ///
    /// Events dropped because this subscriber lagged are logged and skipped.
    pub async fn recv(&mut self) -> Option<EngineEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => {
                    if self.filter.is_none_or(|kind| kind == event.kind()) {
                        return Some(event);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event subscriber lagged, events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close_event(sid: &str) -> EngineEvent {
        EngineEvent::Close {
            sid: SessionId::from(sid),
            reason: CloseReason::ForcedClose,
        }
    }

    #[tokio::test]
    async fn filtered_subscription_skips_other_kinds() {
        let bus = EventBus::default();
        let mut closes = bus.subscribe(EventKind::Close);

        bus.emit(EngineEvent::Message {
            sid: SessionId::from("a"),
            payload: Payload::from("hi"),
        });
        bus.emit(close_event("a"));

        let event = closes.recv().await.unwrap();
        assert_eq!(event.kind(), EventKind::Close);
        assert_eq!(event.sid().as_str(), "a");
    }

    #[tokio::test]
    async fn subscribe_all_sees_everything_in_order() {
        let bus = EventBus::default();
        let mut all = bus.subscribe_all();

        bus.emit(EngineEvent::Connection {
            sid: SessionId::from("a"),
            transport: TransportKind::Polling,
        });
        bus.emit(close_event("a"));

        assert_eq!(all.recv().await.unwrap().kind(), EventKind::Connection);
        assert_eq!(all.recv().await.unwrap().kind(), EventKind::Close);
    }

    #[tokio::test]
    async fn lagged_subscriber_recovers() {
        let bus = EventBus::new(2);
        let mut sub = bus.subscribe_all();
        for i in 0..5 {
            bus.emit(close_event(&i.to_string()));
        }
        // oldest events were overwritten; the newest two remain
        assert_eq!(sub.recv().await.unwrap().sid().as_str(), "3");
        assert_eq!(sub.recv().await.unwrap().sid().as_str(), "4");
    }

    #[tokio::test]
    async fn recv_returns_none_when_bus_dropped() {
        let bus = EventBus::default();
        let mut sub = bus.subscribe_all();
        drop(bus);
        assert!(sub.recv().await.is_none());
    }

    #[test]
    fn emit_without_subscribers_is_fine() {
        let bus = EventBus::default();
        assert_eq!(bus.subscriber_count(), 0);
        bus.emit(close_event("x"));
    }
}
