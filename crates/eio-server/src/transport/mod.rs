//! Transport abstraction.
//!
//! A [`Transport`] moves already-decided packets to one client connection.
//! Two implementations exist:
//!
//! - [`PollingTransport`]: holds at most one suspended HTTP GET and completes
//!   it with a batch of packets.
//! - [`WebSocketTransport`]: writes one frame per packet to a websocket writer
//!   task.
//!
//! A session owns exactly one active transport (plus, while upgrading, one
//! pending websocket) as an [`ActiveTransport`].

pub mod polling;
pub mod websocket;

use std::sync::atomic::{AtomicU64, Ordering};

use eio_core::{Packet, TransportKind};

pub use polling::PollingTransport;
pub use websocket::WebSocketTransport;

static NEXT_TRANSPORT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique transport identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TransportId(u64);

impl TransportId {
    /// Allocate the next id.
    pub fn next() -> Self {
        Self(NEXT_TRANSPORT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Packets a transport could not take; the caller requeues them.
#[derive(Debug, PartialEq, Eq)]
pub struct Undelivered(pub Vec<Packet>);

/// Capability set shared by all transports.
pub trait Transport: Send {
    /// Identity of this transport instance.
    fn id(&self) -> TransportId;

    /// Which kind of transport this is.
    fn kind(&self) -> TransportKind;

    /// Whether [`send`](Self::send) would deliver right now.
    fn writable(&self) -> bool;

    /// Deliver packets in order, or hand them all back.
    fn send(&mut self, packets: Vec<Packet>) -> Result<(), Undelivered>;

    /// Close the underlying connection. Idempotent.
    fn close(&mut self);
}

/// The transport currently carrying a session's traffic.
#[derive(Debug)]
pub enum ActiveTransport {
    /// HTTP long-polling.
    Polling(PollingTransport),
    /// Websocket.
    Websocket(WebSocketTransport),
}

impl ActiveTransport {
    /// The polling transport, if this is one.
    pub fn as_polling_mut(&mut self) -> Option<&mut PollingTransport> {
        match self {
            Self::Polling(polling) => Some(polling),
            Self::Websocket(_) => None,
        }
    }

    fn inner(&self) -> &dyn Transport {
        match self {
            Self::Polling(t) => t,
            Self::Websocket(t) => t,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn Transport {
        match self {
            Self::Polling(t) => t,
            Self::Websocket(t) => t,
        }
    }
}

impl Transport for ActiveTransport {
    fn id(&self) -> TransportId {
        self.inner().id()
    }

    fn kind(&self) -> TransportKind {
        self.inner().kind()
    }

    fn writable(&self) -> bool {
        self.inner().writable()
    }

    fn send(&mut self, packets: Vec<Packet>) -> Result<(), Undelivered> {
        self.inner_mut().send(packets)
    }

    fn close(&mut self) {
        self.inner_mut().close();
    }
}

impl From<PollingTransport> for ActiveTransport {
    fn from(t: PollingTransport) -> Self {
        Self::Polling(t)
    }
}

impl From<WebSocketTransport> for ActiveTransport {
    fn from(t: WebSocketTransport) -> Self {
        Self::Websocket(t)
    }
}
