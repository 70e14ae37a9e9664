//! Application-facing socket API.

use std::sync::Arc;

use eio_core::{Payload, ProtocolVersion, SessionId, TransportKind};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::EngineError;
use crate::session::Session;
use crate::state::{CloseReason, ReadyState};

/// One connected client, as handed out by [`Incoming`].
#[derive(Debug)]
pub struct Socket {
    session: Arc<Session>,
    inbound: mpsc::UnboundedReceiver<Payload>,
}

impl Socket {
    pub(crate) fn new(session: Arc<Session>, inbound: mpsc::UnboundedReceiver<Payload>) -> Self {
        Self { session, inbound }
    }

    /// Session id.
    pub fn id(&self) -> &SessionId {
        self.session.id()
    }

    /// Negotiated protocol revision.
    pub fn protocol(&self) -> ProtocolVersion {
        self.session.protocol()
    }

    /// Queue a message for delivery. Never blocks.
    pub fn send(&self, payload: impl Into<Payload>) -> Result<(), EngineError> {
        self.session.send(payload)
    }

    /// Next inbound message in receipt order; `None` once the session closed
    /// and every received message was consumed.
    pub async fn recv(&mut self) -> Option<Payload> {
        self.inbound.recv().await
    }

    /// Invoke `callback` once per inbound message, in order, on a new task.
    pub fn on_message<F>(self, mut callback: F) -> JoinHandle<()>
    where
        F: FnMut(Payload) + Send + 'static,
    {
        let mut inbound = self.inbound;
        tokio::spawn(async move {
            while let Some(payload) = inbound.recv().await {
                callback(payload);
            }
        })
    }

    /// Cloneable handle for sending from other tasks.
    pub fn handle(&self) -> SocketHandle {
        SocketHandle {
            session: Arc::clone(&self.session),
        }
    }

    /// Kind of the active transport.
    pub fn transport(&self) -> TransportKind {
        self.session.transport_kind()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ReadyState {
        self.session.state()
    }

    /// Close the session.
    pub fn close(&self) {
        self.session.close(CloseReason::ForcedClose);
    }
}

/// Cloneable sending side of a [`Socket`].
#[derive(Clone, Debug)]
pub struct SocketHandle {
    session: Arc<Session>,
}

impl SocketHandle {
    /// Session id.
    pub fn id(&self) -> &SessionId {
        self.session.id()
    }

    /// Queue a message for delivery. Never blocks.
    pub fn send(&self, payload: impl Into<Payload>) -> Result<(), EngineError> {
        self.session.send(payload)
    }

    /// Kind of the active transport.
    pub fn transport(&self) -> TransportKind {
        self.session.transport_kind()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ReadyState {
        self.session.state()
    }

    /// Close the session.
    pub fn close(&self) {
        self.session.close(CloseReason::ForcedClose);
    }

    /// Resolves once the session has closed.
    pub async fn closed(&self) {
        self.session.closed().await;
    }
}

/// Stream of newly opened sockets.
#[derive(Debug)]
pub struct Incoming {
    rx: mpsc::UnboundedReceiver<Socket>,
}

impl Incoming {
    pub(crate) fn new(rx: mpsc::UnboundedReceiver<Socket>) -> Self {
        Self { rx }
    }

    /// Wait for the next session; `None` once the engine is dropped.
    pub async fn next(&mut self) -> Option<Socket> {
        self.rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::events::EventBus;
    use crate::transport::PollingTransport;
    use eio_core::Packet;
    use std::time::Duration;

    fn socket() -> Socket {
        let (session, rx) = Session::new(
            SessionId::from("sock"),
            ProtocolVersion::V4,
            Arc::new(EngineConfig::default()),
            EventBus::default(),
            PollingTransport::new().into(),
        );
        session.open(Packet::open("{}".into()));
        Socket::new(session, rx)
    }

    #[tokio::test]
    async fn handle_sends_through_same_session() {
        let socket = socket();
        let handle = socket.handle();
        handle.send("from handle").unwrap();
        assert_eq!(handle.id(), socket.id());
        assert_eq!(handle.transport(), TransportKind::Polling);
        assert_eq!(socket.session.buffered(), 2);
    }

    #[tokio::test]
    async fn recv_ends_after_close() {
        let mut socket = socket();
        socket.session.receive(Packet::message("last"));
        socket.close();
        assert_eq!(socket.recv().await, Some(Payload::from("last")));
        assert_eq!(socket.recv().await, None);
        assert_eq!(socket.state(), ReadyState::Closed);
        assert!(socket.send("x").is_err());
    }

    #[tokio::test]
    async fn on_message_runs_in_order() {
        let socket = socket();
        let session = Arc::clone(&socket.session);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let task = socket.on_message(move |payload| {
            let _ = tx.send(payload);
        });

        session.receive(Packet::message("a"));
        session.receive(Packet::message("b"));
        assert_eq!(rx.recv().await.unwrap(), Payload::from("a"));
        assert_eq!(rx.recv().await.unwrap(), Payload::from("b"));

        session.close(CloseReason::ForcedClose);
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn handle_observes_close() {
        let socket = socket();
        let handle = socket.handle();
        socket.close();
        tokio::time::timeout(Duration::from_secs(1), handle.closed())
            .await
            .unwrap();
    }
}
