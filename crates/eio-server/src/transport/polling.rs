//! HTTP long-polling transport.
//!
//! Each GET parks a `oneshot` sender here; the next flush completes it with
//! every buffered packet. A GET whose client went away drops its receiver,
//! which makes the parked sender `is_closed()` so it no longer counts as
//! outstanding.

use eio_core::{Packet, TransportKind};
use tokio::sync::oneshot;

use super::{Transport, TransportId, Undelivered};

/// A second live GET arrived while one is still suspended.
#[derive(Debug, PartialEq, Eq)]
pub struct PollOverlap;

/// Polling transport state: at most one suspended GET.
#[derive(Debug)]
pub struct PollingTransport {
    id: TransportId,
    pending: Option<oneshot::Sender<Vec<Packet>>>,
    closed: bool,
}

impl PollingTransport {
    /// Create a transport with no suspended request.
    pub fn new() -> Self {
        Self {
            id: TransportId::next(),
            pending: None,
            closed: false,
        }
    }

    /// Whether a GET is suspended and its client is still connected.
    pub fn has_live_poll(&self) -> bool {
        self.pending.as_ref().is_some_and(|tx| !tx.is_closed())
    }

    /// Park a GET. Fails if another live GET is already parked.
    pub fn register_poll(&mut self, tx: oneshot::Sender<Vec<Packet>>) -> Result<(), PollOverlap> {
        if self.has_live_poll() {
            return Err(PollOverlap);
        }
        self.pending = Some(tx);
        Ok(())
    }

    /// Complete a suspended GET with a single `noop`.
    pub fn release(&mut self) -> bool {
        self.send(vec![Packet::noop()]).is_ok()
    }

    /// Whether [`close`](Transport::close) was called.
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Default for PollingTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for PollingTransport {
    fn id(&self) -> TransportId {
        self.id
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Polling
    }

    fn writable(&self) -> bool {
        !self.closed && self.has_live_poll()
    }

    fn send(&mut self, packets: Vec<Packet>) -> Result<(), Undelivered> {
        match self.pending.take() {
            Some(tx) => tx.send(packets).map_err(Undelivered),
            None => Err(Undelivered(packets)),
        }
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        // a suspended GET learns about the close in-band
        let _ = self.send(vec![Packet::close()]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eio_core::PacketType;

    #[test]
    fn not_writable_without_poll() {
        let t = PollingTransport::new();
        assert!(!t.writable());
        assert!(!t.has_live_poll());
    }

    #[tokio::test]
    async fn send_completes_parked_poll() {
        let mut t = PollingTransport::new();
        let (tx, rx) = oneshot::channel();
        t.register_poll(tx).unwrap();
        assert!(t.writable());

        t.send(vec![Packet::message("a"), Packet::message("b")]).unwrap();
        assert!(!t.writable());
        assert_eq!(rx.await.unwrap().len(), 2);
    }

    #[test]
    fn send_without_poll_hands_packets_back() {
        let mut t = PollingTransport::new();
        let err = t.send(vec![Packet::message("a")]).unwrap_err();
        assert_eq!(err, Undelivered(vec![Packet::message("a")]));
    }

    #[test]
    fn second_live_poll_rejected() {
        let mut t = PollingTransport::new();
        let (tx1, _rx1) = oneshot::channel();
        let (tx2, _rx2) = oneshot::channel();
        t.register_poll(tx1).unwrap();
        assert_eq!(t.register_poll(tx2), Err(PollOverlap));
    }

    #[test]
    fn abandoned_poll_does_not_count() {
        let mut t = PollingTransport::new();
        let (tx1, rx1) = oneshot::channel();
        t.register_poll(tx1).unwrap();
        drop(rx1);
        assert!(!t.has_live_poll());

        let (tx2, _rx2) = oneshot::channel();
        assert!(t.register_poll(tx2).is_ok());
    }

    #[test]
    fn send_to_abandoned_poll_hands_packets_back() {
        let mut t = PollingTransport::new();
        let (tx, rx) = oneshot::channel();
        t.register_poll(tx).unwrap();
        drop(rx);
        assert!(t.send(vec![Packet::ping()]).is_err());
    }

    #[tokio::test]
    async fn release_sends_noop() {
        let mut t = PollingTransport::new();
        let (tx, rx) = oneshot::channel();
        t.register_poll(tx).unwrap();
        assert!(t.release());
        assert_eq!(rx.await.unwrap(), vec![Packet::noop()]);
        assert!(!t.release());
    }

    #[tokio::test]
    async fn close_sends_close_packet_once() {
        let mut t = PollingTransport::new();
        let (tx, rx) = oneshot::channel();
        t.register_poll(tx).unwrap();
        t.close();
        t.close();
        assert!(t.is_closed());
        let packets = rx.await.unwrap();
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].packet_type, PacketType::Close);
    }
}
