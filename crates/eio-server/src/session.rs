//! Per-session state machine.
//!
//! All mutable state of one session sits behind a single `parking_lot::Mutex`
//! that is never held across an `.await`. Every write, every transport swap and
//! every state transition happens under that lock, so a send can never reach a
//! transport that is being swapped out.

use std::collections::VecDeque;
use std::sync::Arc;

use eio_core::{
    DecodeError, Packet, PacketType, Payload, ProtocolVersion, SessionId, TransportKind,
    check_frame, check_payload,
};
use metrics::{counter, gauge};
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::events::{EngineEvent, EventBus};
use crate::metrics::{
    DECODE_ERRORS_TOTAL, PACKETS_RECEIVED_TOTAL, PACKETS_SENT_TOTAL, SESSIONS_ACTIVE,
    SESSIONS_CLOSED_TOTAL, UPGRADE_FAILURES_TOTAL, UPGRADES_TOTAL,
};
use crate::state::{CloseReason, ReadyState};
use crate::transport::{ActiveTransport, Transport, TransportId, Undelivered, WebSocketTransport};

/// Result of feeding one packet to a pending upgrade.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// `2probe` answered with `3probe`; waiting for `5`.
    Probed,
    /// The websocket is now the active transport.
    Upgraded,
}

struct PendingUpgrade {
    transport: WebSocketTransport,
    probed: bool,
}

struct SessionInner {
    state: ReadyState,
    transport: ActiveTransport,
    upgrade: Option<PendingUpgrade>,
    write_buffer: VecDeque<Packet>,
    inbound: Option<mpsc::UnboundedSender<Payload>>,
    decode_errors: u32,
    last_heartbeat: Instant,
}

/// One logical connection.
pub struct Session {
    id: SessionId,
    protocol: ProtocolVersion,
    config: Arc<EngineConfig>,
    events: EventBus,
    cancel: CancellationToken,
    inner: Mutex<SessionInner>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("protocol", &self.protocol)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Create a session in `Opening` and the receiving end of its inbound messages.
    pub(crate) fn new(
        id: SessionId,
        protocol: ProtocolVersion,
        config: Arc<EngineConfig>,
        events: EventBus,
        transport: ActiveTransport,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<Payload>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let session = Arc::new(Self {
            id,
            protocol,
            config,
            events,
            cancel: CancellationToken::new(),
            inner: Mutex::new(SessionInner {
                state: ReadyState::Opening,
                transport,
                upgrade: None,
                write_buffer: VecDeque::new(),
                inbound: Some(tx),
                decode_errors: 0,
                last_heartbeat: Instant::now(),
            }),
        });
        (session, rx)
    }

    // ── Accessors ────────────────────────────────────────────────────

    /// Session id.
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Negotiated protocol revision.
    pub fn protocol(&self) -> ProtocolVersion {
        self.protocol
    }

    /// Engine configuration this session runs with.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ReadyState {
        self.inner.lock().state
    }

    /// Kind of the active transport.
    pub fn transport_kind(&self) -> TransportKind {
        self.inner.lock().transport.kind()
    }

    /// Id of the active transport.
    pub fn transport_id(&self) -> TransportId {
        self.inner.lock().transport.id()
    }

    /// Whether a websocket upgrade is pending.
    pub fn is_upgrading(&self) -> bool {
        self.inner.lock().upgrade.is_some()
    }

    /// Packets queued for the next flush.
    pub fn buffered(&self) -> usize {
        self.inner.lock().write_buffer.len()
    }

    /// When the last heartbeat packet arrived.
    pub fn last_heartbeat(&self) -> Instant {
        self.inner.lock().last_heartbeat
    }

    /// Token cancelled when the session closes.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Resolves once the session has closed.
    pub async fn closed(&self) {
        self.cancel.cancelled().await;
    }

    // ── Outbound ─────────────────────────────────────────────────────

    /// Queue the `open` packet ahead of anything else and enter `Open`.
    pub(crate) fn open(&self, handshake: Packet) {
        let mut inner = self.inner.lock();
        inner.write_buffer.push_front(handshake);
        inner.last_heartbeat = Instant::now();
        self.transition(&mut inner, ReadyState::Open);
        self.flush_locked(&mut inner);
    }

    /// Queue an application message. Never blocks.
    pub fn send(&self, payload: impl Into<Payload>) -> Result<(), EngineError> {
        self.send_packet(Packet::message(payload))
    }

    /// Queue any packet and flush if the transport is writable.
    ///
    /// Fails with [`EngineError::Encode`] if the active transport cannot carry
    /// the packet. While polling is active the batch rules apply even during an
    /// upgrade, since the packet may still leave in a polling response.
    pub fn send_packet(&self, packet: Packet) -> Result<(), EngineError> {
        let mut inner = self.inner.lock();
        if !inner.state.is_live() {
            return Err(EngineError::SessionClosed);
        }
        match inner.transport.kind() {
            TransportKind::Polling => check_payload(&packet, self.protocol)?,
            TransportKind::Websocket => check_frame(&packet, self.protocol)?,
        }
        inner.write_buffer.push_back(packet);
        self.flush_locked(&mut inner);
        Ok(())
    }

    fn flush_locked(&self, inner: &mut SessionInner) {
        if inner.write_buffer.is_empty() || !inner.transport.writable() {
            return;
        }
        let packets: Vec<Packet> = inner.write_buffer.drain(..).collect();
        let count = packets.len();
        match inner.transport.send(packets) {
            Ok(()) => {
                counter!(PACKETS_SENT_TOTAL).increment(count as u64);
                debug!(sid = %self.id, count, transport = %inner.transport.kind(), "flushed packets");
            }
            Err(Undelivered(packets)) => {
                for packet in packets.into_iter().rev() {
                    inner.write_buffer.push_front(packet);
                }
            }
        }
    }

    /// Serve one polling GET.
    ///
    /// Returns immediately when packets are buffered, otherwise suspends until
    /// a flush, the poll timeout (answered with `noop`), or session close
    /// (answered with `close`).
    pub async fn poll(&self) -> Result<Vec<Packet>, EngineError> {
        let mut rx = {
            let mut inner = self.inner.lock();
            if !inner.state.is_live() {
                return Err(EngineError::SessionClosed);
            }
            let Some(polling) = inner.transport.as_polling_mut() else {
                return Err(EngineError::TransportMismatch(
                    "session is not using polling".into(),
                ));
            };
            let (tx, rx) = oneshot::channel();
            if polling.register_poll(tx).is_err() {
                return Err(EngineError::TransportMismatch(
                    "overlapping polling request".into(),
                ));
            }
            self.flush_locked(&mut inner);
            rx
        };

        tokio::select! {
            packets = &mut rx => return Ok(packets.unwrap_or_else(|_| vec![Packet::noop()])),
            () = time::sleep(self.config.poll_timeout) => {}
            () = self.cancel.cancelled() => {}
        }

        // Timed out or closing. A flush may have raced us, in which case the
        // sender is already gone and rx holds its packets.
        {
            let mut inner = self.inner.lock();
            if let Some(polling) = inner.transport.as_polling_mut() {
                let _ = polling.release();
            }
        }
        Ok(rx.await.unwrap_or_else(|_| vec![Packet::noop()]))
    }

    // ── Inbound ──────────────────────────────────────────────────────

    /// Handle one packet that arrived on the active transport.
    pub fn receive(&self, packet: Packet) {
        counter!(PACKETS_RECEIVED_TOTAL).increment(1);
        match packet.packet_type {
            PacketType::Ping => {
                self.touch_heartbeat();
                let _ = self.send_packet(Packet::pong(packet.data));
            }
            PacketType::Pong => self.touch_heartbeat(),
            PacketType::Message => {
                let payload = packet.data.unwrap_or_else(|| Payload::from(""));
                let delivered = {
                    let inner = self.inner.lock();
                    match &inner.inbound {
                        Some(tx) => {
                            let _ = tx.send(payload.clone());
                            true
                        }
                        None => false,
                    }
                };
                if delivered {
                    self.events.emit(EngineEvent::Message {
                        sid: self.id.clone(),
                        payload,
                    });
                }
            }
            PacketType::Close => self.close(CloseReason::TransportClose),
            PacketType::Open | PacketType::Upgrade | PacketType::Noop => {
                debug!(sid = %self.id, packet = %packet.packet_type, "ignoring packet");
            }
        }
    }

    fn touch_heartbeat(&self) {
        self.inner.lock().last_heartbeat = Instant::now();
    }

    /// Count a decode failure; closes the session once the budget is exceeded.
    pub fn record_decode_error(&self, error: DecodeError) {
        counter!(DECODE_ERRORS_TOTAL).increment(1);
        let exhausted = {
            let mut inner = self.inner.lock();
            inner.decode_errors += 1;
            inner.decode_errors > self.config.max_decode_errors
        };
        warn!(sid = %self.id, %error, exhausted, "failed to decode client packet");
        self.report_error(EngineError::Decode(error));
        if exhausted {
            self.close(CloseReason::ParseError);
        }
    }

    /// A batch decoded cleanly: the decode-error budget starts over.
    pub fn reset_decode_errors(&self) {
        self.inner.lock().decode_errors = 0;
    }

    /// Publish a session-level error without changing state.
    pub fn report_error(&self, error: EngineError) {
        self.events.emit(EngineEvent::Error {
            sid: self.id.clone(),
            error,
        });
    }

    // ── Upgrade ──────────────────────────────────────────────────────

    fn upgrade_allowed(&self, inner: &SessionInner) -> Result<(), EngineError> {
        if !self.config.allow_upgrades || !self.config.allows(TransportKind::Websocket) {
            return Err(EngineError::UnknownTransport(
                TransportKind::Websocket.as_str().into(),
            ));
        }
        match inner.state {
            ReadyState::Open => {}
            ReadyState::Upgrading => {
                return Err(EngineError::TransportMismatch(
                    "upgrade already in progress".into(),
                ));
            }
            _ => return Err(EngineError::SessionClosed),
        }
        if inner.transport.kind() != TransportKind::Polling {
            return Err(EngineError::TransportMismatch(
                "session already uses websocket".into(),
            ));
        }
        Ok(())
    }

    /// Whether a websocket upgrade may start now.
    pub fn check_upgrade(&self) -> Result<(), EngineError> {
        self.upgrade_allowed(&self.inner.lock())
    }

    /// Hold `transport` as the pending upgrade and enter `Upgrading`.
    pub(crate) fn begin_upgrade(&self, mut transport: WebSocketTransport) -> Result<(), EngineError> {
        let mut inner = self.inner.lock();
        if let Err(error) = self.upgrade_allowed(&inner) {
            transport.close();
            return Err(error);
        }
        inner.upgrade = Some(PendingUpgrade {
            transport,
            probed: false,
        });
        self.transition(&mut inner, ReadyState::Upgrading);
        Ok(())
    }

    /// Feed a packet received on the pending websocket.
    pub(crate) fn probe(&self, tid: TransportId, packet: Packet) -> Result<ProbeOutcome, EngineError> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let Some(pending) = inner.upgrade.as_mut().filter(|p| p.transport.id() == tid) else {
            return Err(EngineError::TransportMismatch(
                "no pending upgrade for this transport".into(),
            ));
        };

        match packet.packet_type {
            PacketType::Ping if packet.is_probe() => {
                pending.probed = true;
                pending
                    .transport
                    .send(vec![Packet::pong(Some(Payload::from("probe")))])
                    .map_err(|_| EngineError::TransportMismatch("upgrade transport closed".into()))?;
                // let the client pause polling
                if let Some(polling) = inner.transport.as_polling_mut() {
                    let _ = polling.release();
                }
                debug!(sid = %self.id, "upgrade probe answered");
                Ok(ProbeOutcome::Probed)
            }
            PacketType::Upgrade if pending.probed => {
                self.complete_upgrade(inner);
                Ok(ProbeOutcome::Upgraded)
            }
            other => Err(EngineError::TransportMismatch(format!(
                "unexpected {other} packet during upgrade"
            ))),
        }
    }

    fn complete_upgrade(&self, inner: &mut SessionInner) {
        let Some(pending) = inner.upgrade.take() else {
            return;
        };
        let mut previous =
            std::mem::replace(&mut inner.transport, ActiveTransport::Websocket(pending.transport));
        if let Some(polling) = previous.as_polling_mut() {
            let _ = polling.release();
        }
        previous.close();

        self.transition(inner, ReadyState::Open);
        self.flush_locked(inner);

        counter!(UPGRADES_TOTAL).increment(1);
        info!(sid = %self.id, "session upgraded to websocket");
        self.events.emit(EngineEvent::Upgrade {
            sid: self.id.clone(),
            transport: TransportKind::Websocket,
        });
    }

    /// Discard the pending upgrade on `tid`; the session stays on polling.
    pub(crate) fn abort_upgrade(&self, tid: TransportId, error: EngineError) {
        {
            let mut inner = self.inner.lock();
            if !inner.upgrade.as_ref().is_some_and(|p| p.transport.id() == tid) {
                return;
            }
            if let Some(mut pending) = inner.upgrade.take() {
                pending.transport.close();
            }
            if inner.state == ReadyState::Upgrading {
                self.transition(&mut inner, ReadyState::Open);
            }
            self.flush_locked(&mut inner);
        }

        counter!(UPGRADE_FAILURES_TOTAL).increment(1);
        warn!(sid = %self.id, %error, "upgrade discarded");
        self.events.emit(EngineEvent::UpgradeFailed {
            sid: self.id.clone(),
            error,
        });
    }

    /// A websocket task ended. Closes the session if it was the active transport.
    pub(crate) fn on_transport_closed(&self, tid: TransportId, reason: CloseReason) {
        let active = self.inner.lock().transport.id() == tid;
        if active {
            self.close(reason);
        } else {
            self.abort_upgrade(
                tid,
                EngineError::TransportMismatch("upgrade transport closed".into()),
            );
        }
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    fn transition(&self, inner: &mut SessionInner, to: ReadyState) {
        let from = inner.state;
        if from == to {
            return;
        }
        inner.state = to;
        debug!(sid = %self.id, %from, %to, "state change");
        self.events.emit(EngineEvent::StateChange {
            sid: self.id.clone(),
            from,
            to,
        });
    }

    /// Close the session. Queued packets are discarded; idempotent.
    pub fn close(&self, reason: CloseReason) {
        let inbound = {
            let mut inner = self.inner.lock();
            if !inner.state.is_live() {
                return;
            }
            self.transition(&mut inner, ReadyState::Closing);
            inner.write_buffer.clear();
            if let Some(mut pending) = inner.upgrade.take() {
                pending.transport.close();
            }
            inner.transport.close();
            self.transition(&mut inner, ReadyState::Closed);
            inner.inbound.take()
        };
        drop(inbound);
        self.cancel.cancel();

        counter!(SESSIONS_CLOSED_TOTAL).increment(1);
        gauge!(SESSIONS_ACTIVE).decrement(1.0);
        info!(sid = %self.id, %reason, "session closed");
        self.events.emit(EngineEvent::Close {
            sid: self.id.clone(),
            reason,
        });
    }
}
