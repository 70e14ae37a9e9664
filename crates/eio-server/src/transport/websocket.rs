//! Websocket transport.
//!
//! Each upgraded connection is split in two:
//! - a writer task that drains [`WsCommand`]s into the socket sink, fed by the
//!   [`WebSocketTransport`] owned by the session;
//! - a reader loop that decodes frames and hands packets to the session, first
//!   through the upgrade probe (when joining an existing session) and then as
//!   regular traffic.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use eio_core::{Frame, Packet, ProtocolVersion, SessionId, TransportKind, decode_frame, encode_frame};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time;
use tracing::{debug, instrument, warn};

use super::{Transport, TransportId, Undelivered};
use crate::engine::Engine;
use crate::error::EngineError;
use crate::session::{ProbeOutcome, Session};
use crate::state::CloseReason;

/// Instruction for a websocket writer task.
#[derive(Debug)]
pub enum WsCommand {
    /// Write one frame.
    Frame(Frame),
    /// Send a close frame and stop.
    Close,
}

/// Session-side handle of one websocket connection.
#[derive(Debug)]
pub struct WebSocketTransport {
    id: TransportId,
    protocol: ProtocolVersion,
    tx: mpsc::UnboundedSender<WsCommand>,
    closed: bool,
}

impl WebSocketTransport {
    /// Wrap the command channel of a writer task.
    pub fn new(protocol: ProtocolVersion, tx: mpsc::UnboundedSender<WsCommand>) -> Self {
        Self {
            id: TransportId::next(),
            protocol,
            tx,
            closed: false,
        }
    }
}

impl Transport for WebSocketTransport {
    fn id(&self) -> TransportId {
        self.id
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Websocket
    }

    fn writable(&self) -> bool {
        !self.closed && !self.tx.is_closed()
    }

    fn send(&mut self, packets: Vec<Packet>) -> Result<(), Undelivered> {
        if !self.writable() {
            return Err(Undelivered(packets));
        }
        let mut packets = packets.into_iter();
        while let Some(packet) = packets.next() {
            let frame = match encode_frame(&packet, self.protocol) {
                Ok(frame) => frame,
                Err(error) => {
                    warn!(%error, packet = %packet.packet_type, "dropping packet with no frame form");
                    continue;
                }
            };
            if self.tx.send(WsCommand::Frame(frame)).is_err() {
                let mut rest = vec![packet];
                rest.extend(packets);
                return Err(Undelivered(rest));
            }
        }
        Ok(())
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let _ = self.tx.send(WsCommand::Close);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Connection tasks
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
enum Inbound {
    Frame(Frame),
    Skip,
    Gone(CloseReason),
}

fn classify(message: Option<Result<Message, axum::Error>>) -> Inbound {
    match message {
        Some(Ok(Message::Text(text))) => Inbound::Frame(Frame::Text(text.as_str().to_owned())),
        Some(Ok(Message::Binary(bytes))) => Inbound::Frame(Frame::Binary(bytes)),
        Some(Ok(Message::Ping(_) | Message::Pong(_))) => Inbound::Skip,
        Some(Ok(Message::Close(_))) | None => Inbound::Gone(CloseReason::TransportClose),
        Some(Err(error)) => {
            debug!(%error, "websocket read failed");
            Inbound::Gone(CloseReason::TransportError)
        }
    }
}

async fn write_loop(
    mut sink: SplitSink<WebSocket, Message>,
    mut rx: mpsc::UnboundedReceiver<WsCommand>,
) {
    while let Some(command) = rx.recv().await {
        let message = match command {
            WsCommand::Frame(Frame::Text(text)) => Message::Text(text.into()),
            WsCommand::Frame(Frame::Binary(bytes)) => Message::Binary(bytes),
            WsCommand::Close => {
                let _ = sink.send(Message::Close(None)).await;
                break;
            }
        };
        if sink.send(message).await.is_err() {
            break;
        }
    }
    let _ = sink.close().await;
}

/// Drive one upgraded websocket until it or its session closes.
///
/// Without `sid` the socket opens a new session; with `sid` it joins that
/// session as a pending upgrade and must complete the probe exchange within
/// the upgrade timeout.
#[instrument(skip_all, fields(sid = ?sid, protocol = %protocol))]
pub(crate) async fn run_websocket(
    engine: Arc<Engine>,
    socket: WebSocket,
    protocol: ProtocolVersion,
    sid: Option<SessionId>,
) {
    let (sink, mut stream) = socket.split();
    let (tx, rx) = mpsc::unbounded_channel();
    let writer = tokio::spawn(write_loop(sink, rx));
    let transport = WebSocketTransport::new(protocol, tx);
    let tid = transport.id();

    let session = match sid {
        None => engine.open_session(protocol, transport.into()),
        Some(sid) => match upgrade(&engine, &sid, transport, &mut stream).await {
            Some(session) => session,
            None => {
                let _ = writer.await;
                return;
            }
        },
    };

    let reason = pump(&session, &mut stream).await;
    session.on_transport_closed(tid, reason);
    let _ = writer.await;
}

async fn upgrade(
    engine: &Engine,
    sid: &SessionId,
    transport: WebSocketTransport,
    stream: &mut SplitStream<WebSocket>,
) -> Option<Arc<Session>> {
    let Some(session) = engine.session(sid.as_str()) else {
        debug!("session vanished before upgrade");
        return None;
    };
    let tid = transport.id();
    if let Err(error) = session.begin_upgrade(transport) {
        warn!(%error, "upgrade refused");
        return None;
    }

    let limit = engine.config().upgrade_timeout;
    let outcome = tokio::select! {
        result = time::timeout(limit, probe(&session, tid, stream)) => {
            result.unwrap_or(Err(EngineError::UpgradeProbeTimeout(limit)))
        }
        () = session.closed() => return None,
    };

    match outcome {
        Ok(()) => Some(session),
        Err(error) => {
            session.abort_upgrade(tid, error);
            None
        }
    }
}

async fn probe(
    session: &Session,
    tid: TransportId,
    stream: &mut SplitStream<WebSocket>,
) -> Result<(), EngineError> {
    loop {
        match classify(stream.next().await) {
            Inbound::Frame(frame) => {
                let packet = decode_frame(frame, session.protocol())?;
                if session.probe(tid, packet)? == ProbeOutcome::Upgraded {
                    return Ok(());
                }
            }
            Inbound::Skip => {}
            Inbound::Gone(_) => {
                return Err(EngineError::TransportMismatch(
                    "upgrade transport closed before completing".into(),
                ));
            }
        }
    }
}

async fn pump(session: &Session, stream: &mut SplitStream<WebSocket>) -> CloseReason {
    loop {
        let message = tokio::select! {
            () = session.closed() => return CloseReason::TransportClose,
            message = stream.next() => message,
        };
        match classify(message) {
            Inbound::Frame(frame) => match decode_frame(frame, session.protocol()) {
                Ok(packet) => {
                    session.reset_decode_errors();
                    session.receive(packet);
                }
                Err(error) => session.record_decode_error(error),
            },
            Inbound::Skip => {}
            Inbound::Gone(reason) => return reason,
        }
    }
}
