//! Heartbeat ping/pong liveness monitoring.

use std::sync::Arc;

use eio_core::Packet;
use tokio::time;

use crate::session::Session;

/// Outcome of the heartbeat loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeartbeatResult {
    /// No heartbeat packet arrived within `pingInterval + pingTimeout`.
    TimedOut,
    /// The session closed first.
    Cancelled,
}

/// Watch a session's heartbeat until it times out or the session closes.
///
/// For `EIO=4` the server also sends `ping` every `ping_interval`; for `EIO=3`
/// it only waits for the client's pings. In both cases the deadline is the
/// last heartbeat packet plus `ping_interval + ping_timeout`.
pub async fn run_heartbeat(session: Arc<Session>) -> HeartbeatResult {
    let interval = session.config().ping_interval;
    let grace = session.config().heartbeat_deadline();
    let server_pings = session.protocol().server_pings();
    let cancel = session.cancellation();

    let mut ticker = time::interval_at(time::Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

    loop {
        let deadline = session.last_heartbeat() + grace;
        tokio::select! {
            () = cancel.cancelled() => return HeartbeatResult::Cancelled,
            _ = ticker.tick(), if server_pings => {
                let _ = session.send_packet(Packet::ping());
            }
            () = time::sleep_until(deadline) => {
                if session.last_heartbeat() + grace <= time::Instant::now() {
                    return HeartbeatResult::TimedOut;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::events::EventBus;
    use crate::transport::websocket::{WebSocketTransport, WsCommand};
    use eio_core::{Frame, PacketType, ProtocolVersion, SessionId};
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn session(protocol: ProtocolVersion) -> (Arc<Session>, mpsc::UnboundedReceiver<WsCommand>) {
        let config = Arc::new(EngineConfig {
            ping_interval: Duration::from_millis(500),
            ping_timeout: Duration::from_millis(300),
            ..EngineConfig::default()
        });
        let (tx, rx) = mpsc::unbounded_channel();
        let (session, _inbound) = Session::new(
            SessionId::from("hb"),
            protocol,
            config,
            EventBus::default(),
            WebSocketTransport::new(protocol, tx).into(),
        );
        (session, rx)
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_when_session_closes() {
        let (session, _rx) = session(ProtocolVersion::V4);
        let closer = Arc::clone(&session);
        let handle = tokio::spawn(run_heartbeat(Arc::clone(&session)));
        closer.close(crate::state::CloseReason::ForcedClose);
        assert_eq!(handle.await.unwrap(), HeartbeatResult::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_without_heartbeat() {
        let (session, _rx) = session(ProtocolVersion::V3);
        let started = time::Instant::now();
        let result = run_heartbeat(session).await;
        assert_eq!(result, HeartbeatResult::TimedOut);
        assert_eq!(started.elapsed(), Duration::from_millis(800));
    }

    #[tokio::test(start_paused = true)]
    async fn v4_sends_pings_every_interval() {
        let (session, mut rx) = session(ProtocolVersion::V4);
        let _handle = tokio::spawn(run_heartbeat(Arc::clone(&session)));

        time::sleep(Duration::from_millis(510)).await;
        match rx.try_recv() {
            Ok(WsCommand::Frame(Frame::Text(text))) => assert_eq!(text, "2"),
            other => panic!("expected ping frame, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn pongs_keep_session_alive() {
        let (session, _rx) = session(ProtocolVersion::V4);
        let handle = tokio::spawn(run_heartbeat(Arc::clone(&session)));

        for _ in 0..5 {
            time::sleep(Duration::from_millis(500)).await;
            session.receive(Packet::pong(None));
        }
        assert!(!handle.is_finished());

        // silence after the last pong: times out 800ms later
        let result = handle.await.unwrap();
        assert_eq!(result, HeartbeatResult::TimedOut);
    }

    #[tokio::test(start_paused = true)]
    async fn v3_client_pings_keep_session_alive() {
        let (session, mut rx) = session(ProtocolVersion::V3);
        let handle = tokio::spawn(run_heartbeat(Arc::clone(&session)));

        for _ in 0..4 {
            time::sleep(Duration::from_millis(600)).await;
            session.receive(Packet::ping());
        }
        assert!(!handle.is_finished());

        // each client ping was answered with a pong
        let mut pongs = 0;
        while let Ok(WsCommand::Frame(Frame::Text(text))) = rx.try_recv() {
            assert_eq!(text, PacketType::Pong.as_char().to_string());
            pongs += 1;
        }
        assert_eq!(pongs, 4);
    }
}
