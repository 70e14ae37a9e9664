//! Graceful shutdown.
//!
//! Shutdown closes every session with `server shutting down` (which releases
//! suspended polls with a `close` packet and sends a close frame on every
//! websocket), cancels the listener token, then waits for the registry to
//! drain and for the serve tasks to finish.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::engine::Engine;
use crate::state::CloseReason;

/// How long shutdown waits for sessions and tasks when no timeout is given.
const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Registry polling step while draining.
const DRAIN_STEP: Duration = Duration::from_millis(10);

/// Owns the listener's cancellation token and sequences shutdown.
#[derive(Debug, Default)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    /// Create a coordinator whose token is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Token the listener stops on.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Whether shutdown has started.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Close every session of `engine` and stop accepting requests.
    ///
    /// Returns the number of sessions that were open. Calling it again is a
    /// no-op returning `0`.
    pub fn begin(&self, engine: &Engine) -> usize {
        if self.token.is_cancelled() {
            return 0;
        }
        let open = engine.session_count();
        engine.close_all(CloseReason::ServerShutdown);
        self.token.cancel();
        info!(sessions = open, "shutdown started");
        open
    }

    /// Run [`begin`](Self::begin), then wait up to `timeout` for the registry
    /// to empty and for `handles` to finish.
    ///
    /// Returns `false` if the deadline passed first.
    pub async fn graceful_shutdown(
        &self,
        engine: &Engine,
        handles: Vec<JoinHandle<()>>,
        timeout: Option<Duration>,
    ) -> bool {
        let timeout = timeout.unwrap_or(DEFAULT_DRAIN_TIMEOUT);
        let deadline = Instant::now() + timeout;
        let _ = self.begin(engine);

        let drained = time::timeout_at(deadline, async {
            while engine.session_count() > 0 {
                time::sleep(DRAIN_STEP).await;
            }
            let _ = futures::future::join_all(handles).await;
        })
        .await
        .is_ok();

        if drained {
            info!("shutdown complete");
        } else {
            warn!(
                sessions = engine.session_count(),
                "shutdown timed out after {timeout:?}"
            );
        }
        drained
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::events::{EngineEvent, EventKind};
    use crate::transport::PollingTransport;
    use eio_core::ProtocolVersion;

    #[test]
    fn starts_running() {
        assert!(!ShutdownCoordinator::new().is_shutting_down());
    }

    #[tokio::test]
    async fn begin_closes_sessions_and_cancels_token() {
        let (engine, _incoming) = Engine::builder(EngineConfig::default()).build();
        let mut closes = engine.events().subscribe(EventKind::Close);
        let session = engine.open_session(ProtocolVersion::V4, PollingTransport::new().into());

        let coord = ShutdownCoordinator::new();
        let token = coord.token();
        assert_eq!(coord.begin(&engine), 1);
        assert!(token.is_cancelled());
        assert!(session.cancellation().is_cancelled());
        assert!(matches!(
            closes.recv().await,
            Some(EngineEvent::Close { reason: CloseReason::ServerShutdown, .. })
        ));

        assert_eq!(coord.begin(&engine), 0);
    }

    #[tokio::test]
    async fn graceful_shutdown_drains_registry() {
        let (engine, _incoming) = Engine::builder(EngineConfig::default()).build();
        let _ = engine.open_session(ProtocolVersion::V4, PollingTransport::new().into());
        let _ = engine.open_session(ProtocolVersion::V3, PollingTransport::new().into());

        let coord = ShutdownCoordinator::new();
        let token = coord.token();
        let task = tokio::spawn(async move { token.cancelled().await });

        assert!(
            coord
                .graceful_shutdown(&engine, vec![task], Some(Duration::from_secs(5)))
                .await
        );
        assert_eq!(engine.session_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn graceful_shutdown_gives_up_on_stuck_tasks() {
        let (engine, _incoming) = Engine::builder(EngineConfig::default()).build();
        let coord = ShutdownCoordinator::new();
        // ignores cancellation
        let stuck = tokio::spawn(async {
            time::sleep(Duration::from_secs(300)).await;
        });

        let drained = coord
            .graceful_shutdown(&engine, vec![stuck], Some(Duration::from_millis(100)))
            .await;
        assert!(!drained);
        assert!(coord.is_shutting_down());
    }
}
