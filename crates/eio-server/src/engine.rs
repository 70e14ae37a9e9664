//! Connection registry and handshake.
//!
//! The [`Engine`] owns every live [`Session`], keyed by id, together with the
//! configuration, the event bus and the request hooks. It creates sessions on
//! handshake, supervises their heartbeat, and removes them once closed.

use std::sync::Arc;

use axum::http::HeaderMap;
use dashmap::DashMap;
use eio_core::{OpenPacket, ProtocolVersion, SessionId};
use metrics::{counter, gauge};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::events::{DEFAULT_EVENT_CAPACITY, EngineEvent, EventBus};
use crate::heartbeat::{HeartbeatResult, run_heartbeat};
use crate::hooks::{RequestHook, RequestInfo};
use crate::metrics::{SESSIONS_ACTIVE, SESSIONS_OPENED_TOTAL};
use crate::session::Session;
use crate::socket::{Incoming, Socket};
use crate::state::CloseReason;
use crate::transport::{ActiveTransport, Transport};

/// Builder for [`Engine`].
pub struct EngineBuilder {
    config: EngineConfig,
    hooks: Vec<Arc<dyn RequestHook>>,
    event_capacity: usize,
}

impl EngineBuilder {
    /// Append a request hook. Hooks run in the order they are added.
    #[must_use]
    pub fn hook(mut self, hook: impl RequestHook) -> Self {
        self.hooks.push(Arc::new(hook));
        self
    }

    /// Capacity of the event bus.
    #[must_use]
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Build the engine and the stream of incoming sockets.
    pub fn build(self) -> (Arc<Engine>, Incoming) {
        let (tx, rx) = mpsc::unbounded_channel();
        let engine = Engine {
            config: Arc::new(self.config),
            sessions: Arc::new(DashMap::new()),
            events: EventBus::new(self.event_capacity),
            hooks: self.hooks,
            incoming: tx,
        };
        (Arc::new(engine), Incoming::new(rx))
    }
}

/// Session registry.
pub struct Engine {
    config: Arc<EngineConfig>,
    sessions: Arc<DashMap<SessionId, Arc<Session>>>,
    events: EventBus,
    hooks: Vec<Arc<dyn RequestHook>>,
    incoming: mpsc::UnboundedSender<Socket>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("sessions", &self.sessions.len())
            .field("hooks", &self.hooks.len())
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Start building an engine with `config`.
    pub fn builder(config: EngineConfig) -> EngineBuilder {
        EngineBuilder {
            config,
            hooks: Vec::new(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }

    /// Engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Observer bus.
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Look up a live session.
    pub fn session(&self, sid: &str) -> Option<Arc<Session>> {
        self.sessions.get(sid).map(|entry| Arc::clone(entry.value()))
    }

    /// Look up a live session or fail with `UnknownSession`.
    pub fn lookup(&self, sid: &str) -> Result<Arc<Session>, EngineError> {
        self.session(sid)
            .ok_or_else(|| EngineError::UnknownSession(sid.to_string()))
    }

    /// Number of registered sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Run every hook in order; the first rejection wins.
    pub fn run_hooks(
        &self,
        request: &RequestInfo<'_>,
        response_headers: &mut HeaderMap,
    ) -> Result<(), EngineError> {
        for hook in &self.hooks {
            if let Err(rejection) = hook.on_request(request, response_headers) {
                warn!(reason = %rejection.reason, "request rejected by hook");
                return Err(EngineError::Forbidden(rejection.reason));
            }
        }
        Ok(())
    }

    /// Create and register a session on `transport`, queue its `open` packet
    /// and hand a [`Socket`] to the application.
    pub(crate) fn open_session(
        &self,
        protocol: ProtocolVersion,
        transport: ActiveTransport,
    ) -> Arc<Session> {
        let kind = transport.kind();
        let sid = SessionId::random();
        let (session, inbound) = Session::new(
            sid.clone(),
            protocol,
            Arc::clone(&self.config),
            self.events.clone(),
            transport,
        );

        let handshake = OpenPacket {
            sid: sid.clone(),
            upgrades: self.config.upgrades_for(kind),
            ping_interval: duration_ms(self.config.ping_interval),
            ping_timeout: duration_ms(self.config.ping_timeout),
            max_payload: (protocol == ProtocolVersion::V4).then_some(self.config.max_payload),
        };
        session.open(handshake.to_packet());
        let _ = self.sessions.insert(sid.clone(), Arc::clone(&session));

        counter!(SESSIONS_OPENED_TOTAL, "transport" => kind.as_str()).increment(1);
        gauge!(SESSIONS_ACTIVE).increment(1.0);
        info!(%sid, transport = %kind, %protocol, "session opened");

        self.supervise(Arc::clone(&session));
        self.events.emit(EngineEvent::Connection {
            sid,
            transport: kind,
        });
        if self
            .incoming
            .send(Socket::new(Arc::clone(&session), inbound))
            .is_err()
        {
            debug!("no application listening for new sessions");
        }
        session
    }

    fn supervise(&self, session: Arc<Session>) {
        let sessions = Arc::clone(&self.sessions);
        let _ = tokio::spawn(async move {
            if run_heartbeat(Arc::clone(&session)).await == HeartbeatResult::TimedOut {
                session.report_error(EngineError::HeartbeatTimeout);
                session.close(CloseReason::PingTimeout);
            }
            let _ = sessions.remove(session.id());
            debug!(sid = %session.id(), "session removed from registry");
        });
    }

    /// Close every session.
    pub fn close_all(&self, reason: CloseReason) {
        let sessions: Vec<Arc<Session>> = self
            .sessions
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        for session in sessions {
            session.close(reason);
        }
    }
}

fn duration_ms(duration: std::time::Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
