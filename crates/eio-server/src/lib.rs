//! # eio-server
//!
//! Realtime transport engine over HTTP long-polling and websocket.
//!
//! - **Engine**: session registry, handshake, request hooks, see [`Engine`]
//! - **Session**: per-connection state machine with an ordered write buffer
//! - **Transports**: polling (one suspended GET at a time) and websocket
//! - **Upgrade**: `2probe` / `3probe` / `5` negotiation from polling to websocket
//! - **Heartbeat**: ping/pong liveness with `pingInterval + pingTimeout` deadline
//! - **Events**: every state change, message, upgrade and error on a broadcast bus
//! - **Server**: axum router, `/health`, optional `/metrics`, graceful shutdown

#![deny(unsafe_code)]

pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod handler;
pub mod health;
pub mod heartbeat;
pub mod hooks;
pub mod metrics;
pub mod server;
pub mod session;
pub mod shutdown;
pub mod socket;
pub mod state;
pub mod transport;

pub use config::{EngineConfig, ServerConfig};
pub use engine::{Engine, EngineBuilder};
pub use error::EngineError;
pub use events::{EngineEvent, EventBus, EventKind, Subscription};
pub use hooks::{HookRejection, RequestHook, RequestInfo};
pub use server::EngineServer;
pub use socket::{Incoming, Socket, SocketHandle};
pub use state::{CloseReason, ReadyState};
