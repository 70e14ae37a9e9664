//! Echo behaviour: greet, echo, and reflect the `X-EngineIO` request header.
//!
//! The reflected header carries two values, [`GREETING`] and then the
//! request's own value, on polling responses and on the websocket handshake.

use axum::http::{HeaderMap, HeaderValue};
use eio_server::{HookRejection, Incoming, RequestInfo, Socket};
use eio_settings::EngineSettings;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Header copied from request to response.
pub const ECHO_HEADER: &str = "x-engineio";

/// Greeting sent to every new client.
pub const GREETING: &str = "hi";

/// Heartbeat interval the fixture runs with unless configured otherwise.
pub const PING_INTERVAL_MS: u64 = 500;

/// Settings the fixture layers its file and environment over.
pub fn base_settings() -> EngineSettings {
    let mut settings = EngineSettings::default();
    settings.engine.ping_interval_ms = PING_INTERVAL_MS;
    settings
}

/// Request hook answering [`ECHO_HEADER`] with `hi` followed by the request value.
pub fn echo_header(
    request: &RequestInfo<'_>,
    response_headers: &mut HeaderMap,
) -> Result<(), HookRejection> {
    if let Some(value) = request.headers.get(ECHO_HEADER) {
        let _ = response_headers.append(ECHO_HEADER, HeaderValue::from_static(GREETING));
        let _ = response_headers.append(ECHO_HEADER, value.clone());
    }
    Ok(())
}

/// Serve every incoming socket until the engine goes away.
pub async fn run(mut incoming: Incoming) {
    while let Some(socket) = incoming.next().await {
        let _ = serve(socket);
    }
    debug!("engine dropped, echo loop done");
}

fn serve(socket: Socket) -> JoinHandle<()> {
    let handle = socket.handle();
    info!(sid = %socket.id(), transport = %socket.transport(), "client connected");
    if let Err(error) = handle.send(GREETING) {
        warn!(sid = %handle.id(), %error, "greeting not sent");
    }
    socket.on_message(move |payload| {
        if let Err(error) = handle.send(payload) {
            debug!(sid = %handle.id(), %error, "echo dropped");
        }
    })
}
