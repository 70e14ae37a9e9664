//! HTTP entry point for both transports.
//!
//! Every request to the engine path runs the request hooks, then is routed by
//! `transport`, method and `sid`:
//!
//! | transport | method | sid | action |
//! |---|---|---|---|
//! | polling | GET | none | handshake, answer with the `open` batch |
//! | polling | GET | some | long-poll for the next batch |
//! | polling | POST | some | decode and deliver one client batch |
//! | websocket | GET | none | handshake directly on websocket |
//! | websocket | GET | some | join the session as a pending upgrade |
//!
//! Anything else is a bad handshake method.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::rejection::{BytesRejection, FailedToBufferBody};
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{FromRequest, FromRequestParts, Query, Request, State};
use axum::http::{HeaderMap, HeaderValue, Method, header};
use axum::response::{IntoResponse, Response};
use eio_core::codec::decode_payload_bytes;
use eio_core::{ProtocolVersion, SessionId, TransportKind, encode_payload};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::engine::Engine;
use crate::error::EngineError;
use crate::hooks::RequestInfo;
use crate::server::AppState;
use crate::session::Session;
use crate::state::CloseReason;
use crate::transport::PollingTransport;
use crate::transport::websocket::run_websocket;

const POLLING_CONTENT_TYPE: &str = "text/plain; charset=UTF-8";

/// Engine query parameters.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct EngineQuery {
    /// Protocol revision (`EIO`).
    #[serde(rename = "EIO")]
    pub eio: Option<String>,
    /// Requested transport name.
    pub transport: Option<String>,
    /// Session id, absent on handshake.
    pub sid: Option<String>,
}

impl EngineQuery {
    /// Negotiated protocol revision.
    pub fn protocol(&self) -> Result<ProtocolVersion, EngineError> {
        let raw = self.eio.as_deref().unwrap_or_default();
        ProtocolVersion::parse(raw).ok_or_else(|| EngineError::UnsupportedProtocol(raw.to_string()))
    }

    /// Requested transport, if known and enabled in `config`.
    pub fn transport_kind(&self, config: &EngineConfig) -> Result<TransportKind, EngineError> {
        let raw = self.transport.as_deref().unwrap_or_default();
        raw.parse::<TransportKind>()
            .ok()
            .filter(|kind| config.allows(*kind))
            .ok_or_else(|| EngineError::UnknownTransport(raw.to_string()))
    }
}

/// Serve one request on the engine path.
pub async fn handle_request(State(state): State<AppState>, request: Request) -> Response {
    let query = Query::<EngineQuery>::try_from_uri(request.uri())
        .map(|Query(query)| query)
        .unwrap_or_default();

    let mut hook_headers = HeaderMap::new();
    let admitted = {
        let info = RequestInfo {
            method: request.method(),
            uri: request.uri(),
            query: &query,
            headers: request.headers(),
        };
        state.engine.run_hooks(&info, &mut hook_headers)
    };

    let result = match admitted {
        Ok(()) => dispatch(&state.engine, query, request).await,
        Err(error) => Err(error),
    };
    let mut response = result.unwrap_or_else(|error| {
        warn!(code = error.code(), kind = error.kind(), %error, "request rejected");
        error.into_response()
    });
    response.headers_mut().extend(hook_headers);
    response
}

async fn dispatch(
    engine: &Arc<Engine>,
    query: EngineQuery,
    request: Request,
) -> Result<Response, EngineError> {
    let kind = query.transport_kind(engine.config())?;
    let protocol = query.protocol()?;
    let method = request.method().clone();

    match (kind, method, query.sid) {
        (TransportKind::Websocket, Method::GET, sid) => {
            websocket(engine, protocol, sid, request).await
        }
        (TransportKind::Polling, Method::GET, None) => {
            let session = engine.open_session(protocol, PollingTransport::new().into());
            poll(&session).await
        }
        (TransportKind::Polling, Method::GET, Some(sid)) => poll(&*engine.lookup(&sid)?).await,
        (TransportKind::Polling, Method::POST, Some(sid)) => {
            post(&*engine.lookup(&sid)?, request).await
        }
        _ => Err(EngineError::BadHandshakeMethod),
    }
}

fn polling_response(body: impl IntoResponse) -> Response {
    (
        [(header::CONTENT_TYPE, HeaderValue::from_static(POLLING_CONTENT_TYPE))],
        body,
    )
        .into_response()
}

async fn poll(session: &Session) -> Result<Response, EngineError> {
    let packets = session.poll().await?;
    debug!(sid = %session.id(), count = packets.len(), "answering poll");
    Ok(polling_response(encode_payload(&packets, session.protocol())?))
}

/// Deliver one client batch.
///
/// The body limit comes from the router's `DefaultBodyLimit` layer. A body
/// over the limit leaves the session open; any other read failure means the
/// client went away mid-request and closes it with `transport error`.
async fn post(session: &Session, request: Request) -> Result<Response, EngineError> {
    if !session.state().is_live() {
        return Err(EngineError::SessionClosed);
    }
    if session.transport_kind() != TransportKind::Polling {
        return Err(EngineError::TransportMismatch(
            "session is not using polling".into(),
        ));
    }

    let bytes = match Bytes::from_request(request, &()).await {
        Ok(bytes) => bytes,
        Err(BytesRejection::FailedToBufferBody(FailedToBufferBody::LengthLimitError(_))) => {
            let error = EngineError::PayloadTooLarge {
                limit: session.config().max_payload,
            };
            debug!(sid = %session.id(), %error, "request body rejected");
            session.report_error(error.clone());
            return Err(error);
        }
        Err(rejection) => {
            let error = EngineError::Transport(rejection.body_text());
            session.report_error(error.clone());
            session.close(CloseReason::TransportError);
            return Err(error);
        }
    };

    match decode_payload_bytes(&bytes, session.protocol()) {
        Ok(packets) => {
            session.reset_decode_errors();
            debug!(sid = %session.id(), count = packets.len(), "received batch");
            for packet in packets {
                session.receive(packet);
            }
            Ok(polling_response("ok"))
        }
        Err(error) => {
            session.record_decode_error(error.clone());
            Err(EngineError::Decode(error))
        }
    }
}

async fn websocket(
    engine: &Arc<Engine>,
    protocol: ProtocolVersion,
    sid: Option<String>,
    request: Request,
) -> Result<Response, EngineError> {
    let sid: Option<SessionId> = match sid {
        Some(sid) => {
            let session = engine.lookup(&sid)?;
            session.check_upgrade()?;
            Some(session.id().clone())
        }
        None => None,
    };

    let (mut parts, _body) = request.into_parts();
    let upgrade = WebSocketUpgrade::from_request_parts(&mut parts, &())
        .await
        .map_err(|rejection| EngineError::TransportMismatch(rejection.body_text()))?;

    let max_message = engine.config().max_payload_bytes();
    let engine = Arc::clone(engine);
    Ok(upgrade
        .max_message_size(max_message)
        .on_upgrade(move |socket| run_websocket(engine, socket, protocol, sid)))
}
