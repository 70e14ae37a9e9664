//! Request hooks.
//!
//! Hooks run in registration order before the engine looks at a request, for
//! polling requests and websocket handshakes alike. A hook can add response
//! headers or reject the request with `403`.

use axum::http::{HeaderMap, Method, Uri};

use crate::handler::EngineQuery;

/// What a hook gets to see of an incoming request.
#[derive(Debug)]
pub struct RequestInfo<'a> {
    /// HTTP method.
    pub method: &'a Method,
    /// Request URI.
    pub uri: &'a Uri,
    /// Parsed engine query parameters.
    pub query: &'a EngineQuery,
    /// Request headers.
    pub headers: &'a HeaderMap,
}

/// A hook refused the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookRejection {
    /// Reason, logged server-side.
    pub reason: String,
}

impl HookRejection {
    /// Reject with a reason.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Callback evaluated before core request handling.
pub trait RequestHook: Send + Sync + 'static {
    /// Inspect the request; append to `response_headers` or reject.
    fn on_request(
        &self,
        request: &RequestInfo<'_>,
        response_headers: &mut HeaderMap,
    ) -> Result<(), HookRejection>;
}

impl<F> RequestHook for F
where
    F: Fn(&RequestInfo<'_>, &mut HeaderMap) -> Result<(), HookRejection> + Send + Sync + 'static,
{
    fn on_request(
        &self,
        request: &RequestInfo<'_>,
        response_headers: &mut HeaderMap,
    ) -> Result<(), HookRejection> {
        self(request, response_headers)
    }
}
