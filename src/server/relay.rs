//! Relay server: the public HTTP surface and per-request correlation.
//!
//! # Responsibilities
//! - `GET /register`: upgrade downstream clients to a websocket and hand
//!   them an app id
//! - Every other path is the proxy plane: frame the request, dispatch it to
//!   the right session, wait for the correlated response
//! - Run one correlator per session that routes inbound responses to their
//!   waiting handlers
//!
//! # Design Decisions
//! - App selection is by the first `.`-label of the Host header; DNS
//!   wildcards and TLS termination happen in front of this process
//! - The wait on a response is bounded; a hung downstream costs a caller at
//!   most the configured timeout, never forever
//! - A response with no waiting handler is logged and discarded; late
//!   or duplicate responses must not take the session down

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::{Request, State, WebSocketUpgrade};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::codec::{self, Frame, Payload};
use crate::config::ServerConfig;
use crate::net::bind_with_fallback;
use crate::server::pending::PendingRequests;
use crate::server::registry::AppRegistry;
use crate::server::session::AppSession;

/// Handshake response header carrying the assigned app id.
pub const APP_ID_HEADER: &str = "x-bore-app-id";

/// Largest external request body the proxy plane will buffer.
const MAX_REQUEST_BODY: usize = 32 * 1024 * 1024;

/// Headers meaningful only for a single transport hop; never relayed.
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "transfer-encoding",
    "upgrade",
    "trailer",
];

/// Shared handles behind every route handler and correlator.
#[derive(Clone)]
pub struct RelayState {
    pub registry: Arc<AppRegistry>,
    pub pending: Arc<PendingRequests>,
    pub request_timeout: Duration,
}

impl RelayState {
    pub fn new(request_timeout: Duration) -> Self {
        Self {
            registry: AppRegistry::new(),
            pending: Arc::new(PendingRequests::new()),
            request_timeout,
        }
    }
}

/// The public relay process.
pub struct BoreServer {
    config: ServerConfig,
    state: RelayState,
}

impl BoreServer {
    pub fn new(config: ServerConfig) -> Self {
        let state = RelayState::new(Duration::from_secs(config.request_timeout_secs));
        Self { config, state }
    }

    /// Handles for tests and embedders.
    pub fn state(&self) -> RelayState {
        self.state.clone()
    }

    /// Bind (with port fallback) and serve until Ctrl+C.
    pub async fn run(self) -> Result<(), std::io::Error> {
        let (listener, addr) = bind_with_fallback(self.config.port).await?;

        tracing::info!(
            address = %addr,
            request_timeout_secs = self.config.request_timeout_secs,
            "bore server listening"
        );

        axum::serve(listener, router(self.state))
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("bore server stopped");
        Ok(())
    }
}

/// Serve the relay on an already-bound listener. `run` wraps this with port
/// fallback and signal handling; embedders and tests call it directly.
pub async fn serve(
    state: RelayState,
    listener: tokio::net::TcpListener,
) -> Result<(), std::io::Error> {
    axum::serve(listener, router(state)).await
}

/// Build the public router: the registration endpoint plus the catch-all
/// proxy plane.
pub fn router(state: RelayState) -> Router {
    Router::new()
        .route("/register", get(register_downstream))
        .fallback(proxy_request)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to install Ctrl+C handler");
        return;
    }
    tracing::info!("shutdown signal received");
}

/// `GET /register`: assign an app id, upgrade, and run the session plus its
/// correlator for as long as the downstream stays connected.
async fn register_downstream(
    State(state): State<RelayState>,
    ws: WebSocketUpgrade,
) -> Response {
    let app_id = match state.registry.allocate_app_id() {
        Ok(app_id) => app_id,
        Err(err) => {
            tracing::error!(error = %err, "app id allocation failed");
            return (StatusCode::INTERNAL_SERVER_ERROR, "could not allocate app id").into_response();
        }
    };

    let Ok(header_value) = HeaderValue::from_str(&app_id) else {
        return (StatusCode::INTERNAL_SERVER_ERROR, "could not allocate app id").into_response();
    };

    let registry = state.registry.clone();
    let pending = state.pending.clone();
    let session_app_id = app_id.clone();

    let mut response = ws.on_upgrade(move |socket| async move {
        let (session, downstream_rx) =
            AppSession::spawn(session_app_id.clone(), socket, Arc::downgrade(&registry));

        if let Err(err) = registry.insert(session.clone()) {
            tracing::warn!(
                app_id = %session_app_id,
                error = %err,
                "lost the app id between allocation and registration, dropping connection"
            );
            session.destroy();
            return;
        }

        tracing::info!(app_id = %session_app_id, "downstream registered");
        correlate_responses(session, downstream_rx, pending).await;
    });

    response.headers_mut().insert(APP_ID_HEADER, header_value);
    response
}

/// One per session: route each inbound response frame to the handler
/// waiting on its message id. Exits when the session closes its queue.
async fn correlate_responses(
    session: Arc<AppSession>,
    mut downstream_rx: mpsc::Receiver<Frame>,
    pending: Arc<PendingRequests>,
) {
    while let Some(frame) = downstream_rx.recv().await {
        if matches!(frame.payload, Payload::Request(_)) {
            tracing::warn!(
                app_id = %session.app_id(),
                message_id = %frame.message_id,
                "unexpected request frame from downstream, discarding"
            );
            continue;
        }

        let message_id = frame.message_id.clone();
        if !pending.complete(&message_id, frame) {
            tracing::warn!(
                app_id = %session.app_id(),
                message_id = %message_id,
                "no subscriber for response, discarding"
            );
        }
    }

    tracing::debug!(app_id = %session.app_id(), "correlator finished");
}

/// The proxy plane: everything that is not `/register`.
async fn proxy_request(State(state): State<RelayState>, request: Request) -> Response {
    let (parts, body) = request.into_parts();

    let Some(app_id) = host_app_id(&parts.headers) else {
        return (StatusCode::BAD_REQUEST, "No app found!").into_response();
    };
    let Some(session) = state.registry.get(&app_id) else {
        tracing::debug!(app_id = %app_id, "request for unknown app");
        return (StatusCode::BAD_REQUEST, "No app found!").into_response();
    };

    let message_id = Uuid::new_v4().to_string();
    let path = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str().to_owned())
        .unwrap_or_else(|| "/".to_owned());

    let body = match axum::body::to_bytes(body, MAX_REQUEST_BODY).await {
        Ok(body) => body,
        Err(err) => {
            tracing::warn!(message_id = %message_id, error = %err, "failed to read request body");
            return (StatusCode::BAD_REQUEST, "failed to read request body").into_response();
        }
    };

    let frame = Frame {
        message_id: message_id.clone(),
        payload: Payload::Request(codec::Request {
            id: message_id.clone(),
            method: parts.method.to_string(),
            path,
            body: body.to_vec(),
            cookies: join_cookies(&parts.headers),
            headers: relay_headers(&parts.headers),
            timestamp: codec::now_millis(),
        }),
    };

    // Subscribe before the frame can possibly be answered.
    let response_rx = state.pending.register(&message_id);

    if let Err(err) = session.write_to_downstream(frame).await {
        state.pending.remove(&message_id);
        tracing::warn!(app_id = %app_id, message_id = %message_id, error = %err, "failed to dispatch request");
        return (StatusCode::BAD_GATEWAY, "downstream unavailable").into_response();
    }

    tracing::debug!(app_id = %app_id, message_id = %message_id, "request dispatched downstream");

    let outcome = timeout(state.request_timeout, response_rx).await;
    state.pending.remove(&message_id);

    match outcome {
        Err(_) => {
            tracing::warn!(app_id = %app_id, message_id = %message_id, "downstream response timed out");
            (StatusCode::GATEWAY_TIMEOUT, "downstream timed out").into_response()
        }
        Ok(Err(_)) => {
            tracing::warn!(app_id = %app_id, message_id = %message_id, "session died while waiting");
            (StatusCode::BAD_GATEWAY, "downstream disconnected").into_response()
        }
        Ok(Ok(frame)) => downstream_response(frame),
    }
}

/// Render a response frame back to the external caller.
fn downstream_response(frame: Frame) -> Response {
    let Payload::Response(res) = frame.payload else {
        tracing::warn!(message_id = %frame.message_id, "downstream delivered a non-response payload");
        return (StatusCode::BAD_GATEWAY, "invalid downstream payload").into_response();
    };

    let status = u16::try_from(res.status_code)
        .ok()
        .and_then(|code| StatusCode::from_u16(code).ok())
        .unwrap_or(StatusCode::BAD_GATEWAY);

    let mut response = Response::new(Body::from(res.body));
    *response.status_mut() = status;

    for (name, value) in &res.headers {
        let Ok(name) = HeaderName::try_from(name.as_str()) else {
            continue;
        };
        let Ok(value) = HeaderValue::from_str(value) else {
            continue;
        };
        response.headers_mut().insert(name, value);
    }

    response
}

/// First `.`-separated label of the Host header.
fn host_app_id(headers: &HeaderMap) -> Option<String> {
    let host = headers.get(header::HOST)?.to_str().ok()?;
    let label = host.split('.').next()?.trim();
    if label.is_empty() {
        return None;
    }
    Some(label.to_string())
}

/// Flatten all Cookie headers into `name=value; ` pairs.
fn join_cookies(headers: &HeaderMap) -> String {
    let mut cookies = String::new();

    for value in headers.get_all(header::COOKIE) {
        let Ok(value) = value.to_str() else { continue };
        for pair in value.split(';') {
            let pair = pair.trim();
            if !pair.is_empty() {
                cookies.push_str(pair);
                cookies.push_str("; ");
            }
        }
    }

    cookies
}

/// Copy request headers for the frame: hop-by-hop headers are dropped, the
/// caller's IP (as reported by the terminator in `X-Real-IP`) is recorded in
/// `X-Forwarded-For`. Host, Cookie, and Content-Length are transport-level
/// here; the frame carries its own host routing, cookie string, and body.
fn relay_headers(headers: &HeaderMap) -> std::collections::HashMap<String, String> {
    let mut out = std::collections::HashMap::new();

    for name in headers.keys() {
        let lower = name.as_str();
        if HOP_BY_HOP_HEADERS.contains(&lower)
            || lower == "host"
            || lower == "cookie"
            || lower == "content-length"
        {
            continue;
        }

        let values: Vec<&str> = headers
            .get_all(name)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect();
        if values.is_empty() {
            continue;
        }

        out.insert(name.as_str().to_string(), values.join(", "));
    }

    if let Some(real_ip) = headers.get("x-real-ip").and_then(|v| v.to_str().ok()) {
        out.insert("X-Forwarded-For".to_string(), real_ip.to_string());
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_map(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, value) in pairs {
            headers.append(
                HeaderName::try_from(*name).unwrap(),
                HeaderValue::from_str(value).unwrap(),
            );
        }
        headers
    }

    #[test]
    fn test_host_app_id_takes_first_label() {
        let headers = header_map(&[("host", "bold-sky-a1b2c.bore.dev")]);
        assert_eq!(host_app_id(&headers).unwrap(), "bold-sky-a1b2c");

        let headers = header_map(&[("host", "abc.bore.dev:8080")]);
        assert_eq!(host_app_id(&headers).unwrap(), "abc");

        assert_eq!(host_app_id(&HeaderMap::new()), None);
    }

    #[test]
    fn test_join_cookies_formats_pairs() {
        let headers = header_map(&[("cookie", "session=abc123; theme=dark")]);
        assert_eq!(join_cookies(&headers), "session=abc123; theme=dark; ");

        assert_eq!(join_cookies(&HeaderMap::new()), "");
    }

    #[test]
    fn test_join_cookies_merges_multiple_headers() {
        let headers = header_map(&[("cookie", "a=1"), ("cookie", "b=2; c=3")]);
        assert_eq!(join_cookies(&headers), "a=1; b=2; c=3; ");
    }

    #[test]
    fn test_relay_headers_strip_hop_by_hop() {
        let headers = header_map(&[
            ("host", "abc.bore.dev"),
            ("connection", "keep-alive"),
            ("keep-alive", "timeout=5"),
            ("proxy-authenticate", "Basic"),
            ("proxy-authorization", "Basic Zm9v"),
            ("te", "trailers"),
            ("transfer-encoding", "chunked"),
            ("upgrade", "h2c"),
            ("trailer", "Expires"),
            ("accept", "text/html"),
            ("x-real-ip", "203.0.113.9"),
        ]);

        let relayed = relay_headers(&headers);

        for hop in HOP_BY_HOP_HEADERS {
            assert!(
                !relayed.keys().any(|k| k.eq_ignore_ascii_case(hop)),
                "{hop} must not be relayed"
            );
        }
        assert!(!relayed.contains_key("host"));
        assert_eq!(relayed.get("accept").map(String::as_str), Some("text/html"));
        assert_eq!(
            relayed.get("X-Forwarded-For").map(String::as_str),
            Some("203.0.113.9")
        );
    }

    #[test]
    fn test_relay_headers_join_repeated_values() {
        let headers = header_map(&[("accept", "text/html"), ("accept", "application/json")]);
        let relayed = relay_headers(&headers);
        assert_eq!(
            relayed.get("accept").map(String::as_str),
            Some("text/html, application/json")
        );
    }

    #[test]
    fn test_downstream_response_preserves_status_and_headers() {
        let frame = Frame {
            message_id: "m".to_string(),
            payload: Payload::Response(codec::Response {
                id: "m".to_string(),
                status_code: 418,
                body: b"short and stout".to_vec(),
                headers: std::collections::HashMap::from([(
                    "content-type".to_string(),
                    "text/plain".to_string(),
                )]),
                timestamp: 0,
            }),
        };

        let response = downstream_response(frame);
        assert_eq!(response.status(), StatusCode::IM_A_TEAPOT);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "text/plain"
        );
    }

    #[test]
    fn test_downstream_response_rejects_bad_status() {
        let frame = Frame {
            message_id: "m".to_string(),
            payload: Payload::Response(codec::Response {
                id: "m".to_string(),
                status_code: -7,
                ..codec::Response::default()
            }),
        };

        assert_eq!(downstream_response(frame).status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_request_payload_from_downstream_is_rejected() {
        let frame = Frame {
            message_id: "m".to_string(),
            payload: Payload::Request(codec::Request::default()),
        };
        assert_eq!(downstream_response(frame).status(), StatusCode::BAD_GATEWAY);
    }
}
