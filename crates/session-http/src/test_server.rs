//! Local API stand-in for the HTTP tests.
//!
//! `session=fresh` is the only valid session cookie; everything else gets the
//! auth-expiry signal until `POST /api/auth/refresh` sets it.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use tokio::net::TcpListener;

pub const EXPIRED_BODY: &str = r#"{"error":{"code":"AUTH_EXPIRED","message":"access token expired"}}"#;

pub const EVENTS_BODY: &str =
    "id: 1\nevent: greeting\ndata: hello\n\n: keepalive\n\nid: 2\ndata: line one\ndata: line two\n\n";

#[derive(Clone)]
struct ServerState {
    refreshes: Arc<AtomicUsize>,
    refresh_status: StatusCode,
}

pub struct TestServer {
    pub base_url: String,
    refreshes: Arc<AtomicUsize>,
    _handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    pub fn refreshes(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }
}

/// Start the stand-in. `refresh_status` other than 204 makes every refresh fail.
pub async fn start(refresh_status: StatusCode) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let refreshes = Arc::new(AtomicUsize::new(0));
    let state = ServerState {
        refreshes: refreshes.clone(),
        refresh_status,
    };

    let app = Router::new()
        .route("/api/auth/refresh", post(refresh))
        .route("/api/me", get(me))
        .route("/api/events", get(events))
        .with_state(state);

    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestServer {
        base_url: format!("http://{addr}"),
        refreshes,
        _handle: handle,
    }
}

fn has_fresh_session(headers: &HeaderMap) -> bool {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .any(|v| v.split(';').any(|c| c.trim() == "session=fresh"))
}

fn expired() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [(header::CONTENT_TYPE, "application/json")],
        EXPIRED_BODY,
    )
        .into_response()
}

async fn refresh(State(state): State<ServerState>) -> Response {
    state.refreshes.fetch_add(1, Ordering::SeqCst);
    if state.refresh_status != StatusCode::NO_CONTENT {
        return (state.refresh_status, r#"{"code":"SESSION_REVOKED"}"#).into_response();
    }
    (
        StatusCode::NO_CONTENT,
        [(header::SET_COOKIE, "session=fresh; Path=/")],
    )
        .into_response()
}

async fn me(headers: HeaderMap) -> Response {
    if !has_fresh_session(&headers) {
        return expired();
    }
    (
        [(header::CONTENT_TYPE, "application/json")],
        r#"{"user":"ada"}"#,
    )
        .into_response()
}

async fn events(headers: HeaderMap) -> Response {
    if !has_fresh_session(&headers) {
        return expired();
    }
    let resumed_from = headers
        .get("last-event-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    let body = match resumed_from {
        Some(id) => format!("id: {id}-resumed\ndata: resumed\n\n"),
        None => EVENTS_BODY.to_string(),
    };
    ([(header::CONTENT_TYPE, "text/event-stream")], body).into_response()
}
