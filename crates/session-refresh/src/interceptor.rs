//! Request interception layer
//!
//! Wraps every outgoing call. An auth-expiry response sends the call through
//! the coordinator: the first caller refreshes, the rest wait, and each call
//! is replayed at most once. Everything else passes through untouched.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use reqwest::Method;
use reqwest::header::HeaderMap;
use tracing::{Instrument, debug, info, instrument, warn};

use crate::coordinator::{Continuation, RefreshCoordinator, RefreshOutcome, RefreshTicket};
use crate::error::{Error, Result};
use crate::expiry::{AUTH_EXPIRED_CODE, is_auth_expired};

/// Per-call bookkeeping. Never sent on the wire.
#[derive(Debug, Clone)]
pub struct CallContext {
    pub request_id: String,
    /// Set each time the call is handed to the transport.
    pub dispatched_at: Option<Instant>,
    /// One-shot retry marker: set once the call has been through a refresh.
    pub retried: bool,
}

impl CallContext {
    pub fn new() -> Self {
        Self {
            request_id: format!("req_{}", uuid::Uuid::new_v4().as_simple()),
            dispatched_at: None,
            retried: false,
        }
    }
}

impl Default for CallContext {
    fn default() -> Self {
        Self::new()
    }
}

/// A replayable call. The body is `Bytes` so a replay is a cheap clone.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    /// Path and query, relative to the transport's base URL.
    pub path: String,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
    pub context: CallContext,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            body: None,
            context: CallContext::new(),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>, body: impl Into<Bytes>) -> Self {
        let mut request = Self::new(Method::POST, path);
        request.body = Some(body.into());
        request
    }
}

/// A fully-read response.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ApiResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Issues calls on behalf of the interception layer.
///
/// Any HTTP status is a successful send; `Err` is reserved for failures to get
/// a response at all. Uses `Pin<Box<dyn Future>>` so it can sit behind `Arc<dyn Transport>`.
pub trait Transport: Send + Sync {
    fn send<'a>(
        &'a self,
        request: &'a ApiRequest,
    ) -> Pin<Box<dyn Future<Output = Result<ApiResponse>> + Send + 'a>>;
}

/// The external credential refresh.
///
/// `Ok(())` means a new credential is in effect for subsequent calls; any
/// error means the session is over.
pub trait RefreshOperation: Send + Sync {
    fn refresh(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Wraps a transport with single-flight credential refresh.
pub struct RequestInterceptionLayer {
    coordinator: Arc<RefreshCoordinator>,
    transport: Arc<dyn Transport>,
    refresher: Arc<dyn RefreshOperation>,
    wait_timeout: Option<Duration>,
}

impl RequestInterceptionLayer {
    pub fn new(
        coordinator: Arc<RefreshCoordinator>,
        transport: Arc<dyn Transport>,
        refresher: Arc<dyn RefreshOperation>,
    ) -> Self {
        Self {
            coordinator,
            transport,
            refresher,
            wait_timeout: None,
        }
    }

    /// Bound how long a waiter blocks on someone else's refresh. `None` (the
    /// default) waits for as long as the refresh takes.
    pub fn with_wait_timeout(mut self, wait_timeout: Option<Duration>) -> Self {
        self.wait_timeout = wait_timeout;
        self
    }

    pub fn coordinator(&self) -> &Arc<RefreshCoordinator> {
        &self.coordinator
    }

    /// Send a call, transparently recovering from one credential expiry.
    ///
    /// Non-expiry responses (any status) and transport errors are returned
    /// unchanged. A call that is still expired after its one replay fails
    /// with `SessionExpired`; a failed refresh fails with `RefreshFailed`.
    #[instrument(skip_all, fields(request_id = %request.context.request_id, method = %request.method, path = %request.path))]
    pub async fn execute(&self, mut request: ApiRequest) -> Result<ApiResponse> {
        loop {
            let response = self.dispatch(&mut request).await?;
            if !is_auth_expired(response.status, &response.body) {
                return Ok(response);
            }

            if request.context.retried {
                warn!("credential still expired after refresh, giving up");
                return Err(Error::SessionExpired {
                    status: response.status,
                    code: AUTH_EXPIRED_CODE.to_string(),
                });
            }
            request.context.retried = true;

            debug!("credential expired");
            self.recover().await?;
            crate::metrics::record_replay();
            debug!("replaying call with refreshed credential");
        }
    }

    /// Refresh the session, or wait for the refresh already running.
    ///
    /// Shared by `execute` and by anything else that sees the expiry signal
    /// (e.g. a push stream rejected at connect time). The refresh itself runs
    /// on a spawned task, so dropping the caller that opened the window only
    /// drops that caller's wait; the refresh and every other waiter carry on.
    pub async fn recover(&self) -> Result<()> {
        let continuation = match self.coordinator.acquire() {
            RefreshTicket::Refresher(guard) => {
                let continuation = guard.subscribe();
                let refresher = Arc::clone(&self.refresher);
                tokio::spawn(
                    async move {
                        info!("refreshing session credential");
                        let outcome = match refresher.refresh().await {
                            Ok(()) => RefreshOutcome::Success,
                            Err(Error::RefreshFailed(reason)) => {
                                warn!(error = %reason, "session refresh failed");
                                RefreshOutcome::Failure(reason)
                            }
                            Err(e) => {
                                warn!(error = %e, "session refresh failed");
                                RefreshOutcome::Failure(e.to_string())
                            }
                        };
                        guard.finish(outcome);
                    }
                    .in_current_span(),
                );
                continuation
            }
            RefreshTicket::Waiter(continuation) => continuation,
        };
        self.wait_for(continuation).await
    }

    async fn wait_for(&self, continuation: Continuation) -> Result<()> {
        match self.wait_timeout {
            Some(limit) => tokio::time::timeout(limit, continuation.wait())
                .await
                .map_err(|_| {
                    warn!(
                        timeout_secs = limit.as_secs(),
                        "gave up waiting for session refresh"
                    );
                    Error::RefreshTimedOut(limit)
                })?,
            None => continuation.wait().await,
        }
    }

    async fn dispatch(&self, request: &mut ApiRequest) -> Result<ApiResponse> {
        let dispatched_at = Instant::now();
        request.context.dispatched_at = Some(dispatched_at);
        let response = self.transport.send(request).await?;
        crate::metrics::record_request(response.status, dispatched_at.elapsed().as_secs_f64());
        Ok(response)
    }
}
