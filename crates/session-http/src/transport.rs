//! reqwest-backed `Transport`

use std::future::Future;
use std::pin::Pin;

use session_refresh::{ApiRequest, ApiResponse, Error, Result, Transport};
use tracing::debug;

use crate::session::Session;

/// Sends calls through the shared session. Every HTTP status is returned as a
/// response; only failing to get one is an error.
pub struct HttpTransport {
    session: Session,
}

impl HttpTransport {
    pub fn new(session: Session) -> Self {
        Self { session }
    }
}

impl Transport for HttpTransport {
    fn send<'a>(
        &'a self,
        request: &'a ApiRequest,
    ) -> Pin<Box<dyn Future<Output = Result<ApiResponse>> + Send + 'a>> {
        Box::pin(async move {
            let url = self.session.url(&request.path);
            let mut builder = self
                .session
                .client()
                .request(request.method.clone(), &url)
                .headers(request.headers.clone())
                .timeout(self.session.timeout());
            if let Some(body) = &request.body {
                builder = builder.body(body.clone());
            }

            let response = builder.send().await.map_err(|e| {
                if e.is_timeout() {
                    Error::Transport(format!(
                        "request to {url} timed out after {}s",
                        self.session.timeout().as_secs()
                    ))
                } else {
                    Error::Transport(format!("request to {url} failed: {e}"))
                }
            })?;

            let status = response.status().as_u16();
            let headers = response.headers().clone();
            let body = response
                .bytes()
                .await
                .map_err(|e| Error::Transport(format!("failed to read response body: {e}")))?;
            debug!(
                request_id = %request.context.request_id,
                status,
                bytes = body.len(),
                "response received"
            );

            Ok(ApiResponse {
                status,
                headers,
                body,
            })
        })
    }
}
