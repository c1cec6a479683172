//! Refresh endpoint client
//!
//! The refresh call carries no body: the session cookie in the shared jar is
//! the proof of session, and a successful response rotates it via
//! `Set-Cookie`. The new credential is therefore in effect for every later
//! call as soon as this returns `Ok`.

use std::future::Future;
use std::pin::Pin;

use session_refresh::{Error, RefreshOperation, Result};
use tracing::debug;

use crate::session::Session;

pub struct HttpRefresher {
    session: Session,
    path: String,
}

impl HttpRefresher {
    pub fn new(session: Session, path: impl Into<String>) -> Self {
        Self {
            session,
            path: path.into(),
        }
    }
}

impl RefreshOperation for HttpRefresher {
    fn refresh(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            let url = self.session.url(&self.path);
            let response = self
                .session
                .client()
                .post(&url)
                .timeout(self.session.timeout())
                .send()
                .await
                .map_err(|e| Error::RefreshFailed(format!("refresh request failed: {e}")))?;

            let status = response.status();
            if status.is_success() {
                debug!(status = status.as_u16(), "refresh endpoint accepted session");
                return Ok(());
            }

            let body = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("<no body>"));

            // 401/403 means the session itself is gone, not a transient failure
            if status.as_u16() == 401 || status.as_u16() == 403 {
                return Err(Error::RefreshFailed(format!(
                    "session rejected ({status}): {body}"
                )));
            }

            Err(Error::RefreshFailed(format!(
                "refresh endpoint returned {status}: {body}"
            )))
        })
    }
}
