//! Server-sent-events push stream

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use reqwest::header::{ACCEPT, HeaderValue};
use session_refresh::{
    AUTH_EXPIRED_CODE, Error, Result, StreamConnector, StreamOptions, is_auth_expired,
};
use tracing::debug;

use crate::constants::EVENT_STREAM_CONTENT_TYPE;
use crate::session::Session;
use crate::sse::{SseEvent, SseParser};

/// Opens the push stream through the shared session.
///
/// A connect rejected with the auth-expiry signal fails with `SessionExpired`
/// so the owner can recover the session before reconnecting.
pub struct SseConnector {
    session: Session,
}

impl SseConnector {
    pub fn new(session: Session) -> Self {
        Self { session }
    }
}

impl StreamConnector for SseConnector {
    type Stream = EventStream;

    fn open<'a>(
        &'a self,
        url: &'a str,
        options: &'a StreamOptions,
    ) -> Pin<Box<dyn Future<Output = Result<EventStream>> + Send + 'a>> {
        Box::pin(async move {
            let url = self.session.url(url);
            // No timeout: the stream is expected to stay open indefinitely
            let mut builder = self
                .session
                .client()
                .get(&url)
                .headers(options.headers.clone())
                .header(ACCEPT, HeaderValue::from_static(EVENT_STREAM_CONTENT_TYPE));
            if let Some(id) = &options.last_event_id {
                builder = builder.header("last-event-id", id.as_str());
            }

            let response = builder
                .send()
                .await
                .map_err(|e| Error::Stream(format!("connect to {url} failed: {e}")))?;

            let status = response.status().as_u16();
            if !response.status().is_success() {
                let body = response.bytes().await.unwrap_or_default();
                if is_auth_expired(status, &body) {
                    return Err(Error::SessionExpired {
                        status,
                        code: AUTH_EXPIRED_CODE.to_string(),
                    });
                }
                return Err(Error::Stream(format!(
                    "stream endpoint returned {status}: {}",
                    String::from_utf8_lossy(&body)
                )));
            }

            debug!(url, "push stream open");
            Ok(EventStream::new(response))
        })
    }
}

/// An open push stream. Dropping it closes the connection.
pub struct EventStream {
    body: Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>,
    parser: SseParser,
    pending: VecDeque<SseEvent>,
}

impl EventStream {
    fn new(response: reqwest::Response) -> Self {
        Self {
            body: Box::pin(response.bytes_stream()),
            parser: SseParser::new(),
            pending: VecDeque::new(),
        }
    }

    /// Next event; `Ok(None)` when the server closed the stream cleanly.
    pub async fn next_event(&mut self) -> Result<Option<SseEvent>> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Ok(Some(event));
            }
            match self.body.next().await {
                Some(Ok(chunk)) => self.pending.extend(self.parser.push(&chunk)?),
                Some(Err(e)) => return Err(Error::Stream(format!("stream read failed: {e}"))),
                None => return Ok(None),
            }
        }
    }

    pub fn last_event_id(&self) -> Option<&str> {
        self.parser.last_event_id()
    }
}
