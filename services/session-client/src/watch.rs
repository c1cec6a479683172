//! Push stream watch loop
//!
//! Owns the reconnect loop around `StreamReconnector`: connect, consume
//! events, and on a dead stream drop the stale handle and connect again. A
//! connect rejected with an expired credential goes through the same refresh
//! window as ordinary calls before the next attempt.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use session_http::{EventStream, SseEvent};
use session_refresh::{
    Error, RequestInterceptionLayer, Result, StreamConnector, StreamOptions, StreamReconnector,
};
use tracing::{debug, info, warn};

/// Event source the loop can drain.
pub trait PushStream: Send {
    fn next_event(&mut self) -> Pin<Box<dyn Future<Output = Result<Option<SseEvent>>> + Send + '_>>;
}

impl PushStream for EventStream {
    fn next_event(&mut self) -> Pin<Box<dyn Future<Output = Result<Option<SseEvent>>> + Send + '_>> {
        Box::pin(EventStream::next_event(self))
    }
}

/// Run the stream until the session ends, calling `on_event` for every event.
///
/// Returns the error that ended the session: a failed refresh, or a stream
/// still rejected as expired right after a successful refresh. Giving up on
/// a slow refresh is not an ending; the loop just tries again.
pub async fn watch<C>(
    reconnector: &StreamReconnector<C>,
    layer: &RequestInterceptionLayer,
    path: &str,
    reconnect_delay: Duration,
    mut on_event: impl FnMut(SseEvent) + Send,
) -> Error
where
    C: StreamConnector,
    C::Stream: PushStream,
{
    let mut options = StreamOptions::default();
    // One-shot marker, as for ordinary calls: set after a refresh, cleared
    // once a connect succeeds.
    let mut recovered = false;

    loop {
        let mut stream = match reconnector.connect(path, &options).await {
            Ok(stream) => stream,
            Err(Error::SessionExpired { status, code }) => {
                if recovered {
                    warn!("push stream still rejected after refresh, giving up");
                    return Error::SessionExpired { status, code };
                }
                info!("push stream rejected with expired credential, refreshing");
                match layer.recover().await {
                    Ok(()) => recovered = true,
                    // The refresh is still running; the next connect is
                    // deferred until it settles.
                    Err(Error::RefreshTimedOut(limit)) => {
                        warn!(
                            timeout_secs = limit.as_secs(),
                            retry_in_ms = reconnect_delay.as_millis() as u64,
                            "refresh still running, reconnecting later"
                        );
                        tokio::time::sleep(reconnect_delay).await;
                    }
                    Err(e) => return e,
                }
                continue;
            }
            Err(e @ Error::RefreshFailed(_)) => return e,
            Err(e) => {
                warn!(
                    error = %e,
                    retry_in_ms = reconnect_delay.as_millis() as u64,
                    "push stream connect failed"
                );
                tokio::time::sleep(reconnect_delay).await;
                continue;
            }
        };

        recovered = false;
        info!(path, "push stream connected");

        loop {
            match stream.next_event().await {
                Ok(Some(event)) => {
                    if let Some(id) = &event.id {
                        options.last_event_id = Some(id.clone());
                    }
                    debug!(event = %event.event, "push event received");
                    on_event(event);
                }
                Ok(None) => {
                    info!("push stream closed by server");
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "push stream failed");
                    break;
                }
            }
        }

        drop(stream);
        tokio::time::sleep(reconnect_delay).await;
    }
}
