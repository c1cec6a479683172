//! Push-stream connection deferral
//!
//! A stream opened mid-refresh would connect with the stale credential, so
//! while a window is open the connection attempt is parked as a factory on the
//! coordinator and only proceeds once the refresh succeeds. Reconnecting a
//! stream that died on its own is the owner's loop: close the stale handle and
//! call `connect` again.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use reqwest::header::HeaderMap;
use tokio::sync::oneshot;
use tracing::{debug, instrument};

use crate::coordinator::{RefreshCoordinator, StreamFactory};
use crate::error::{Error, Result};

/// Connection options passed through to the connector.
#[derive(Debug, Clone, Default)]
pub struct StreamOptions {
    pub headers: HeaderMap,
    /// Resume point for servers that support it (SSE `Last-Event-ID`).
    pub last_event_id: Option<String>,
}

/// Opens a push stream with the current session credentials.
pub trait StreamConnector: Send + Sync {
    type Stream: Send;

    fn open<'a>(
        &'a self,
        url: &'a str,
        options: &'a StreamOptions,
    ) -> Pin<Box<dyn Future<Output = Result<Self::Stream>> + Send + 'a>>;
}

pub struct StreamReconnector<C> {
    coordinator: Arc<RefreshCoordinator>,
    connector: C,
}

impl<C: StreamConnector> StreamReconnector<C> {
    pub fn new(coordinator: Arc<RefreshCoordinator>, connector: C) -> Self {
        Self {
            coordinator,
            connector,
        }
    }

    /// Open the stream now, or after the open refresh window succeeds.
    ///
    /// Fails with `RefreshFailed` when the window it waited on failed; the
    /// connector is never called in that case.
    #[instrument(skip(self, options))]
    pub async fn connect(&self, url: &str, options: &StreamOptions) -> Result<C::Stream> {
        let (ready_tx, ready_rx) = oneshot::channel::<()>();
        let factory: StreamFactory = Box::new(move || {
            let _ = ready_tx.send(());
        });

        match self.coordinator.enqueue_stream_factory(factory) {
            Ok(()) => debug!("session refresh in progress, stream connection deferred"),
            Err(run_now) => run_now(),
        }

        // The coordinator drops the factory uninvoked when the refresh fails.
        ready_rx.await.map_err(|_| {
            Error::RefreshFailed("session refresh failed before stream could connect".into())
        })?;

        debug!("opening push stream");
        self.connector.open(url, options).await
    }
}
