//! Error types for refresh coordination

use std::time::Duration;

/// Errors surfaced to callers of the interception layer and stream reconnector.
///
/// `Clone` because one refresh failure is delivered to every waiter.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("session refresh failed: {0}")]
    RefreshFailed(String),

    #[error("credential expired (status {status}, code {code})")]
    SessionExpired { status: u16, code: String },

    #[error("no session refresh settled within {0:?}")]
    RefreshTimedOut(Duration),

    #[error("no session refresh in progress")]
    NotRefreshing,

    #[error("stream connection failed: {0}")]
    Stream(String),
}

/// Result alias for refresh coordination.
pub type Result<T> = std::result::Result<T, Error>;
