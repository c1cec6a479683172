//! Session credential refresh coordination
//!
//! When a session's short-lived access credential expires, every in-flight
//! call and the push stream can discover it at the same moment. This crate
//! makes sure exactly one refresh runs and everyone else waits for its
//! outcome instead of stampeding the refresh endpoint.
//!
//! Flow:
//! 1. `RequestInterceptionLayer::execute()` dispatches a call through a `Transport`
//! 2. A 401 with code `AUTH_EXPIRED` sends the call to `RefreshCoordinator::acquire()`
//! 3. The first caller becomes the refresher and spawns the `RefreshOperation`
//! 4. Everyone else holds a `Continuation` until `finish()` settles it
//! 5. Each released call is replayed once; a second expiry is a hard failure
//! 6. `StreamReconnector::connect()` defers push-stream connections opened mid-refresh

pub mod coordinator;
pub mod error;
pub mod expiry;
pub mod interceptor;
pub mod metrics;
pub mod stream;

pub use coordinator::{
    Continuation, QueueDepths, RefreshCoordinator, RefreshGuard, RefreshOutcome, RefreshTicket,
    StreamFactory,
};
pub use error::{Error, Result};
pub use expiry::{AUTH_EXPIRED_CODE, error_code, is_auth_expired};
pub use interceptor::{
    ApiRequest, ApiResponse, CallContext, RefreshOperation, RequestInterceptionLayer, Transport,
};
pub use stream::{StreamConnector, StreamOptions, StreamReconnector};
