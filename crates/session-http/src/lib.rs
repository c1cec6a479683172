//! HTTP collaborators for the refresh coordinator
//!
//! reqwest-backed implementations of the traits `session-refresh` calls out to:
//! - `HttpTransport` (`Transport`): ordinary calls against the API base URL
//! - `HttpRefresher` (`RefreshOperation`): POSTs the refresh endpoint
//! - `SseConnector` (`StreamConnector`): opens the server-sent-events push stream
//!
//! All three share one `Session`: a reqwest client whose cookie jar carries
//! the session context, so a successful refresh (a `Set-Cookie` on the
//! refresh response) is picked up by every later call without extra plumbing.

pub mod constants;
pub mod refresh;
pub mod session;
pub mod sse;
pub mod stream;
pub mod transport;

pub use constants::*;
pub use refresh::HttpRefresher;
pub use session::Session;
pub use sse::{SseEvent, SseParser};
pub use stream::{EventStream, SseConnector};
pub use transport::HttpTransport;

#[cfg(test)]
mod test_server;
