//! Default endpoint layout
//!
//! Overridable from the `[session]` config section.

/// Refresh endpoint, relative to the base URL
pub const DEFAULT_REFRESH_PATH: &str = "/api/auth/refresh";

/// Server-sent events endpoint, relative to the base URL
pub const DEFAULT_STREAM_PATH: &str = "/api/events";

/// Name of the session cookie seeded from config
pub const DEFAULT_SESSION_COOKIE: &str = "session";

/// Per-request timeout for ordinary calls and the refresh call
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// `Accept` value for the push stream
pub const EVENT_STREAM_CONTENT_TYPE: &str = "text/event-stream";

/// Longest push-stream line accepted before the stream is treated as broken
pub const MAX_SSE_LINE_BYTES: usize = 1024 * 1024;
