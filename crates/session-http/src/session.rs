//! Shared HTTP session: client, base URL and cookie jar

use std::sync::Arc;
use std::time::Duration;

use common::Secret;
use reqwest::Url;
use reqwest::cookie::Jar;
use session_refresh::{Error, Result};
use tracing::debug;

/// One logged-in session against one API origin.
///
/// Cloning is cheap: clones share the client, connection pool and cookie jar.
#[derive(Clone)]
pub struct Session {
    client: reqwest::Client,
    jar: Arc<Jar>,
    base_url: Url,
    timeout: Duration,
}

impl Session {
    /// Build a session for `base_url` (http or https). `timeout` applies to
    /// ordinary calls and the refresh call, never to the push stream.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| Error::Transport(format!("invalid base url {base_url}: {e}")))?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(Error::Transport(format!(
                "base url must be http or https, got: {base_url}"
            )));
        }

        let jar = Arc::new(Jar::default());
        let client = reqwest::Client::builder()
            .cookie_provider(jar.clone())
            .build()
            .map_err(|e| Error::Transport(format!("failed to build http client: {e}")))?;

        Ok(Self {
            client,
            jar,
            base_url,
            timeout,
        })
    }

    /// Seed the jar with an existing session cookie for the base URL.
    pub fn seed_cookie(&self, name: &str, value: &Secret<String>) {
        let cookie = format!("{name}={}; Path=/", value.expose());
        self.jar.add_cookie_str(&cookie, &self.base_url);
        debug!(cookie = name, "session cookie seeded");
    }

    /// Absolute URL for a path (and query) relative to the base URL.
    pub fn url(&self, path: &str) -> String {
        let base = self.base_url.as_str().trim_end_matches('/');
        if path.starts_with('/') {
            format!("{base}{path}")
        } else {
            format!("{base}/{path}")
        }
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}
