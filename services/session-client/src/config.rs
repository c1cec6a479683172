//! Configuration types and loading
//!
//! Precedence: CLI args > env vars > config file > defaults.
//! The session cookie comes from the SESSION_COOKIE env var or
//! session_cookie_file, never from the TOML itself, so it can't leak
//! through a committed config.

use common::Secret;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub session: SessionConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// API origin and session settings
#[derive(Debug, Deserialize)]
pub struct SessionConfig {
    pub base_url: String,
    #[serde(default = "default_refresh_path")]
    pub refresh_path: String,
    #[serde(default = "default_stream_path")]
    pub stream_path: String,
    /// Optional call issued at startup to confirm the session is usable
    #[serde(default)]
    pub probe_path: Option<String>,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Upper bound on waiting for another caller's refresh. Absent or 0 waits
    /// for as long as the refresh takes.
    #[serde(default)]
    pub wait_timeout_secs: Option<u64>,
    #[serde(default = "default_cookie_name")]
    pub session_cookie_name: String,
    /// Path to a file holding the session cookie value (alternative to SESSION_COOKIE)
    #[serde(default)]
    pub session_cookie_file: Option<PathBuf>,
    #[serde(skip)]
    pub session_cookie: Option<Secret<String>>,
}

/// Push stream settings
#[derive(Debug, Deserialize)]
pub struct StreamConfig {
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_ms: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            reconnect_delay_ms: default_reconnect_delay(),
        }
    }
}

/// Prometheus exporter; disabled when `listen_addr` is absent
#[derive(Debug, Default, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub listen_addr: Option<SocketAddr>,
}

fn default_refresh_path() -> String {
    session_http::DEFAULT_REFRESH_PATH.to_string()
}

fn default_stream_path() -> String {
    session_http::DEFAULT_STREAM_PATH.to_string()
}

fn default_cookie_name() -> String {
    session_http::DEFAULT_SESSION_COOKIE.to_string()
}

fn default_timeout() -> u64 {
    session_http::DEFAULT_TIMEOUT_SECS
}

fn default_reconnect_delay() -> u64 {
    1000
}

impl SessionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn wait_timeout(&self) -> Option<Duration> {
        self.wait_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

impl StreamConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// Session cookie resolution order:
    /// 1. SESSION_COOKIE env var, when non-blank
    /// 2. session_cookie_file path from config
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        if !config.session.base_url.starts_with("http://")
            && !config.session.base_url.starts_with("https://")
        {
            return Err(common::Error::Config(format!(
                "base_url must start with http:// or https://, got: {}",
                config.session.base_url
            )));
        }

        for (name, value) in [
            ("refresh_path", &config.session.refresh_path),
            ("stream_path", &config.session.stream_path),
        ] {
            if !value.starts_with('/') {
                return Err(common::Error::Config(format!(
                    "{name} must start with '/', got: {value}"
                )));
            }
        }

        if config.session.timeout_secs == 0 {
            return Err(common::Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }

        if config.stream.reconnect_delay_ms == 0 {
            return Err(common::Error::Config(
                "reconnect_delay_ms must be greater than 0".into(),
            ));
        }

        let env_cookie = std::env::var("SESSION_COOKIE")
            .ok()
            .map(|cookie| cookie.trim().to_owned())
            .filter(|cookie| !cookie.is_empty());
        if let Some(cookie) = env_cookie {
            config.session.session_cookie = Some(Secret::new(cookie));
        } else if let Some(ref cookie_file) = config.session.session_cookie_file {
            let cookie = std::fs::read_to_string(cookie_file).map_err(|e| {
                common::Error::Config(format!(
                    "failed to read session_cookie_file {}: {e}",
                    cookie_file.display()
                ))
            })?;
            let cookie = cookie.trim().to_owned();
            if !cookie.is_empty() {
                config.session.session_cookie = Some(Secret::new(cookie));
            }
        }

        Ok(config)
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("session-client.toml")
    }
}
