//! Compute client configuration.

use std::time::Duration;

use serde::Deserialize;

/// Configuration for a single compute agent connection.
#[derive(Debug, Clone, Deserialize)]
pub struct ComputeConfig {
    /// Base URL of the compute agent (e.g., "http://compute-1:3080").
    pub base_url: String,

    /// Host advertised to clients that want to reach consoles on this
    /// compute. Defaults to the host component of `base_url`.
    #[serde(default)]
    pub console_host: Option<String>,

    /// Per-request timeout in seconds for ordinary calls. Individual
    /// requests may override this (long-running queries, image uploads).
    #[serde(default = "ComputeConfig::default_request_timeout")]
    pub request_timeout_seconds: u64,

    /// Connection establishment timeout in seconds.
    #[serde(default = "ComputeConfig::default_connect_timeout")]
    pub connect_timeout_seconds: u64,
}

impl ComputeConfig {
    /// Create a configuration with defaults for the given base URL.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            console_host: None,
            request_timeout_seconds: Self::default_request_timeout(),
            connect_timeout_seconds: Self::default_connect_timeout(),
        }
    }

    const fn default_request_timeout() -> u64 {
        30
    }

    const fn default_connect_timeout() -> u64 {
        5
    }

    /// Get the request timeout as a `Duration`.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    /// Get the connect timeout as a `Duration`.
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }
}
