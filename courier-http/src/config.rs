//! HTTP front end configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::HttpError;

/// Configuration for the HTTP listener
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Enable or disable the HTTP server
    ///
    /// When disabled, only the retry processor runs.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Address to bind the HTTP server
    ///
    /// Common values:
    /// - `[::]:3000` (IPv6 any address, port 3000)
    /// - `0.0.0.0:3000` (IPv4 any address, port 3000)
    /// - `127.0.0.1:3000` (localhost only, port 3000)
    #[serde(default = "default_listen_address")]
    pub listen_address: String,

    /// Upper bound on handling a single request (seconds)
    ///
    /// A submission walks every provider before answering, so this must be
    /// larger than the sum of the provider attempt timeouts; see
    /// [`HttpConfig::validate`].
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

const fn default_enabled() -> bool {
    true
}

fn default_listen_address() -> String {
    "[::]:3000".to_string()
}

const fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            listen_address: default_listen_address(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl HttpConfig {
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Check that a request outlives the longest delivery pass
    ///
    /// # Errors
    ///
    /// Returns [`HttpError::RequestTimeoutTooShort`] if the request timeout is
    /// not strictly longer than `longest_pass`.
    pub fn validate(&self, longest_pass: Duration) -> Result<(), HttpError> {
        if self.request_timeout() > longest_pass {
            return Ok(());
        }

        Err(HttpError::RequestTimeoutTooShort {
            request_timeout_secs: self.request_timeout_secs,
            longest_pass_secs: longest_pass.as_secs(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_timeout_must_exceed_longest_pass() {
        let config = HttpConfig::default();

        assert!(config.validate(Duration::from_secs(20)).is_ok());

        let error = config.validate(Duration::from_secs(30)).unwrap_err();
        assert!(matches!(
            error,
            HttpError::RequestTimeoutTooShort {
                request_timeout_secs: 30,
                longest_pass_secs: 30,
            }
        ));
    }
}
