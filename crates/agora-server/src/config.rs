//! Proxy configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the proxy can start with zero
//! configuration for local development.

use std::net::SocketAddr;
use std::time::Duration;

use agora_shared::constants::DEFAULT_HTTP_PORT;

/// Proxy configuration.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Socket address for the HTTP server.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:8080`
    pub http_addr: SocketAddr,

    /// Base URL of the upstream content backend.
    /// Env: `UPSTREAM_URL`
    /// Default: `http://127.0.0.1:9000`
    pub upstream_url: String,

    /// Whether this is a production deployment. Error responses include a
    /// `details` field only when this is false.
    /// Env: `ENVIRONMENT` (`production` enables it)
    /// Default: `false`
    pub production: bool,

    /// Timeout applied to upstream requests.
    /// Env: `UPSTREAM_TIMEOUT_SECS`
    /// Default: 10 seconds
    pub upstream_timeout: Duration,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], DEFAULT_HTTP_PORT).into(),
            upstream_url: "http://127.0.0.1:9000".to_string(),
            production: false,
            upstream_timeout: Duration::from_secs(10),
        }
    }
}

impl ProxyConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("HTTP_ADDR") {
            if let Ok(parsed) = addr.parse::<SocketAddr>() {
                config.http_addr = parsed;
            } else {
                tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default");
            }
        }

        if let Ok(url) = std::env::var("UPSTREAM_URL") {
            if !url.is_empty() {
                config.upstream_url = url;
            }
        }

        if let Ok(env) = std::env::var("ENVIRONMENT") {
            config.production = env.eq_ignore_ascii_case("production");
        }

        if let Ok(val) = std::env::var("UPSTREAM_TIMEOUT_SECS") {
            if let Ok(secs) = val.parse::<u64>() {
                config.upstream_timeout = Duration::from_secs(secs);
            } else {
                tracing::warn!(value = %val, "Invalid UPSTREAM_TIMEOUT_SECS, using default");
            }
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ProxyConfig::default();
        assert_eq!(config.http_addr, ([0, 0, 0, 0], 8080).into());
        assert_eq!(config.upstream_url, "http://127.0.0.1:9000");
        assert!(!config.production);
        assert_eq!(config.upstream_timeout, Duration::from_secs(10));
    }
}
