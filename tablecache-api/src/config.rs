//! API Configuration Module
//!
//! Bind address, CORS and the destructive-endpoint switch. Configuration is
//! loaded from environment variables with sensible defaults for development.

use std::net::SocketAddr;

use crate::error::{ApiError, ApiResult};

// ============================================================================
// API CONFIGURATION
// ============================================================================

/// HTTP surface configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Interface to bind (default: 0.0.0.0).
    pub bind_host: String,

    /// Port to bind (default: 3000).
    pub port: u16,

    /// Whether `POST /cache/flush` is routed at all.
    pub allow_flush: bool,

    // ========================================================================
    // CORS Configuration
    // ========================================================================
    /// Allowed CORS origins (comma-separated in env var).
    /// Empty means allow all origins (dev mode).
    pub cors_origins: Vec<String>,

    /// Max age for CORS preflight cache in seconds.
    pub cors_max_age_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_host: "0.0.0.0".to_string(),
            port: 3000,
            allow_flush: false,
            cors_origins: Vec::new(), // Empty = allow all
            cors_max_age_secs: 86400, // 24 hours
        }
    }
}

impl ApiConfig {
    /// Create ApiConfig from environment variables.
    ///
    /// Environment variables:
    /// - `TABLECACHE_API_BIND`: Interface to bind (default: 0.0.0.0)
    /// - `TABLECACHE_API_PORT` or `PORT`: Port to bind (default: 3000)
    /// - `TABLECACHE_ALLOW_FLUSH`: "true" to expose the flush endpoint (default: false)
    /// - `TABLECACHE_CORS_ORIGINS`: Comma-separated allowed origins (empty = allow all)
    /// - `TABLECACHE_CORS_MAX_AGE_SECS`: Preflight cache duration (default: 86400)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let bind_host = std::env::var("TABLECACHE_API_BIND").unwrap_or(defaults.bind_host);

        let port = std::env::var("TABLECACHE_API_PORT")
            .or_else(|_| std::env::var("PORT"))
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.port);

        let allow_flush = std::env::var("TABLECACHE_ALLOW_FLUSH")
            .ok()
            .map(|s| s.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        let cors_origins = std::env::var("TABLECACHE_CORS_ORIGINS")
            .ok()
            .map(|s| {
                s.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let cors_max_age_secs = std::env::var("TABLECACHE_CORS_MAX_AGE_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.cors_max_age_secs);

        Self {
            bind_host,
            port,
            allow_flush,
            cors_origins,
            cors_max_age_secs,
        }
    }

    pub fn with_allow_flush(mut self, allow: bool) -> Self {
        self.allow_flush = allow;
        self
    }

    /// Resolve the socket address to bind.
    pub fn bind_addr(&self) -> ApiResult<SocketAddr> {
        format!("{}:{}", self.bind_host, self.port)
            .parse()
            .map_err(|e| {
                ApiError::invalid_input(format!(
                    "Invalid bind address {}:{}: {}",
                    self.bind_host, self.port, e
                ))
            })
    }

    /// Check if a given origin is allowed.
    pub fn is_origin_allowed(&self, origin: &str) -> bool {
        if self.cors_origins.is_empty() {
            return true;
        }
        self.cors_origins.iter().any(|allowed| allowed == origin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ApiConfig::default();
        assert!(config.cors_origins.is_empty());
        assert!(!config.allow_flush);
        assert_eq!(config.port, 3000);
        assert_eq!(config.cors_max_age_secs, 86400);
    }

    #[test]
    fn test_bind_addr() -> ApiResult<()> {
        let config = ApiConfig {
            bind_host: "127.0.0.1".to_string(),
            port: 8080,
            ..ApiConfig::default()
        };
        assert_eq!(config.bind_addr()?.port(), 8080);

        let bad = ApiConfig {
            bind_host: "not a host".to_string(),
            ..ApiConfig::default()
        };
        assert!(bad.bind_addr().is_err());
        Ok(())
    }

    #[test]
    fn test_origin_allowed() {
        let mut config = ApiConfig::default();
        assert!(config.is_origin_allowed("http://localhost:5173"));

        config.cors_origins = vec!["https://admin.example.com".to_string()];
        assert!(config.is_origin_allowed("https://admin.example.com"));
        assert!(!config.is_origin_allowed("https://evil.example.com"));
    }
}
