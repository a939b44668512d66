//! Tracing Subscriber Initialization
//!
//! Installs an `EnvFilter` plus a JSON `fmt` layer. `RUST_LOG` wins over the
//! configured default filter.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::{ApiError, ApiResult};

/// Default directives when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "tablecache_api=debug,tablecache_storage=info,tower_http=debug,info";

/// Telemetry configuration from environment variables.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name attached to the startup log line
    pub service_name: String,
    /// Environment (production, staging, development)
    pub environment: String,
    /// Filter directives used when `RUST_LOG` is unset
    pub default_filter: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "tablecache-api".to_string(),
            environment: "development".to_string(),
            default_filter: DEFAULT_FILTER.to_string(),
        }
    }
}

impl TelemetryConfig {
    /// Reads `TABLECACHE_SERVICE_NAME`, `TABLECACHE_ENVIRONMENT` and
    /// `TABLECACHE_LOG_FILTER`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            service_name: std::env::var("TABLECACHE_SERVICE_NAME").unwrap_or(defaults.service_name),
            environment: std::env::var("TABLECACHE_ENVIRONMENT").unwrap_or(defaults.environment),
            default_filter: std::env::var("TABLECACHE_LOG_FILTER").unwrap_or(defaults.default_filter),
        }
    }

    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&self.default_filter))
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
    }
}

/// Initialize the global tracing subscriber.
///
/// Call once at startup, before any tracing occurs. A second call fails.
pub fn init_tracing(config: &TelemetryConfig) -> ApiResult<()> {
    tracing_subscriber::registry()
        .with(config.env_filter())
        .with(tracing_subscriber::fmt::layer().json())
        .try_init()
        .map_err(|e| ApiError::internal_error(format!("Failed to init subscriber: {}", e)))?;

    tracing::info!(
        service_name = %config.service_name,
        environment = %config.environment,
        "Telemetry initialized"
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_telemetry_config_default() {
        let config = TelemetryConfig::default();
        assert_eq!(config.service_name, "tablecache-api");
        assert_eq!(config.default_filter, DEFAULT_FILTER);
    }

    #[test]
    fn test_default_filter_parses() {
        assert!(EnvFilter::try_new(DEFAULT_FILTER).is_ok());
    }
}
