//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.
//! Durations are expressed in milliseconds.

use std::time::Duration;
use serde::{Deserialize, Serialize};

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Timeout configuration for inbound requests.
    pub timeouts: TimeoutConfig,

    /// Resilience settings applied to every dependency unless overridden.
    pub defaults: ResilienceConfig,

    /// Protected outbound dependencies.
    pub dependencies: Vec<DependencyConfig>,

    /// Route definitions mapping path prefixes to dependencies.
    pub routes: Vec<RouteConfig>,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Admin API settings.
    pub admin: AdminConfig,
}

impl GatewayConfig {
    /// Find a dependency definition by name.
    pub fn dependency(&self, name: &str) -> Option<&DependencyConfig> {
        self.dependencies.iter().find(|d| d.name == name)
    }

    /// Effective resilience settings for a dependency.
    pub fn resilience_for(&self, dependency: &DependencyConfig) -> ResilienceConfig {
        dependency.effective(&self.defaults)
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Timeout configuration for inbound requests.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Total time allowed for a request/response in seconds.
    pub request_secs: u64,

    /// Maximum upstream body size read into memory, in bytes.
    pub max_body_bytes: usize,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: 120,
            max_body_bytes: 1024 * 1024,
        }
    }
}

/// Circuit breaker settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failed calls that open the breaker.
    pub max_failures: u32,

    /// Time the breaker stays open before admitting a probe call.
    pub reset_timeout_ms: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            max_failures: 3,
            reset_timeout_ms: 60_000,
        }
    }
}

/// Fixed-window rate limit settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Calls admitted per window.
    pub limit: u32,

    /// Window length.
    pub window_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            limit: 5,
            window_ms: 1_000,
        }
    }
}

/// Bulkhead settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BulkheadConfig {
    /// Maximum concurrently in-flight calls.
    pub capacity: usize,

    /// Give up waiting for a permit after this long. Unset waits indefinitely.
    pub max_wait_ms: Option<u64>,
}

impl Default for BulkheadConfig {
    fn default() -> Self {
        Self {
            capacity: 5,
            max_wait_ms: None,
        }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,

    /// Delay after the first failed attempt.
    pub initial_interval_ms: u64,

    /// Backoff growth factor (>= 1).
    pub multiplier: f64,

    /// Cap on a single delay. Unset lets the delay grow unbounded.
    pub max_interval_ms: Option<u64>,

    /// Add up to 10% random jitter to each delay.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_interval_ms: 100,
            multiplier: 2.0,
            max_interval_ms: None,
            jitter: false,
        }
    }
}

/// Complete resilience settings for one dependency.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ResilienceConfig {
    pub circuit_breaker: CircuitBreakerConfig,
    pub rate_limit: RateLimitConfig,
    pub bulkhead: BulkheadConfig,
    pub retry: RetryConfig,

    /// Time limit for a single attempt. Unset means no limit.
    pub call_timeout_ms: Option<u64>,

    /// Open the breaker as soon as one call exhausts its retries.
    pub open_on_exhaustion: bool,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            circuit_breaker: CircuitBreakerConfig::default(),
            rate_limit: RateLimitConfig::default(),
            bulkhead: BulkheadConfig::default(),
            retry: RetryConfig::default(),
            call_timeout_ms: None,
            open_on_exhaustion: false,
        }
    }
}

impl ResilienceConfig {
    pub fn call_timeout(&self) -> Option<Duration> {
        self.call_timeout_ms.map(Duration::from_millis)
    }
}

/// A protected outbound dependency.
///
/// Each optional section replaces the matching section of `[defaults]`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DependencyConfig {
    /// Unique dependency identifier (used in logs, metrics and routes).
    pub name: String,

    /// Base URL of the upstream (e.g., "http://127.0.0.1:3000").
    pub upstream: String,

    #[serde(default)]
    pub circuit_breaker: Option<CircuitBreakerConfig>,

    #[serde(default)]
    pub rate_limit: Option<RateLimitConfig>,

    #[serde(default)]
    pub bulkhead: Option<BulkheadConfig>,

    #[serde(default)]
    pub retry: Option<RetryConfig>,

    #[serde(default)]
    pub call_timeout_ms: Option<u64>,

    #[serde(default)]
    pub open_on_exhaustion: Option<bool>,
}

impl DependencyConfig {
    /// A dependency that uses `[defaults]` for everything.
    pub fn new(name: impl Into<String>, upstream: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            upstream: upstream.into(),
            circuit_breaker: None,
            rate_limit: None,
            bulkhead: None,
            retry: None,
            call_timeout_ms: None,
            open_on_exhaustion: None,
        }
    }

    /// Merge this dependency's overrides over `defaults`.
    pub fn effective(&self, defaults: &ResilienceConfig) -> ResilienceConfig {
        ResilienceConfig {
            circuit_breaker: self
                .circuit_breaker
                .clone()
                .unwrap_or_else(|| defaults.circuit_breaker.clone()),
            rate_limit: self.rate_limit.clone().unwrap_or_else(|| defaults.rate_limit.clone()),
            bulkhead: self.bulkhead.clone().unwrap_or_else(|| defaults.bulkhead.clone()),
            retry: self.retry.clone().unwrap_or_else(|| defaults.retry.clone()),
            call_timeout_ms: self.call_timeout_ms.or(defaults.call_timeout_ms),
            open_on_exhaustion: self.open_on_exhaustion.unwrap_or(defaults.open_on_exhaustion),
        }
    }
}

/// Route configuration mapping a path prefix to a dependency.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteConfig {
    /// Route identifier for logging/metrics.
    pub name: String,

    /// Path prefix to match (e.g., "/data").
    pub path_prefix: String,

    /// Dependency to forward to.
    pub dependency: String,

    /// Fallback served when the upstream payload signals an error.
    #[serde(default)]
    pub fallback: Option<FallbackConfig>,

    /// Upper bound for the route's last-good-payload cache entry.
    #[serde(default = "default_max_cached_bytes")]
    pub max_cached_bytes: usize,
}

fn default_max_cached_bytes() -> usize {
    64 * 1024
}

impl RouteConfig {
    pub fn new(
        name: impl Into<String>,
        path_prefix: impl Into<String>,
        dependency: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            path_prefix: path_prefix.into(),
            dependency: dependency.into(),
            fallback: None,
            max_cached_bytes: default_max_cached_bytes(),
        }
    }
}

/// Fallback settings for a route.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FallbackConfig {
    /// Top-level JSON field whose presence marks an error payload.
    pub error_field: String,

    /// Body served when no cached payload is available.
    pub body: String,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            error_field: "error".to_string(),
            body: r#"{"message":"Using fallback data"}"#.to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable the admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_toml_uses_defaults() {
        let config: GatewayConfig = toml::from_str(
            r#"
            [[dependencies]]
            name = "users"
            upstream = "http://127.0.0.1:3000"

            [[routes]]
            name = "data"
            path_prefix = "/data"
            dependency = "users"
            "#,
        )
        .unwrap();

        assert_eq!(config.defaults, ResilienceConfig::default());
        assert_eq!(config.routes[0].max_cached_bytes, 64 * 1024);
        assert!(config.routes[0].fallback.is_none());

        let users = config.dependency("users").unwrap();
        assert_eq!(config.resilience_for(users), ResilienceConfig::default());
    }

    #[test]
    fn test_dependency_sections_override_defaults() {
        let config: GatewayConfig = toml::from_str(
            r#"
            [defaults]
            call_timeout_ms = 2000

            [defaults.retry]
            max_attempts = 5

            [[dependencies]]
            name = "users"
            upstream = "http://127.0.0.1:3000"
            open_on_exhaustion = true

            [dependencies.rate_limit]
            limit = 10
            "#,
        )
        .unwrap();

        let effective = config.resilience_for(&config.dependencies[0]);
        assert_eq!(effective.rate_limit, RateLimitConfig { limit: 10, window_ms: 1_000 });
        assert_eq!(effective.retry.max_attempts, 5);
        assert_eq!(effective.call_timeout(), Some(Duration::from_secs(2)));
        assert!(effective.open_on_exhaustion);
        assert_eq!(effective.circuit_breaker, CircuitBreakerConfig::default());
    }
}
