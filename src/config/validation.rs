//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (routes reference existing dependencies)
//! - Validate value ranges (limits > 0, multiplier >= 1, parseable URLs)
//! - Detect duplicate names and route prefixes
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;
use thiserror::Error;
use url::Url;

use crate::config::schema::{GatewayConfig, ResilienceConfig};

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{field}: must be greater than zero")]
    Zero { field: String },

    #[error("{field}: multiplier must be a finite number >= 1, got {value}")]
    Multiplier { field: String, value: String },

    #[error("{field}: invalid address '{value}'")]
    Address { field: String, value: String },

    #[error("dependency '{name}': invalid upstream URL '{value}': {reason}")]
    Upstream { name: String, value: String, reason: String },

    #[error("duplicate {kind} '{name}'")]
    Duplicate { kind: &'static str, name: String },

    #[error("route '{route}' references unknown dependency '{dependency}'")]
    UnknownDependency { route: String, dependency: String },

    #[error("route '{route}': path prefix '{prefix}' must start with '/'")]
    PathPrefix { route: String, prefix: String },
}

fn zero(field: impl Into<String>) -> ValidationError {
    ValidationError::Zero { field: field.into() }
}

fn check_resilience(scope: &str, config: &ResilienceConfig, errors: &mut Vec<ValidationError>) {
    if config.circuit_breaker.max_failures == 0 {
        errors.push(zero(format!("{scope}.circuit_breaker.max_failures")));
    }
    if config.rate_limit.limit == 0 {
        errors.push(zero(format!("{scope}.rate_limit.limit")));
    }
    if config.rate_limit.window_ms == 0 {
        errors.push(zero(format!("{scope}.rate_limit.window_ms")));
    }
    if config.bulkhead.capacity == 0 {
        errors.push(zero(format!("{scope}.bulkhead.capacity")));
    }
    if config.retry.max_attempts == 0 {
        errors.push(zero(format!("{scope}.retry.max_attempts")));
    }
    let multiplier = config.retry.multiplier;
    if !multiplier.is_finite() || multiplier < 1.0 {
        errors.push(ValidationError::Multiplier {
            field: format!("{scope}.retry.multiplier"),
            value: multiplier.to_string(),
        });
    }
    if config.call_timeout_ms == Some(0) {
        errors.push(zero(format!("{scope}.call_timeout_ms")));
    }
}

/// Validate a parsed configuration, collecting every problem found.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::Address {
            field: "listener.bind_address".to_string(),
            value: config.listener.bind_address.clone(),
        });
    }
    if config.admin.enabled && config.admin.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::Address {
            field: "admin.bind_address".to_string(),
            value: config.admin.bind_address.clone(),
        });
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::Address {
            field: "observability.metrics_address".to_string(),
            value: config.observability.metrics_address.clone(),
        });
    }
    if config.timeouts.request_secs == 0 {
        errors.push(zero("timeouts.request_secs"));
    }

    check_resilience("defaults", &config.defaults, &mut errors);

    let mut names = HashSet::new();
    for dependency in &config.dependencies {
        if !names.insert(dependency.name.as_str()) {
            errors.push(ValidationError::Duplicate {
                kind: "dependency",
                name: dependency.name.clone(),
            });
        }

        match Url::parse(&dependency.upstream) {
            Ok(url) if matches!(url.scheme(), "http") => {}
            Ok(url) => errors.push(ValidationError::Upstream {
                name: dependency.name.clone(),
                value: dependency.upstream.clone(),
                reason: format!("unsupported scheme '{}'", url.scheme()),
            }),
            Err(e) => errors.push(ValidationError::Upstream {
                name: dependency.name.clone(),
                value: dependency.upstream.clone(),
                reason: e.to_string(),
            }),
        }

        let scope = format!("dependencies.{}", dependency.name);
        check_resilience(&scope, &dependency.effective(&config.defaults), &mut errors);
    }

    let mut route_names = HashSet::new();
    let mut prefixes = HashSet::new();
    for route in &config.routes {
        if !route_names.insert(route.name.as_str()) {
            errors.push(ValidationError::Duplicate {
                kind: "route",
                name: route.name.clone(),
            });
        }
        if !route.path_prefix.starts_with('/') {
            errors.push(ValidationError::PathPrefix {
                route: route.name.clone(),
                prefix: route.path_prefix.clone(),
            });
        } else if !prefixes.insert(route.path_prefix.trim_end_matches('/')) {
            errors.push(ValidationError::Duplicate {
                kind: "path prefix",
                name: route.path_prefix.clone(),
            });
        }
        if !names.contains(route.dependency.as_str()) {
            errors.push(ValidationError::UnknownDependency {
                route: route.name.clone(),
                dependency: route.dependency.clone(),
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{DependencyConfig, RateLimitConfig, RouteConfig};

    fn valid() -> GatewayConfig {
        let mut config = GatewayConfig::default();
        config.dependencies.push(DependencyConfig::new("users", "http://127.0.0.1:3000"));
        config.routes.push(RouteConfig::new("data", "/data", "users"));
        config
    }

    #[test]
    fn test_default_shaped_config_is_valid() {
        assert_eq!(validate_config(&valid()), Ok(()));
    }

    #[test]
    fn test_collects_every_error() {
        let mut config = valid();
        config.defaults.retry.multiplier = 0.5;
        config.defaults.bulkhead.capacity = 0;
        config.routes.push(RouteConfig::new("orders", "orders", "orders"));

        let errors = validate_config(&config).unwrap_err();

        assert!(errors.contains(&ValidationError::Zero {
            field: "defaults.bulkhead.capacity".into()
        }));
        assert!(errors.iter().any(|e| matches!(e, ValidationError::Multiplier { field, .. } if field == "defaults.retry.multiplier")));
        assert!(errors.contains(&ValidationError::PathPrefix {
            route: "orders".into(),
            prefix: "orders".into()
        }));
        assert!(errors.contains(&ValidationError::UnknownDependency {
            route: "orders".into(),
            dependency: "orders".into()
        }));
    }

    #[test]
    fn test_dependency_overrides_are_validated() {
        let mut config = valid();
        config.dependencies[0].rate_limit = Some(RateLimitConfig { limit: 0, window_ms: 1_000 });

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![ValidationError::Zero {
                field: "dependencies.users.rate_limit.limit".into()
            }]
        );
    }

    #[test]
    fn test_rejects_bad_upstream_and_duplicates() {
        let mut config = valid();
        config.dependencies.push(DependencyConfig::new("users", "ftp://example.com"));
        config.routes.push(RouteConfig::new("data", "/data/", "users"));

        let errors = validate_config(&config).unwrap_err();

        assert!(errors.contains(&ValidationError::Duplicate { kind: "dependency", name: "users".into() }));
        assert!(errors.contains(&ValidationError::Duplicate { kind: "route", name: "data".into() }));
        assert!(errors.contains(&ValidationError::Duplicate { kind: "path prefix", name: "/data/".into() }));
        assert!(errors.iter().any(|e| matches!(e, ValidationError::Upstream { reason, .. } if reason.contains("ftp"))));
    }
}
