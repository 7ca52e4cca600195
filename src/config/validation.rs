//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (routes reference existing upstreams)
//! - Validate value ranges (timeouts > 0, ports valid)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Pure function: ProxyConfig → Result<(), Vec<ValidationError>>

use std::collections::HashSet;
use std::net::SocketAddr;

use regex::Regex;

use crate::config::schema::ProxyConfig;

/// One semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("invalid bind address {0:?}")]
    InvalidBindAddress(String),

    #[error("invalid metrics address {0:?}")]
    InvalidMetricsAddress(String),

    #[error("buffer pool buffer size must be greater than zero")]
    ZeroBufferSize,

    #[error("upstream name {0:?} defined more than once")]
    DuplicateUpstream(String),

    #[error("upstream {0:?} has an empty host")]
    EmptyHost(String),

    #[error("upstream {0:?} has port 0")]
    InvalidPort(String),

    #[error("upstream {0:?} has a zero timeout")]
    ZeroTimeout(String),

    #[error("upstream {name:?} ping path {path:?} must start with '/'")]
    InvalidPingPath { name: String, path: String },

    #[error("route {index} references unknown upstream {upstream:?}")]
    UnknownUpstream { index: usize, upstream: String },

    #[error("route {index} has invalid path pattern {pattern:?}")]
    InvalidPattern { index: usize, pattern: String },

    #[error("health check interval must be greater than zero")]
    ZeroHealthInterval,
}

pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidBindAddress(config.listener.bind_address.clone()));
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidMetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if config.buffer_pool.buffer_size == 0 {
        errors.push(ValidationError::ZeroBufferSize);
    }

    let mut names = HashSet::new();
    for upstream in &config.upstreams {
        if !names.insert(upstream.name.as_str()) {
            errors.push(ValidationError::DuplicateUpstream(upstream.name.clone()));
        }
        if upstream.host.trim().is_empty() {
            errors.push(ValidationError::EmptyHost(upstream.name.clone()));
        }
        if upstream.port == 0 {
            errors.push(ValidationError::InvalidPort(upstream.name.clone()));
        }
        if upstream.timeout_secs == 0 {
            errors.push(ValidationError::ZeroTimeout(upstream.name.clone()));
        }
        if let Some(path) = &upstream.ping_path {
            if !path.starts_with('/') {
                errors.push(ValidationError::InvalidPingPath {
                    name: upstream.name.clone(),
                    path: path.clone(),
                });
            }
        }
    }

    for (index, route) in config.routes.iter().enumerate() {
        if !names.contains(route.upstream.as_str()) {
            errors.push(ValidationError::UnknownUpstream {
                index,
                upstream: route.upstream.clone(),
            });
        }
        if let Some(pattern) = &route.path {
            if Regex::new(pattern).is_err() {
                errors.push(ValidationError::InvalidPattern {
                    index,
                    pattern: pattern.clone(),
                });
            }
        }
    }

    if config.health_check.enabled && config.health_check.interval_secs == 0 {
        errors.push(ValidationError::ZeroHealthInterval);
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
    use crate::config::schema::{RouteConfig, UpstreamConfig};

    fn route(upstream: &str, path: Option<&str>) -> RouteConfig {
        RouteConfig {
            host: None,
            path: path.map(str::to_string),
            upstream: upstream.to_string(),
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&ProxyConfig::default()).is_ok());
    }

    #[test]
    fn test_upstream_checks() {
        let mut config = ProxyConfig::default();
        let mut bad = UpstreamConfig::new("app", "", 0);
        bad.timeout_secs = 0;
        bad.ping_path = Some("health".to_string());
        config.upstreams = vec![bad, UpstreamConfig::new("app", "127.0.0.1", 80)];

        let errors = validate_config(&config).unwrap_err();
        assert!(errors.contains(&ValidationError::EmptyHost("app".into())));
        assert!(errors.contains(&ValidationError::InvalidPort("app".into())));
        assert!(errors.contains(&ValidationError::ZeroTimeout("app".into())));
        assert!(errors.contains(&ValidationError::DuplicateUpstream("app".into())));
        assert_eq!(errors.len(), 5);
    }

    #[test]
    fn test_route_checks() {
        let mut config = ProxyConfig::default();
        config.upstreams = vec![UpstreamConfig::new("app", "127.0.0.1", 80)];
        config.routes = vec![route("app", Some("^/ok")), route("nope", None), route("app", Some("[bad"))];

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![
                ValidationError::UnknownUpstream { index: 1, upstream: "nope".into() },
                ValidationError::InvalidPattern { index: 2, pattern: "[bad".into() },
            ]
        );
    }

    #[test]
    fn test_listener_and_health_checks() {
        let mut config = ProxyConfig::default();
        config.listener.bind_address = "not-an-address".into();
        config.health_check.enabled = true;
        config.health_check.interval_secs = 0;
        config.buffer_pool.buffer_size = 0;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors.contains(&ValidationError::ZeroBufferSize));
    }
}
