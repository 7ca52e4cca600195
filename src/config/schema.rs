//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Buffered-read reuse pool shared by all upstream connections.
    pub buffer_pool: BufferPoolConfig,

    /// Backend definitions, one connector each.
    pub upstreams: Vec<UpstreamConfig>,

    /// Route definitions mapping requests to upstreams.
    pub routes: Vec<RouteConfig>,

    /// Liveness probing settings.
    pub health_check: HealthCheckConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8000").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8000".to_string(),
        }
    }
}

/// Reuse pool sizing.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BufferPoolConfig {
    /// Maximum idle entries retained.
    pub capacity: usize,

    /// Read buffer size per entry, in bytes.
    pub buffer_size: usize,
}

impl Default for BufferPoolConfig {
    fn default() -> Self {
        Self {
            capacity: 128,
            buffer_size: 4096,
        }
    }
}

/// A single fixed backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UpstreamConfig {
    /// Unique upstream identifier, referenced by routes.
    pub name: String,

    /// Backend host name or IPv4 literal.
    pub host: String,

    /// Backend port.
    pub port: u16,

    /// Round-trip and connection deadline in seconds.
    #[serde(default = "default_upstream_timeout")]
    pub timeout_secs: u64,

    /// Always talk plain HTTP to the backend, whatever the inbound scheme.
    #[serde(default)]
    pub force_http: bool,

    /// Maximum idle persistent connections kept to this backend.
    #[serde(default = "default_max_idle")]
    pub max_idle_per_host: usize,

    /// Path probed by liveness checks; none disables them.
    #[serde(default)]
    pub ping_path: Option<String>,
}

fn default_upstream_timeout() -> u64 {
    60
}

fn default_max_idle() -> usize {
    15
}

impl UpstreamConfig {
    /// Upstream with default timeout, pool size and no ping path.
    pub fn new(name: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            port,
            timeout_secs: default_upstream_timeout(),
            force_http: false,
            max_idle_per_host: default_max_idle(),
            ping_path: None,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Route configuration mapping requests to an upstream.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteConfig {
    /// Host header to match exactly. None = any host.
    #[serde(default)]
    pub host: Option<String>,

    /// Path regular expression. None = any path.
    #[serde(default)]
    pub path: Option<String>,

    /// Upstream name to forward to.
    pub upstream: String,
}

/// Liveness probing configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Enable the periodic liveness monitor.
    pub enabled: bool,

    /// Probe interval in seconds.
    pub interval_secs: u64,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: 10,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log filter used when RUST_LOG is unset (trace, debug, info, warn, error).
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
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
