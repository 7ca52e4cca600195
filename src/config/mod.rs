//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ProxyConfig (validated, immutable)
//!     → lifecycle::startup builds the pipeline from it
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; stage lists never change while serving
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    BufferPoolConfig, HealthCheckConfig, ListenerConfig, ObservabilityConfig, ProxyConfig,
    RouteConfig, UpstreamConfig,
};
pub use validation::{validate_config, ValidationError};
