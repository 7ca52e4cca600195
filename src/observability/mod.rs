//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Core components (pipeline, routers, upstream)
//!     → logging.rs (Logger handle, leveled events)
//!         → TracingLogger → tracing macros → tracing.rs subscriber
//!     → metrics.rs (counters, gauges, histograms)
//!         → Prometheus scrape endpoint
//! ```
//!
//! # Design Decisions
//! - The core logs through an injected `Logger`, never a global
//! - Request ID flows through every log line as the context id
//! - Metrics are no-ops until an exporter is installed

pub mod logging;
pub mod metrics;
pub mod tracing;

pub use logging::{default_logger, LogError, LogLevel, Logger, MemoryLogger, TracingLogger};
