//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Validated config → upstream connectors → routers → pipeline engine
//!
//! Shutdown (shutdown.rs):
//!     Ctrl+C → broadcast → server drains, liveness monitor exits
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then pipeline, then listener
//! - One broadcast channel reaches every long-running task

pub mod shutdown;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{pipeline_from_config, Gateway, StartupError};
