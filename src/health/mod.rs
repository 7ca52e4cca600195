//! Backend liveness.
//!
//! # Data Flow
//! ```text
//! Periodic timer (active.rs)
//!     → UpstreamConnector::check_liveness() per probed upstream
//!     → last state kept per upstream, transitions logged
//!     → stagegate_upstream_up gauge
//! ```
//!
//! # Design Decisions
//! - Probing is outside the request path; forwarding never consults it
//! - Upstreams without a ping path are not monitored

pub mod active;

pub use active::LivenessMonitor;
