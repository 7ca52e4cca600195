//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! RequestContext (host header, path)
//!     → router.rs (HostRouter / PathRouter / RouterFn select)
//!     → route.rs (Exact / Pattern / Any match against the path)
//!     → Return: selected stage or None
//!
//! In the pipeline:
//!     RouterStage(router) → selected stage runs → optional response
//! ```
//!
//! # Design Decisions
//! - Routes compiled at registration, immutable at serve time
//! - Deterministic: same request always selects the same stage
//! - First match wins (registration order)

pub mod route;
pub mod router;

pub use route::{Route, RouteError};
pub use router::{router_fn, HostRouter, PathRouter, Router, RouterFn, RouterStage};
