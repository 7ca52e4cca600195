//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID and trace layers)
//!     → request.rs (RequestContext with the request's id)
//!     → pipeline engine
//!     → response.rs (canned 404/502/504 bodies)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::{context_for, request_id, RequestIdStamp, X_REQUEST_ID};
pub use response::{bad_gateway, gateway_timeout, not_found, simple_response};
pub use server::HttpServer;
