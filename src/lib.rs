//! Staged reverse-proxy request processing.
//!
//! A request enters as a [`RequestContext`], runs through the pre-response
//! stages of a [`PipelineEngine`] until one answers (routers and upstream
//! connectors are stages like any other), then through every post-response
//! stage. Each stage leaves a record; the finished sequence is summarized by
//! a fingerprint.

// Core
pub mod buffer;
pub mod pipeline;
pub mod routing;
pub mod upstream;

// Front end and wiring
pub mod config;
pub mod health;
pub mod http;
pub mod lifecycle;

// Cross-cutting concerns
pub mod observability;

pub use buffer::BufferPool;
pub use config::schema::ProxyConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use pipeline::{PipelineEngine, RequestContext, RequestStage, ResponseStage, StageStatus};
pub use routing::{HostRouter, PathRouter, Router, RouterStage};
pub use upstream::{Liveness, UpstreamConnector};
