//! Request identity.
//!
//! # Responsibilities
//! - Build the `RequestContext` for an inbound request
//! - Reuse the `x-request-id` assigned at the edge as the context id
//! - Stamp the id onto the outgoing response
//!
//! # Design Decisions
//! - The id header is set by `tower_http` before the handler runs; a fresh
//!   UUID v4 covers callers that bypass the layer

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{HeaderValue, Request, Response};

use crate::pipeline::context::RequestContext;
use crate::pipeline::stage::ResponseStage;

pub const X_REQUEST_ID: &str = "x-request-id";

/// The request's `x-request-id`, if present and printable.
pub fn request_id<B>(req: &Request<B>) -> Option<&str> {
    req.headers()
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
}

/// Wrap an inbound request in a fresh context.
pub fn context_for(request: Request<Body>) -> RequestContext {
    match request_id(&request).map(str::to_string) {
        Some(id) => RequestContext::with_id(id, request),
        None => RequestContext::new(request),
    }
}

/// Post-response stage that copies the context id into `x-request-id`.
/// A header already set by the backend is left alone.
#[derive(Debug, Default, Clone, Copy)]
pub struct RequestIdStamp;

#[async_trait]
impl ResponseStage for RequestIdStamp {
    async fn filter_response(&self, ctx: &mut RequestContext, response: &mut Response<Body>) {
        if response.headers().contains_key(X_REQUEST_ID) {
            return;
        }
        if let Ok(value) = HeaderValue::from_str(ctx.id()) {
            response.headers_mut().insert(X_REQUEST_ID, value);
        }
    }
}
