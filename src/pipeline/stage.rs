//! Stage contracts.
//!
//! A request stage may answer the request (ending the pre-response phase);
//! a response stage mutates the response in place and always runs. One type
//! may implement both.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::Response;

use crate::pipeline::context::RequestContext;

/// Pre-response stage.
#[async_trait]
pub trait RequestStage: Send + Sync {
    /// Returning `Some` ends the pre-response phase with that response.
    async fn filter_request(&self, ctx: &mut RequestContext) -> Option<Response<Body>>;

    /// Name recorded in the stage's `StageRecord`.
    fn name(&self) -> &'static str {
        short_type_name(std::any::type_name::<Self>())
    }
}

/// Post-response stage.
#[async_trait]
pub trait ResponseStage: Send + Sync {
    async fn filter_response(&self, ctx: &mut RequestContext, response: &mut Response<Body>);

    fn name(&self) -> &'static str {
        short_type_name(std::any::type_name::<Self>())
    }
}

/// `stagegate::upstream::UpstreamConnector` -> `UpstreamConnector`.
fn short_type_name(full: &'static str) -> &'static str {
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

/// Request stage backed by a closure. See [`request_stage_fn`].
pub struct RequestStageFn<F> {
    f: F,
    name: &'static str,
}

impl<F> RequestStageFn<F> {
    pub fn named(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }
}

/// Wrap a closure as a request stage.
pub fn request_stage_fn<F>(f: F) -> RequestStageFn<F>
where
    F: Fn(&mut RequestContext) -> Option<Response<Body>> + Send + Sync,
{
    RequestStageFn { f, name: "request_fn" }
}

#[async_trait]
impl<F> RequestStage for RequestStageFn<F>
where
    F: Fn(&mut RequestContext) -> Option<Response<Body>> + Send + Sync,
{
    async fn filter_request(&self, ctx: &mut RequestContext) -> Option<Response<Body>> {
        (self.f)(ctx)
    }

    fn name(&self) -> &'static str {
        self.name
    }
}

/// Response stage backed by a closure. See [`response_stage_fn`].
pub struct ResponseStageFn<F> {
    f: F,
    name: &'static str,
}

impl<F> ResponseStageFn<F> {
    pub fn named(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }
}

/// Wrap a closure as a response stage.
pub fn response_stage_fn<F>(f: F) -> ResponseStageFn<F>
where
    F: Fn(&mut RequestContext, &mut Response<Body>) + Send + Sync,
{
    ResponseStageFn { f, name: "response_fn" }
}

#[async_trait]
impl<F> ResponseStage for ResponseStageFn<F>
where
    F: Fn(&mut RequestContext, &mut Response<Body>) + Send + Sync,
{
    async fn filter_response(&self, ctx: &mut RequestContext, response: &mut Response<Body>) {
        (self.f)(ctx, response)
    }

    fn name(&self) -> &'static str {
        self.name
    }
}
