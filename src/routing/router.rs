//! Stage selection.
//!
//! # Responsibilities
//! - `HostRouter`: exact host lookup
//! - `PathRouter`: ordered routes, first match wins
//! - `RouterFn`: ad hoc selection logic from a closure
//! - `RouterStage`: run any router as an ordinary request stage
//!
//! # Design Decisions
//! - Routers select, they never execute and never mutate the request
//! - Immutable after setup (safe for unsynchronized concurrent reads)
//! - O(1) host lookup via HashMap; O(n) path scan
//! - Explicit `None` on no match rather than a silent default

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Response};

use crate::pipeline::context::RequestContext;
use crate::pipeline::stage::RequestStage;
use crate::routing::route::{Route, RouteError};

/// Maps a request to the next stage to run.
pub trait Router: Send + Sync {
    fn select(&self, ctx: &RequestContext) -> Option<Arc<dyn RequestStage>>;
}

/// Routes on the request's host, exact match only.
///
/// Hosts are compared lowercased and include the port when the client sent
/// one (`example.com:8080` and `example.com` are different entries).
#[derive(Default)]
pub struct HostRouter {
    hosts: HashMap<String, Arc<dyn RequestStage>>,
}

impl HostRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `stage` for `host`, replacing any previous entry.
    pub fn add_match(&mut self, host: &str, stage: Arc<dyn RequestStage>) -> &mut Self {
        self.hosts.insert(host.to_lowercase(), stage);
        self
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }
}

/// Host header, falling back to the URI authority for absolute-form targets.
fn request_host(ctx: &RequestContext) -> Option<String> {
    let req = ctx.request();
    req.headers()
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .map(str::to_string)
        .or_else(|| req.uri().authority().map(|a| a.as_str().to_string()))
        .map(|h| h.to_lowercase())
}

impl Router for HostRouter {
    fn select(&self, ctx: &RequestContext) -> Option<Arc<dyn RequestStage>> {
        let host = request_host(ctx)?;
        self.hosts.get(&host).cloned()
    }
}

/// Ordered list of routes matched against the request path.
#[derive(Default, Debug)]
pub struct PathRouter {
    routes: Vec<Route>,
}

impl PathRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_route(&mut self, route: Route) -> &mut Self {
        self.routes.push(route);
        self
    }

    /// Add a pattern route. On an invalid pattern nothing is added.
    pub fn add_match(&mut self, pattern: &str, stage: Arc<dyn RequestStage>) -> Result<&mut Self, RouteError> {
        let route = Route::pattern(pattern, stage)?;
        Ok(self.add_route(route))
    }

    pub fn add_exact(&mut self, path: &str, stage: Arc<dyn RequestStage>) -> &mut Self {
        self.add_route(Route::exact(path, stage))
    }

    /// Add a catch-all route.
    pub fn add_any(&mut self, stage: Arc<dyn RequestStage>) -> &mut Self {
        self.add_route(Route::any(stage))
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl Router for PathRouter {
    fn select(&self, ctx: &RequestContext) -> Option<Arc<dyn RequestStage>> {
        let path = ctx.request().uri().path();
        self.routes
            .iter()
            .find_map(|route| route.match_key(path))
            .cloned()
    }
}

/// Router backed by a closure.
pub struct RouterFn<F> {
    f: F,
}

/// Adapt a closure into a [`Router`].
pub fn router_fn<F>(f: F) -> RouterFn<F>
where
    F: Fn(&RequestContext) -> Option<Arc<dyn RequestStage>> + Send + Sync,
{
    RouterFn { f }
}

impl<F> Router for RouterFn<F>
where
    F: Fn(&RequestContext) -> Option<Arc<dyn RequestStage>> + Send + Sync,
{
    fn select(&self, ctx: &RequestContext) -> Option<Arc<dyn RequestStage>> {
        (self.f)(ctx)
    }
}

/// Runs a router as a request stage.
///
/// The router's own record stays `Pass`. On a match the selected stage gets
/// a fresh record of its own and runs; its response, if any, ends the
/// pre-response phase. On no match the pipeline moves on.
pub struct RouterStage<R> {
    router: R,
    name: &'static str,
}

impl<R: Router> RouterStage<R> {
    pub fn new(router: R) -> Self {
        Self { router, name: "RouterStage" }
    }

    pub fn named(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    pub fn router(&self) -> &R {
        &self.router
    }
}

#[async_trait]
impl<R: Router> RequestStage for RouterStage<R> {
    async fn filter_request(&self, ctx: &mut RequestContext) -> Option<Response<Body>> {
        let stage = self.router.select(ctx)?;
        ctx.begin_delegated_stage(stage.name());
        stage.filter_request(ctx).await
    }

    fn name(&self) -> &'static str {
        self.name
    }
}
