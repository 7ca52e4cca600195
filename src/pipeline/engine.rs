//! Pipeline execution.
//!
//! # State Machine (per request)
//! ```text
//! Created
//!   → PreResponse   request stages in order; first Some(response) stops the phase;
//!                   none answering synthesizes an empty 404
//!   → PostResponse  every response stage in order, unconditionally
//!   → Finished      stage records frozen, fingerprint computed
//!   → Completed     completion callback observes context + response
//! ```
//!
//! # Design Decisions
//! - Stage lists are configured before serving and read-only afterwards,
//!   so `execute` takes `&self` and needs no locking
//! - The engine never retries and never looks inside a stage beyond its
//!   status byte and optional response

use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::http::Response;

use crate::http::response::not_found;
use crate::observability::logging::Logger;
use crate::observability::metrics;
use crate::pipeline::context::{Phase, RequestContext};
use crate::pipeline::stage::{RequestStage, ResponseStage};

/// Invoked once per request after the context is finished. Observe only.
pub type CompletionCallback = Arc<dyn Fn(&RequestContext, &Response<Body>) + Send + Sync>;

/// Two ordered stage sequences plus an optional completion callback.
pub struct PipelineEngine {
    request_stages: Vec<Arc<dyn RequestStage>>,
    response_stages: Vec<Arc<dyn ResponseStage>>,
    on_complete: Option<CompletionCallback>,
    log: Arc<dyn Logger>,
}

impl PipelineEngine {
    pub fn new(log: Arc<dyn Logger>) -> Self {
        Self {
            request_stages: Vec::new(),
            response_stages: Vec::new(),
            on_complete: None,
            log,
        }
    }

    /// Append a pre-response stage.
    pub fn push_request_stage<S: RequestStage + 'static>(&mut self, stage: S) -> &mut Self {
        self.request_stages.push(Arc::new(stage));
        self
    }

    /// Append a pre-response stage that is shared with other owners.
    pub fn push_shared_request_stage(&mut self, stage: Arc<dyn RequestStage>) -> &mut Self {
        self.request_stages.push(stage);
        self
    }

    /// Append a post-response stage.
    pub fn push_response_stage<S: ResponseStage + 'static>(&mut self, stage: S) -> &mut Self {
        self.response_stages.push(Arc::new(stage));
        self
    }

    pub fn push_shared_response_stage(&mut self, stage: Arc<dyn ResponseStage>) -> &mut Self {
        self.response_stages.push(stage);
        self
    }

    pub fn set_completion_callback<F>(&mut self, f: F) -> &mut Self
    where
        F: Fn(&RequestContext, &Response<Body>) + Send + Sync + 'static,
    {
        self.on_complete = Some(Arc::new(f));
        self
    }

    pub fn request_stage_count(&self) -> usize {
        self.request_stages.len()
    }

    pub fn response_stage_count(&self) -> usize {
        self.response_stages.len()
    }

    pub fn logger(&self) -> &Arc<dyn Logger> {
        &self.log
    }

    /// Run one request through both phases and finish its context.
    pub async fn execute(&self, ctx: &mut RequestContext) -> Response<Body> {
        let start = Instant::now();
        let mut answered = None;

        for stage in &self.request_stages {
            ctx.begin_stage(Phase::PreResponse, stage.name());
            let result = stage.filter_request(ctx).await;
            ctx.end_stage();
            if result.is_some() {
                answered = result;
                break;
            }
        }

        let mut response = match answered {
            Some(response) => response,
            None => {
                self.log.fine(format_args!("{} no stage answered, responding 404", ctx.id()));
                not_found()
            }
        };

        for stage in &self.response_stages {
            ctx.begin_stage(Phase::PostResponse, stage.name());
            stage.filter_response(ctx, &mut response).await;
            ctx.end_stage();
        }

        ctx.finish();

        self.log.debug(format_args!(
            "{} [{}] {} s={} stages={} fingerprint={} Time={:.4}",
            ctx.id(),
            ctx.request().method(),
            ctx.request().uri(),
            response.status().as_u16(),
            ctx.stages().len(),
            ctx.fingerprint().unwrap_or("-"),
            ctx.elapsed().as_secs_f64(),
        ));
        metrics::record_request(ctx.request().method().as_str(), response.status().as_u16(), start);

        if let Some(callback) = &self.on_complete {
            callback(ctx, &response);
        }
        response
    }
}

impl std::fmt::Debug for PipelineEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineEngine")
            .field("request_stages", &self.request_stages.iter().map(|s| s.name()).collect::<Vec<_>>())
            .field("response_stages", &self.response_stages.iter().map(|s| s.name()).collect::<Vec<_>>())
            .field("on_complete", &self.on_complete.is_some())
            .finish()
    }
}
