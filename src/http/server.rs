//! HTTP server setup.
//!
//! # Responsibilities
//! - Create the Axum Router with the single pipeline handler
//! - Wire up middleware (request ID, tracing)
//! - Serve on a listener until the shutdown signal

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{Request, Response},
    routing::any,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::http::request::context_for;
use crate::pipeline::engine::PipelineEngine;

/// Application state injected into the handler.
#[derive(Clone)]
struct AppState {
    engine: Arc<PipelineEngine>,
}

/// HTTP front end for a pipeline.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(engine: Arc<PipelineEngine>) -> Self {
        Self {
            router: Self::build_router(AppState { engine }),
        }
    }

    fn build_router(state: AppState) -> Router {
        Router::new()
            .route("/{*path}", any(pipeline_handler))
            .route("/", any(pipeline_handler))
            .with_state(state)
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(TraceLayer::new_for_http())
    }

    /// The configured router, for embedding or in-process tests.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

async fn pipeline_handler(State(state): State<AppState>, request: Request<Body>) -> Response<Body> {
    let mut ctx = context_for(request);
    state.engine.execute(&mut ctx).await
}
