//! Startup orchestration.
//!
//! # Responsibilities
//! - Build one `UpstreamConnector` per configured upstream
//! - Assemble host and path routers from the route table
//! - Produce the pipeline the HTTP server executes
//!
//! # Design Decisions
//! - Fail fast: a bad pattern or unknown upstream is a startup error
//! - Host routes win over host-less routes; within a router, first match wins
//! - A route with no path is a catch-all

use std::collections::HashMap;
use std::sync::Arc;

use crate::buffer::BufferPool;
use crate::config::schema::ProxyConfig;
use crate::http::request::RequestIdStamp;
use crate::observability::logging::Logger;
use crate::pipeline::engine::PipelineEngine;
use crate::pipeline::stage::RequestStage;
use crate::routing::route::RouteError;
use crate::routing::router::{HostRouter, PathRouter, RouterStage};
use crate::upstream::UpstreamConnector;

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("route {index} references unknown upstream {upstream:?}")]
    UnknownUpstream { index: usize, upstream: String },

    #[error(transparent)]
    Route(#[from] RouteError),
}

/// Everything the server and the liveness monitor need.
pub struct Gateway {
    pub engine: Arc<PipelineEngine>,
    pub upstreams: Vec<Arc<UpstreamConnector>>,
    pub pool: Arc<BufferPool>,
}

fn add_route(
    router: &mut PathRouter,
    path: Option<&str>,
    stage: Arc<dyn RequestStage>,
) -> Result<(), RouteError> {
    match path {
        Some(pattern) => {
            router.add_match(pattern, stage)?;
        }
        None => {
            router.add_any(stage);
        }
    }
    Ok(())
}

/// Build the pipeline described by `config`.
pub fn pipeline_from_config(config: &ProxyConfig, log: Arc<dyn Logger>) -> Result<Gateway, StartupError> {
    let pool = Arc::new(BufferPool::new(
        config.buffer_pool.capacity,
        config.buffer_pool.buffer_size,
    ));

    let mut upstreams = Vec::with_capacity(config.upstreams.len());
    let mut by_name: HashMap<&str, Arc<UpstreamConnector>> = HashMap::new();
    for upstream in &config.upstreams {
        let connector = Arc::new(UpstreamConnector::new(upstream.clone(), pool.clone(), log.clone()));
        by_name.insert(upstream.name.as_str(), connector.clone());
        upstreams.push(connector);
    }

    // Hosts keep their first-seen order so the route table reads top-down.
    let mut host_order: Vec<String> = Vec::new();
    let mut host_paths: HashMap<String, PathRouter> = HashMap::new();
    let mut default_paths = PathRouter::new();

    for (index, route) in config.routes.iter().enumerate() {
        let connector = by_name
            .get(route.upstream.as_str())
            .cloned()
            .ok_or_else(|| StartupError::UnknownUpstream {
                index,
                upstream: route.upstream.clone(),
            })?;
        let stage: Arc<dyn RequestStage> = connector;

        match &route.host {
            Some(host) => {
                let host = host.to_lowercase();
                if !host_paths.contains_key(&host) {
                    host_order.push(host.clone());
                }
                let paths = host_paths.entry(host).or_default();
                add_route(paths, route.path.as_deref(), stage)?;
            }
            None => add_route(&mut default_paths, route.path.as_deref(), stage)?,
        }
    }

    let mut engine = PipelineEngine::new(log.clone());
    if !host_order.is_empty() {
        let mut hosts = HostRouter::new();
        for host in host_order {
            if let Some(paths) = host_paths.remove(&host) {
                hosts.add_match(&host, Arc::new(RouterStage::new(paths).named("PathRouter")));
            }
        }
        engine.push_request_stage(RouterStage::new(hosts).named("HostRouter"));
    }
    if !default_paths.is_empty() {
        engine.push_request_stage(RouterStage::new(default_paths).named("PathRouter"));
    }
    engine.push_response_stage(RequestIdStamp);

    log.info(format_args!(
        "Pipeline ready: {} upstreams, {} routes, {} request stages",
        upstreams.len(),
        config.routes.len(),
        engine.request_stage_count()
    ));

    Ok(Gateway {
        engine: Arc::new(engine),
        upstreams,
        pool,
    })
}
