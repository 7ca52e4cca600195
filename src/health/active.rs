//! Periodic liveness probing.
//!
//! # Responsibilities
//! - Probe every connector that has a ping path, once per interval
//! - Remember the last result per upstream
//! - Log state transitions and record the liveness gauge

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::broadcast;
use tokio::time;

use crate::observability::metrics;
use crate::upstream::{Liveness, UpstreamConnector};

pub struct LivenessMonitor {
    upstreams: Vec<Arc<UpstreamConnector>>,
    interval: Duration,
    states: DashMap<String, Liveness>,
}

impl LivenessMonitor {
    /// Monitor the given connectors. Those without a ping path are skipped.
    pub fn new(upstreams: Vec<Arc<UpstreamConnector>>, interval: Duration) -> Self {
        let upstreams = upstreams
            .into_iter()
            .filter(|u| u.ping_path().is_some())
            .collect();
        Self {
            upstreams,
            interval,
            states: DashMap::new(),
        }
    }

    /// Last probe result for `name`, if it has been probed.
    pub fn state(&self, name: &str) -> Option<Liveness> {
        self.states.get(name).map(|s| *s)
    }

    pub fn monitored(&self) -> usize {
        self.upstreams.len()
    }

    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        if self.upstreams.is_empty() {
            tracing::info!("No upstream has a ping path, liveness monitor idle");
            return;
        }

        tracing::info!(
            interval = ?self.interval,
            upstreams = self.upstreams.len(),
            "Liveness monitor starting"
        );

        let mut ticker = time::interval(self.interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.check_all().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Liveness monitor received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// Probe every monitored upstream once.
    pub async fn check_all(&self) {
        for upstream in &self.upstreams {
            let state = upstream.check_liveness().await;
            if state == Liveness::NotApplicable {
                continue;
            }

            let previous = self.states.insert(upstream.name().to_string(), state);
            match (previous, state) {
                (Some(Liveness::Up) | None, Liveness::Down) => {
                    tracing::warn!(upstream = %upstream.name(), addr = %upstream.authority(), "Upstream is down");
                }
                (Some(Liveness::Down), Liveness::Up) => {
                    tracing::info!(upstream = %upstream.name(), addr = %upstream.authority(), "Upstream is back up");
                }
                _ => {}
            }

            metrics::record_upstream_up(upstream.authority(), state == Liveness::Up);
        }
    }
}
