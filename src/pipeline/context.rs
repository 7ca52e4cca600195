//! Per-request state threaded through the pipeline.
//!
//! # Responsibilities
//! - Own the inbound request for the lifetime of one exchange
//! - Record every executed stage as an append-only `StageRecord` sequence
//! - Expose the currently executing record so a stage can set its status
//! - Freeze the sequence and compute the fingerprint exactly once on finish
//!
//! # Design Decisions
//! - Only the engine appends records and finishes the context (crate-private),
//!   so the frozen-after-finish invariant holds by construction
//! - The request id is for correlation only; nothing branches on it

use std::fmt;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::Request;

use crate::observability::logging::Logger;
use crate::pipeline::fingerprint::fingerprint;

/// Which stage sequence a record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// May short-circuit by producing a response.
    PreResponse,
    /// Always runs, after a response exists.
    PostResponse,
}

impl Phase {
    /// Byte used for this phase in the fingerprint encoding.
    pub fn tag(&self) -> u8 {
        match self {
            Phase::PreResponse => 0,
            Phase::PostResponse => 1,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::PreResponse => f.pad("pre-response"),
            Phase::PostResponse => f.pad("post-response"),
        }
    }
}

/// Outcome a stage reports about itself.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StageStatus {
    #[default]
    Pass = 0,
    Handled = 1,
    Failed = 2,
}

impl From<u8> for StageStatus {
    fn from(val: u8) -> Self {
        match val {
            1 => StageStatus::Handled,
            2 => StageStatus::Failed,
            _ => StageStatus::Pass,
        }
    }
}

/// One executed stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageRecord {
    ordinal: u32,
    phase: Phase,
    status: StageStatus,
    name: &'static str,
    elapsed: Duration,
}

impl StageRecord {
    pub(crate) fn started(ordinal: u32, phase: Phase, name: &'static str) -> Self {
        Self {
            ordinal,
            phase,
            status: StageStatus::Pass,
            name,
            elapsed: Duration::ZERO,
        }
    }

    #[cfg(test)]
    pub(crate) fn completed(
        ordinal: u32,
        phase: Phase,
        status: StageStatus,
        name: &'static str,
        elapsed: Duration,
    ) -> Self {
        Self { ordinal, phase, status, name, elapsed }
    }

    /// 1-based position in the request's execution order.
    pub fn ordinal(&self) -> u32 {
        self.ordinal
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn status(&self) -> StageStatus {
        self.status
    }

    pub fn set_status(&mut self, status: StageStatus) {
        self.status = status;
    }

    /// Name of the stage that produced this record.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Time spent inside the stage.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }
}

/// Mutable state for one request.
pub struct RequestContext {
    id: String,
    request: Request<Body>,
    started_at: Instant,
    stages: Vec<StageRecord>,
    current: Option<(usize, Instant)>,
    finished_at: Option<Instant>,
    fingerprint: Option<String>,
}

impl RequestContext {
    /// New context with a fresh UUID v4 id.
    pub fn new(request: Request<Body>) -> Self {
        Self::with_id(uuid::Uuid::new_v4().to_string(), request)
    }

    /// New context with a caller-supplied id (e.g. an incoming `x-request-id`).
    pub fn with_id(id: impl Into<String>, request: Request<Body>) -> Self {
        Self {
            id: id.into(),
            request,
            started_at: Instant::now(),
            stages: Vec::new(),
            current: None,
            finished_at: None,
            fingerprint: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn request(&self) -> &Request<Body> {
        &self.request
    }

    pub fn request_mut(&mut self) -> &mut Request<Body> {
        &mut self.request
    }

    /// Records of every stage executed so far, in execution order.
    pub fn stages(&self) -> &[StageRecord] {
        &self.stages
    }

    /// The record of the stage currently executing. `None` between stages and
    /// once the context is finished.
    pub fn current_stage_mut(&mut self) -> Option<&mut StageRecord> {
        if self.finished_at.is_some() {
            return None;
        }
        let (index, _) = self.current?;
        self.stages.get_mut(index)
    }

    /// Set the status of the currently executing stage, if any.
    pub fn set_stage_status(&mut self, status: StageStatus) {
        if let Some(stage) = self.current_stage_mut() {
            stage.set_status(status);
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished_at.is_some()
    }

    /// Digest of the finished stage sequence. `None` until finished.
    pub fn fingerprint(&self) -> Option<&str> {
        self.fingerprint.as_deref()
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<Instant> {
        self.finished_at
    }

    /// Time from creation to finish, or to now while still running.
    pub fn elapsed(&self) -> Duration {
        self.finished_at.unwrap_or_else(Instant::now) - self.started_at
    }

    pub(crate) fn begin_stage(&mut self, phase: Phase, name: &'static str) {
        if self.finished_at.is_some() {
            return;
        }
        self.end_stage();
        let ordinal = self.stages.len() as u32 + 1;
        self.stages.push(StageRecord::started(ordinal, phase, name));
        self.current = Some((self.stages.len() - 1, Instant::now()));
    }

    /// Close the running stage's record and open one for the stage it hands
    /// the request to.
    pub(crate) fn begin_delegated_stage(&mut self, name: &'static str) {
        let phase = match self.current.and_then(|(index, _)| self.stages.get(index)) {
            Some(stage) => stage.phase,
            None => Phase::PreResponse,
        };
        self.begin_stage(phase, name);
    }

    pub(crate) fn end_stage(&mut self) {
        if let Some((index, started)) = self.current.take() {
            if let Some(stage) = self.stages.get_mut(index) {
                stage.elapsed = started.elapsed();
            }
        }
    }

    /// Freeze the stage sequence and compute the fingerprint. Idempotent.
    pub(crate) fn finish(&mut self) {
        if self.finished_at.is_some() {
            return;
        }
        self.end_stage();
        self.fingerprint = Some(fingerprint(&self.stages));
        self.finished_at = Some(Instant::now());
    }

    /// Log the full stage breakdown for this request.
    pub fn trace(&self, log: &dyn Logger) {
        log.trace(format_args!(
            "{} [{}] {} stages={} fingerprint={} Time={:.4}",
            self.id,
            self.request.method(),
            self.request.uri(),
            self.stages.len(),
            self.fingerprint.as_deref().unwrap_or("-"),
            self.elapsed().as_secs_f64(),
        ));
        for stage in &self.stages {
            log.trace(format_args!(
                "{} {:>3} {:<13} {:<24} s={} Time={:.4}",
                self.id,
                stage.ordinal,
                stage.phase,
                stage.name,
                stage.status as u8,
                stage.elapsed.as_secs_f64(),
            ));
        }
    }
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("id", &self.id)
            .field("method", self.request.method())
            .field("uri", self.request.uri())
            .field("stages", &self.stages)
            .field("finished", &self.is_finished())
            .field("fingerprint", &self.fingerprint)
            .finish()
    }
}
