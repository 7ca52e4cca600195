//! Request-processing pipeline.
//!
//! # Data Flow
//! ```text
//! Acceptor builds RequestContext
//!     → engine.rs execute()
//!         → stage.rs request stages (pre-response, may answer)
//!         → default 404 if none answered
//!         → stage.rs response stages (post-response, all of them)
//!     → context.rs finish() (records frozen)
//!     → fingerprint.rs digest of the stage sequence
//!     → completion callback
//! ```
//!
//! # Design Decisions
//! - Routers and upstream connectors are ordinary request stages
//! - Stage status is the only channel from a stage back to the engine,
//!   besides the optional response

pub mod context;
pub mod engine;
pub mod fingerprint;
pub mod stage;

pub use context::{Phase, RequestContext, StageRecord, StageStatus};
pub use engine::{CompletionCallback, PipelineEngine};
pub use fingerprint::fingerprint;
pub use stage::{request_stage_fn, response_stage_fn, RequestStage, ResponseStage};
