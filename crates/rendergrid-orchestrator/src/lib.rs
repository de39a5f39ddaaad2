//! rendergrid-orchestrator: distributed chunked rendering.
//!
//! A render job is split into time-range chunks ([`plan_chunks`]), each
//! chunk is sent to a worker invocation through a fixed-size
//! [`DispatchPool`], and the [`ChunkTable`] records every state change.
//! Failed chunks are retried with backoff; once every chunk is done the
//! outputs are stitched in index order by a [`Muxer`].
//!
//! # Job phases
//!
//! ```text
//! Splitting → Dispatching → Collecting → Stitching → Completed
//!                  │             │            │
//!                  └─────────────┴────────────┴──────→ Failed
//! ```
//!
//! A terminal chunk failure, cancellation or the job deadline stops new
//! dispatch. Invocations already in flight are allowed to finish.

pub mod error;
pub mod job;
pub mod muxer;
pub mod orchestrator;
pub mod plan;
pub mod pool;
pub mod table;

pub use error::{RenderError, RenderResult};
pub use job::{RenderJob, generate_job_id, validate_job_id};
pub use muxer::{CommandMuxer, ConcatMuxer, Muxer, StitchError};
pub use orchestrator::{Orchestrator, RenderOutcome};
pub use plan::{ChunkPlan, DEFAULT_CONCURRENCY_CEILING, plan_chunks};
pub use pool::DispatchPool;
pub use table::{ChunkTable, FailOutcome, TransitionError};
