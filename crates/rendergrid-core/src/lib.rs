//! rendergrid-core: shared types for RenderGrid.
//!
//! Holds everything the other crates agree on without I/O: the
//! `rendergrid.toml` schema, the deterministic namer for workers, sites,
//! buckets and chunk outputs, and the error taxonomy surfaced to callers.

pub mod config;
pub mod error;
pub mod naming;
pub mod retry;
pub mod types;

pub use config::GridConfig;
pub use error::{ConfigError, ConfigResult};
pub use naming::{WorkerIdentity, derive_name};
pub use retry::RetryPolicy;
pub use types::*;
