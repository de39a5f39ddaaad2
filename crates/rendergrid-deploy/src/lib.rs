//! rendergrid-deploy: worker lifecycle for RenderGrid.
//!
//! The [`DeploymentManager`] is the idempotency boundary for workers:
//! `ensure_worker` derives the name from configuration, reuses a worker
//! that already carries it, and otherwise provisions one through a
//! create-if-absent [`WorkerPlatform`] call. Concurrent callers racing on
//! the same name see exactly one creation.
//!
//! Chunk renders reach workers through the [`WorkerInvoker`] seam, and
//! [`permissions`] answers whether the caller may run an operation at
//! all before anything is touched.

pub mod catalog;
pub mod client;
pub mod error;
pub mod invoke;
pub mod local;
pub mod manager;
pub mod memory;
pub mod permissions;
pub mod platform;

pub use catalog::{RegionCatalog, RegionFeatures};
pub use client::{post, post_json};
pub use error::{DeployError, DeployResult, PlatformError, PlatformResult};
pub use invoke::{HttpInvoker, InvocationRequest, InvocationResponse, InvokeError, WorkerInvoker};
pub use local::LocalPlatform;
pub use manager::{DeleteOutcome, DeploymentManager, EnsuredWorker};
pub use memory::MemoryPlatform;
pub use platform::{CreateOutcome, WorkerPlatform};
pub use permissions::{
    Capability, Operation, PermissionError, PermissionResult, PermissionValidator,
    PolicySimulator, SimulationResult, StaticPolicySimulator,
};
