//! The worker platform seam (Lambda, Cloud Run, or a local stand-in).

use async_trait::async_trait;

use rendergrid_state::DeployedWorker;

use crate::error::PlatformResult;

/// Result of a create-if-absent provisioning call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOutcome {
    Created(DeployedWorker),
    /// Someone else created a worker with this name first.
    AlreadyExists(DeployedWorker),
}

#[async_trait]
pub trait WorkerPlatform: Send + Sync + 'static {
    async fn find_worker(&self, region: &str, name: &str) -> PlatformResult<Option<DeployedWorker>>;

    /// Provision `worker` unless a worker with the same region and name
    /// exists. Must be atomic: of several racing calls at most one
    /// returns `Created`.
    async fn create_worker(&self, worker: &DeployedWorker) -> PlatformResult<CreateOutcome>;

    async fn list_workers(&self, region: &str) -> PlatformResult<Vec<DeployedWorker>>;

    /// Delete a worker. `NotFound` if it does not exist.
    async fn delete_worker(&self, region: &str, name: &str) -> PlatformResult<()>;

    /// Where the worker's invocation logs can be read.
    fn logs_url(&self, region: &str, name: &str) -> String;
}
