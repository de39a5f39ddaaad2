//! Worker platform backed by the local redb registry.
//!
//! Workers recorded here survive restarts, and creation goes through the
//! registry's conditional insert so separate processes racing on the same
//! name still provision once. Invocations are served by whatever listens
//! on the configured endpoint.

use async_trait::async_trait;
use tracing::info;

use rendergrid_state::{DeployedWorker, InsertOutcome, StateStore};

use crate::error::{PlatformError, PlatformResult};
use crate::platform::{CreateOutcome, WorkerPlatform};

#[derive(Clone)]
pub struct LocalPlatform {
    state: StateStore,
    endpoint: Option<String>,
    logs_base: String,
}

impl LocalPlatform {
    pub fn new(state: StateStore, endpoint: Option<String>, logs_base: impl Into<String>) -> Self {
        Self {
            state,
            endpoint,
            logs_base: logs_base.into(),
        }
    }
}

#[async_trait]
impl WorkerPlatform for LocalPlatform {
    async fn find_worker(&self, region: &str, name: &str) -> PlatformResult<Option<DeployedWorker>> {
        Ok(self.state.get_worker(region, name)?)
    }

    async fn create_worker(&self, worker: &DeployedWorker) -> PlatformResult<CreateOutcome> {
        let mut record = worker.clone();
        if record.endpoint.is_none() {
            record.endpoint = self.endpoint.clone();
        }
        match self.state.put_worker_if_absent(&record)? {
            InsertOutcome::Inserted => {
                info!(name = %record.name, region = %record.region, "worker registered");
                Ok(CreateOutcome::Created(record))
            }
            InsertOutcome::Existing(existing) => Ok(CreateOutcome::AlreadyExists(existing)),
        }
    }

    async fn list_workers(&self, region: &str) -> PlatformResult<Vec<DeployedWorker>> {
        Ok(self.state.list_workers(region)?)
    }

    async fn delete_worker(&self, region: &str, name: &str) -> PlatformResult<()> {
        if self.state.delete_worker(region, name)? {
            Ok(())
        } else {
            Err(PlatformError::NotFound(name.to_string()))
        }
    }

    fn logs_url(&self, region: &str, name: &str) -> String {
        format!("{}/{region}/{name}", self.logs_base.trim_end_matches('/'))
    }
}
