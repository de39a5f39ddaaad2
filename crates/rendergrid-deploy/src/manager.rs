//! DeploymentManager: ensure, list and delete workers.

use std::future::Future;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use rendergrid_core::{RetryPolicy, WorkerSpec, naming};
use rendergrid_state::DeployedWorker;

use crate::catalog::RegionCatalog;
use crate::error::{DeployError, DeployResult, PlatformError, PlatformResult};
use crate::platform::{CreateOutcome, WorkerPlatform};

/// Result of [`DeploymentManager::ensure_worker`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnsuredWorker {
    pub worker: DeployedWorker,
    pub already_existed: bool,
}

/// Per-worker result of a bulk delete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteOutcome {
    pub name: String,
    /// `None` when the worker was deleted.
    pub error: Option<String>,
}

pub struct DeploymentManager {
    platform: Arc<dyn WorkerPlatform>,
    catalog: RegionCatalog,
    retry: RetryPolicy,
}

impl DeploymentManager {
    pub fn new(platform: Arc<dyn WorkerPlatform>) -> Self {
        Self {
            platform,
            catalog: RegionCatalog::default(),
            retry: RetryPolicy::provisioning(),
        }
    }

    pub fn with_catalog(mut self, catalog: RegionCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn platform(&self) -> &Arc<dyn WorkerPlatform> {
        &self.platform
    }

    /// Return the worker for `spec`, provisioning it if no worker carries
    /// its derived name yet.
    ///
    /// When the worker exists no mutating call is made. Losing a creation
    /// race to another caller also reports `already_existed`.
    pub async fn ensure_worker(&self, spec: &WorkerSpec) -> DeployResult<EnsuredWorker> {
        let name = naming::derive_name(&spec.identity)?;
        self.catalog.check(spec)?;
        let region = spec.identity.region.as_str();

        let found = self
            .retrying(&name, || self.platform.find_worker(region, &name))
            .await?;
        if let Some(worker) = found {
            debug!(%name, %region, "worker already deployed");
            return Ok(EnsuredWorker {
                worker,
                already_existed: true,
            });
        }

        let candidate = DeployedWorker {
            name: name.clone(),
            region: region.to_string(),
            identity: spec.identity.clone(),
            memory_mb: naming::memory_mib(&spec.identity.memory)?,
            cpu_millis: naming::cpu_millis(&spec.identity.cpu)?,
            disk_mb: spec.disk_mb,
            timeout_secs: spec.identity.timeout_secs,
            version: spec.identity.version.clone(),
            enhanced_monitoring: spec.enhanced_monitoring,
            execution_role: spec.execution_role.clone(),
            network: spec.network.clone(),
            endpoint: None,
            created_at: epoch_secs(),
        };

        match self
            .retrying(&name, || self.platform.create_worker(&candidate))
            .await?
        {
            CreateOutcome::Created(worker) => {
                info!(%name, %region, memory_mb = worker.memory_mb, "worker provisioned");
                Ok(EnsuredWorker {
                    worker,
                    already_existed: false,
                })
            }
            CreateOutcome::AlreadyExists(worker) => {
                info!(%name, %region, "worker created concurrently by another caller");
                Ok(EnsuredWorker {
                    worker,
                    already_existed: true,
                })
            }
        }
    }

    pub async fn list_workers(&self, region: &str) -> DeployResult<Vec<DeployedWorker>> {
        self.platform
            .list_workers(region)
            .await
            .map_err(DeployError::from_platform)
    }

    pub async fn get_worker(&self, region: &str, name: &str) -> DeployResult<DeployedWorker> {
        self.platform
            .find_worker(region, name)
            .await
            .map_err(DeployError::from_platform)?
            .ok_or_else(|| DeployError::NotFound {
                region: region.to_string(),
                name: name.to_string(),
            })
    }

    pub async fn delete_worker(&self, region: &str, name: &str) -> DeployResult<()> {
        match self.platform.delete_worker(region, name).await {
            Ok(()) => {
                info!(%name, %region, "worker deleted");
                Ok(())
            }
            Err(PlatformError::NotFound(_)) => Err(DeployError::NotFound {
                region: region.to_string(),
                name: name.to_string(),
            }),
            Err(e) => Err(DeployError::from_platform(e)),
        }
    }

    /// Delete every worker in `region`, continuing past failures.
    pub async fn delete_all_workers(&self, region: &str) -> DeployResult<Vec<DeleteOutcome>> {
        let workers = self.list_workers(region).await?;
        let mut outcomes = Vec::with_capacity(workers.len());
        for worker in workers {
            let error = match self.delete_worker(region, &worker.name).await {
                Ok(()) => None,
                Err(e) => {
                    warn!(name = %worker.name, %region, error = %e, "failed to delete worker");
                    Some(e.to_string())
                }
            };
            outcomes.push(DeleteOutcome {
                name: worker.name,
                error,
            });
        }
        Ok(outcomes)
    }

    pub fn logs_url(&self, region: &str, name: &str) -> String {
        self.platform.logs_url(region, name)
    }

    /// Run a platform call, retrying transient errors with backoff.
    async fn retrying<T, F, Fut>(&self, name: &str, mut call: F) -> DeployResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = PlatformResult<T>>,
    {
        let mut attempt = 1;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() => {
                    if !self.retry.allows_retry(attempt) {
                        warn!(%name, attempt, error = %e, "provisioning retries exhausted");
                        return Err(DeployError::ProvisioningFailed {
                            name: name.to_string(),
                            cause: e,
                        });
                    }
                    let delay = self.retry.delay_after(attempt);
                    debug!(%name, attempt, ?delay, error = %e, "transient platform error, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(DeployError::from_platform(e)),
            }
        }
    }
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
