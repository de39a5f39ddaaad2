//! In-memory worker platform for tests.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use rendergrid_state::DeployedWorker;

use crate::error::{PlatformError, PlatformResult};
use crate::platform::{CreateOutcome, WorkerPlatform};

#[derive(Default)]
struct Inner {
    /// `(region, name)` → worker
    workers: BTreeMap<(String, String), DeployedWorker>,
    create_failures: VecDeque<PlatformError>,
    failing_deletes: HashSet<String>,
}

/// Worker platform kept in process memory.
///
/// Counts provisioning calls and can be scripted to fail, and can stall
/// creation to widen race windows in concurrency tests.
#[derive(Clone, Default)]
pub struct MemoryPlatform {
    inner: Arc<Mutex<Inner>>,
    create_calls: Arc<AtomicUsize>,
    created: Arc<AtomicUsize>,
    create_delay: Option<Duration>,
}

impl MemoryPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long inside every create call before committing.
    pub fn with_create_delay(delay: Duration) -> Self {
        Self {
            create_delay: Some(delay),
            ..Self::default()
        }
    }

    /// Fail the next create calls with these errors, in order.
    pub fn fail_next_creates(&self, errors: impl IntoIterator<Item = PlatformError>) {
        self.lock().create_failures.extend(errors);
    }

    /// Make deleting `name` fail with an opaque error.
    pub fn fail_delete(&self, name: &str) {
        self.lock().failing_deletes.insert(name.to_string());
    }

    /// Create calls received, including failed ones.
    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    /// Workers actually provisioned.
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl WorkerPlatform for MemoryPlatform {
    async fn find_worker(&self, region: &str, name: &str) -> PlatformResult<Option<DeployedWorker>> {
        Ok(self
            .lock()
            .workers
            .get(&(region.to_string(), name.to_string()))
            .cloned())
    }

    async fn create_worker(&self, worker: &DeployedWorker) -> PlatformResult<CreateOutcome> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        let scripted = self.lock().create_failures.pop_front();
        if let Some(err) = scripted {
            return Err(err);
        }
        if let Some(delay) = self.create_delay {
            tokio::time::sleep(delay).await;
        }
        let mut inner = self.lock();
        let key = (worker.region.clone(), worker.name.clone());
        if let Some(existing) = inner.workers.get(&key) {
            return Ok(CreateOutcome::AlreadyExists(existing.clone()));
        }
        inner.workers.insert(key, worker.clone());
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(CreateOutcome::Created(worker.clone()))
    }

    async fn list_workers(&self, region: &str) -> PlatformResult<Vec<DeployedWorker>> {
        Ok(self
            .lock()
            .workers
            .iter()
            .filter(|((r, _), _)| r == region)
            .map(|(_, w)| w.clone())
            .collect())
    }

    async fn delete_worker(&self, region: &str, name: &str) -> PlatformResult<()> {
        let mut inner = self.lock();
        if inner.failing_deletes.contains(name) {
            return Err(PlatformError::Other(format!("injected delete failure for {name}")));
        }
        inner
            .workers
            .remove(&(region.to_string(), name.to_string()))
            .map(|_| ())
            .ok_or_else(|| PlatformError::NotFound(name.to_string()))
    }

    fn logs_url(&self, region: &str, name: &str) -> String {
        format!("memory://logs/{region}/{name}")
    }
}
