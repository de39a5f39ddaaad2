//! In-memory blob store for tests and dry runs.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::backend::{BlobStore, ObjectSummary};
use crate::error::{StoreError, StoreResult};

/// Failure to return for paths under an injected prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectedFailure {
    AccessDenied,
    Backend,
}

#[derive(Default)]
struct Inner {
    /// region → bucket names
    buckets: HashMap<String, Vec<String>>,
    /// bucket → path → bytes
    objects: HashMap<String, BTreeMap<String, Bytes>>,
    failures: Vec<(String, InjectedFailure)>,
}

/// Blob store kept entirely in process memory.
///
/// Supports per-prefix failure injection, a bucket quota, and counters
/// for asserting how often the backend was actually hit.
#[derive(Clone, Default)]
pub struct MemoryBlobStore {
    inner: Arc<Mutex<Inner>>,
    bucket_limit: Option<usize>,
    list_calls: Arc<AtomicUsize>,
    put_calls: Arc<AtomicUsize>,
    bucket_creations: Arc<AtomicUsize>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse to create more than `limit` buckets across all regions.
    pub fn with_bucket_limit(limit: usize) -> Self {
        Self {
            bucket_limit: Some(limit),
            ..Self::default()
        }
    }

    /// Fail every object operation whose path starts with `prefix`.
    pub fn inject_failure(&self, prefix: impl Into<String>, failure: InjectedFailure) {
        self.lock().failures.push((prefix.into(), failure));
    }

    pub fn clear_failures(&self) {
        self.lock().failures.clear();
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn put_calls(&self) -> usize {
        self.put_calls.load(Ordering::SeqCst)
    }

    pub fn bucket_creations(&self) -> usize {
        self.bucket_creations.load(Ordering::SeqCst)
    }

    /// All object paths in a bucket.
    pub fn paths(&self, bucket: &str) -> Vec<String> {
        self.lock()
            .objects
            .get(bucket)
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_failure(inner: &Inner, path: &str) -> StoreResult<()> {
        for (prefix, failure) in &inner.failures {
            if path.starts_with(prefix.as_str()) {
                return Err(match failure {
                    InjectedFailure::AccessDenied => {
                        StoreError::AccessDenied(format!("injected denial for {path}"))
                    }
                    InjectedFailure::Backend => {
                        StoreError::Backend(format!("injected failure for {path}"))
                    }
                });
            }
        }
        Ok(())
    }

    fn bucket<'a>(inner: &'a Inner, bucket: &str) -> StoreResult<&'a BTreeMap<String, Bytes>> {
        inner
            .objects
            .get(bucket)
            .ok_or_else(|| StoreError::NotFound(format!("bucket {bucket}")))
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn list_buckets(&self, region: &str) -> StoreResult<Vec<String>> {
        Ok(self.lock().buckets.get(region).cloned().unwrap_or_default())
    }

    async fn create_bucket(&self, region: &str, bucket: &str) -> StoreResult<()> {
        let mut inner = self.lock();
        let total: usize = inner.buckets.values().map(Vec::len).sum();
        if let Some(limit) = self.bucket_limit {
            if total >= limit {
                return Err(StoreError::QuotaExceeded(format!(
                    "bucket limit of {limit} reached"
                )));
            }
        }
        let names = inner.buckets.entry(region.to_string()).or_default();
        if !names.iter().any(|b| b == bucket) {
            names.push(bucket.to_string());
        }
        inner.objects.entry(bucket.to_string()).or_default();
        self.bucket_creations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn put(&self, bucket: &str, path: &str, data: Bytes) -> StoreResult<()> {
        let mut inner = self.lock();
        Self::check_failure(&inner, path)?;
        inner
            .objects
            .get_mut(bucket)
            .ok_or_else(|| StoreError::NotFound(format!("bucket {bucket}")))?
            .insert(path.to_string(), data);
        self.put_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn get(&self, bucket: &str, path: &str) -> StoreResult<Bytes> {
        let inner = self.lock();
        Self::check_failure(&inner, path)?;
        Self::bucket(&inner, bucket)?
            .get(path)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(path.to_string()))
    }

    async fn head(&self, bucket: &str, path: &str) -> StoreResult<Option<u64>> {
        let inner = self.lock();
        Self::check_failure(&inner, path)?;
        Ok(Self::bucket(&inner, bucket)?
            .get(path)
            .map(|data| data.len() as u64))
    }

    async fn list(&self, bucket: &str, prefix: &str) -> StoreResult<Vec<ObjectSummary>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let inner = self.lock();
        Ok(Self::bucket(&inner, bucket)?
            .range(prefix.to_string()..)
            .take_while(|(path, _)| path.starts_with(prefix))
            .map(|(path, data)| ObjectSummary {
                path: path.clone(),
                size: data.len() as u64,
            })
            .collect())
    }

    async fn delete(&self, bucket: &str, path: &str) -> StoreResult<()> {
        let mut inner = self.lock();
        Self::check_failure(&inner, path)?;
        inner
            .objects
            .get_mut(bucket)
            .ok_or_else(|| StoreError::NotFound(format!("bucket {bucket}")))?
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(path.to_string()))
    }

    async fn presign(&self, bucket: &str, path: &str, ttl: Duration) -> StoreResult<String> {
        let inner = self.lock();
        if !Self::bucket(&inner, bucket)?.contains_key(path) {
            return Err(StoreError::NotFound(path.to_string()));
        }
        Ok(format!("memory://{bucket}/{path}?ttl={}", ttl.as_secs()))
    }
}
