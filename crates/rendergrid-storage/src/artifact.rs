//! ArtifactStore: region-scoped object operations over a [`BlobStore`].
//!
//! The store resolves its bucket lazily through a shared
//! [`BucketResolver`], so every store in the process targeting the same
//! region uses the same bucket and the backend is asked at most once.
//! Prefix listings are cached until a write or delete touches them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

use rendergrid_core::naming;

use crate::backend::{BlobStore, ObjectSummary};
use crate::error::{StoreError, StoreResult};

// ── Bucket resolution ─────────────────────────────────────────────

/// Process-wide memo of region → bucket.
pub struct BucketResolver {
    backend: Arc<dyn BlobStore>,
    family: String,
    account_id: String,
    /// Held across the backend round-trip so concurrent first callers
    /// for a region do not both create a bucket.
    resolved: AsyncMutex<HashMap<String, String>>,
}

impl BucketResolver {
    pub fn new(backend: Arc<dyn BlobStore>, family: &str, account_id: &str) -> Self {
        Self {
            backend,
            family: family.to_string(),
            account_id: account_id.to_string(),
            resolved: AsyncMutex::new(HashMap::new()),
        }
    }

    /// Bucket for `region`, selecting an existing one or creating it.
    pub async fn bucket_for(&self, region: &str) -> StoreResult<String> {
        let mut resolved = self.resolved.lock().await;
        if let Some(bucket) = resolved.get(region) {
            return Ok(bucket.clone());
        }

        let expected = naming::derive_bucket_name(&self.family, region, &self.account_id);
        let existing = self.backend.list_buckets(region).await?;
        let family_prefix = format!("{}-", self.family);
        let bucket = if existing.contains(&expected) {
            expected
        } else if let Some(found) = existing.iter().find(|b| b.starts_with(&family_prefix)) {
            debug!(bucket = %found, %region, "reusing existing bucket");
            found.clone()
        } else {
            self.backend.create_bucket(region, &expected).await?;
            info!(bucket = %expected, %region, "created artifact bucket");
            expected
        };

        resolved.insert(region.to_string(), bucket.clone());
        Ok(bucket)
    }
}

// ── Deletion results ──────────────────────────────────────────────

/// Outcome of deleting one object during a prefix sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectDeletion {
    pub path: String,
    pub size: u64,
    /// `None` when the object was deleted.
    pub error: Option<String>,
}

/// Result of [`ArtifactStore::delete_all_under_prefix`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrefixDeletion {
    /// Bytes of the objects that were actually deleted.
    pub freed_bytes: u64,
    pub outcomes: Vec<ObjectDeletion>,
}

impl PrefixDeletion {
    pub fn failures(&self) -> impl Iterator<Item = &ObjectDeletion> {
        self.outcomes.iter().filter(|o| o.error.is_some())
    }

    pub fn deleted(&self) -> usize {
        self.outcomes.iter().filter(|o| o.error.is_none()).count()
    }
}

// ── ArtifactStore ─────────────────────────────────────────────────

/// Object operations against the bucket of one region.
#[derive(Clone)]
pub struct ArtifactStore {
    backend: Arc<dyn BlobStore>,
    resolver: Arc<BucketResolver>,
    region: String,
    listings: Arc<Mutex<HashMap<String, Vec<ObjectSummary>>>>,
}

impl ArtifactStore {
    pub fn new(backend: Arc<dyn BlobStore>, resolver: Arc<BucketResolver>, region: &str) -> Self {
        Self {
            backend,
            resolver,
            region: region.to_string(),
            listings: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Convenience constructor with a private resolver.
    pub fn for_region(
        backend: Arc<dyn BlobStore>,
        family: &str,
        account_id: &str,
        region: &str,
    ) -> Self {
        let resolver = Arc::new(BucketResolver::new(backend.clone(), family, account_id));
        Self::new(backend, resolver, region)
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub async fn bucket(&self) -> StoreResult<String> {
        self.resolver.bucket_for(&self.region).await
    }

    pub async fn put_object(&self, path: &str, data: Bytes) -> StoreResult<()> {
        let bucket = self.bucket().await?;
        let size = data.len();
        self.backend.put(&bucket, path, data).await?;
        self.invalidate(path);
        debug!(%bucket, %path, size, "object written");
        Ok(())
    }

    pub async fn get_object(&self, path: &str) -> StoreResult<Bytes> {
        let bucket = self.bucket().await?;
        self.backend.get(&bucket, path).await
    }

    pub async fn object_exists(&self, path: &str) -> StoreResult<bool> {
        let bucket = self.bucket().await?;
        Ok(self.backend.head(&bucket, path).await?.is_some())
    }

    /// Objects under `prefix`, served from the listing cache when fresh.
    pub async fn get_object_list(&self, prefix: &str) -> StoreResult<Vec<ObjectSummary>> {
        if let Some(cached) = self.cache().get(prefix) {
            return Ok(cached.clone());
        }
        let bucket = self.bucket().await?;
        let listed = self.backend.list(&bucket, prefix).await?;
        self.cache().insert(prefix.to_string(), listed.clone());
        Ok(listed)
    }

    /// Delete one object. `NotFound` if it does not exist.
    pub async fn delete_object(&self, path: &str) -> StoreResult<()> {
        let bucket = self.bucket().await?;
        let result = self.backend.delete(&bucket, path).await;
        self.invalidate(path);
        result
    }

    /// Delete everything under `prefix`, continuing past per-object errors.
    pub async fn delete_all_under_prefix(&self, prefix: &str) -> StoreResult<PrefixDeletion> {
        let bucket = self.bucket().await?;
        let objects = self.backend.list(&bucket, prefix).await?;
        let mut deletion = PrefixDeletion::default();
        for object in objects {
            let error = match self.backend.delete(&bucket, &object.path).await {
                Ok(()) => {
                    deletion.freed_bytes += object.size;
                    None
                }
                Err(e) => {
                    warn!(path = %object.path, error = %e, "failed to delete object");
                    Some(e.to_string())
                }
            };
            deletion.outcomes.push(ObjectDeletion {
                path: object.path,
                size: object.size,
                error,
            });
        }
        self.invalidate(prefix);
        info!(
            %prefix,
            deleted = deletion.deleted(),
            failed = deletion.failures().count(),
            freed_bytes = deletion.freed_bytes,
            "prefix deleted"
        );
        Ok(deletion)
    }

    pub async fn presign(&self, path: &str, ttl: Duration) -> StoreResult<String> {
        let bucket = self.bucket().await?;
        self.backend.presign(&bucket, path, ttl).await
    }

    fn cache(&self) -> MutexGuard<'_, HashMap<String, Vec<ObjectSummary>>> {
        self.listings
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Drop every cached listing that could contain `path`, plus any
    /// listing nested under it when `path` is itself a prefix.
    fn invalidate(&self, path: &str) {
        self.cache()
            .retain(|prefix, _| !path.starts_with(prefix.as_str()) && !prefix.starts_with(path));
    }
}

impl std::fmt::Debug for ArtifactStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactStore")
            .field("region", &self.region)
            .finish_non_exhaustive()
    }
}

/// Map a missing object to `Ok(None)`.
pub(crate) fn optional<T>(result: StoreResult<T>) -> StoreResult<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(StoreError::NotFound(_)) => Ok(None),
        Err(e) => Err(e),
    }
}
