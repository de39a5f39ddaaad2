//! The blob store seam.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::StoreResult;

/// Path and size of one stored object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectSummary {
    pub path: String,
    pub size: u64,
}

/// A bucketed object store such as S3 or GCS.
///
/// Implementations must be strongly consistent per key: a `put` followed
/// by `head` or `get` on the same path observes the write.
#[async_trait]
pub trait BlobStore: Send + Sync + 'static {
    /// Buckets that exist in `region`.
    async fn list_buckets(&self, region: &str) -> StoreResult<Vec<String>>;

    /// Create a bucket. Returns `QuotaExceeded` when the account is at its
    /// bucket limit.
    async fn create_bucket(&self, region: &str, bucket: &str) -> StoreResult<()>;

    /// Write an object, replacing any previous content.
    async fn put(&self, bucket: &str, path: &str, data: Bytes) -> StoreResult<()>;

    /// Read a whole object. Returns `NotFound` if missing.
    async fn get(&self, bucket: &str, path: &str) -> StoreResult<Bytes>;

    /// Size of an object, or `None` if it does not exist.
    async fn head(&self, bucket: &str, path: &str) -> StoreResult<Option<u64>>;

    /// Objects whose path starts with `prefix`, sorted by path.
    async fn list(&self, bucket: &str, prefix: &str) -> StoreResult<Vec<ObjectSummary>>;

    /// Delete an object. Returns `NotFound` if missing.
    async fn delete(&self, bucket: &str, path: &str) -> StoreResult<()>;

    /// A URL granting read access to the object for `ttl`.
    async fn presign(&self, bucket: &str, path: &str, ttl: Duration) -> StoreResult<String>;
}
