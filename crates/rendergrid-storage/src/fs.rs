//! Filesystem-backed blob store.
//!
//! Layout under the root directory:
//!
//! ```text
//! <root>/<bucket>/.bucket.json      { "region": "..." }
//! <root>/<bucket>/objects/<path>
//! ```

use std::path::{Component, Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;
use walkdir::WalkDir;

use crate::backend::{BlobStore, ObjectSummary};
use crate::error::{StoreError, StoreResult};

const BUCKET_MARKER: &str = ".bucket.json";
const STAGING_SUFFIX: &str = ".rg-partial";

#[derive(Serialize, Deserialize)]
struct BucketMarker {
    region: String,
}

/// Blob store that keeps each bucket as a directory.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
    signing_key: String,
}

impl FsBlobStore {
    /// `signing_key` seeds the tokens embedded in presigned URLs.
    pub fn new(root: impl Into<PathBuf>, signing_key: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            signing_key: signing_key.into(),
        }
    }

    fn bucket_dir(&self, bucket: &str) -> PathBuf {
        self.root.join(bucket)
    }

    fn object_path(&self, bucket: &str, path: &str) -> StoreResult<PathBuf> {
        let relative = Path::new(path);
        let safe = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if path.is_empty() || !safe {
            return Err(StoreError::Backend(format!("invalid object path {path:?}")));
        }
        let dir = self.bucket_dir(bucket);
        if !dir.join(BUCKET_MARKER).exists() {
            return Err(StoreError::NotFound(format!("bucket {bucket}")));
        }
        Ok(dir.join("objects").join(relative))
    }

    /// Token binding a path to an expiry time.
    fn sign(&self, bucket: &str, path: &str, expires: u64) -> String {
        let digest = Sha256::digest(
            format!("{}|{bucket}|{path}|{expires}", self.signing_key).as_bytes(),
        );
        hex::encode(&digest[..16])
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn list_buckets(&self, region: &str) -> StoreResult<Vec<String>> {
        let mut buckets = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(buckets),
            Err(e) => return Err(StoreError::io(self.root.display(), e)),
        };
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StoreError::io(self.root.display(), e))?
        {
            let marker = entry.path().join(BUCKET_MARKER);
            let Ok(raw) = tokio::fs::read(&marker).await else {
                continue;
            };
            let Ok(parsed) = serde_json::from_slice::<BucketMarker>(&raw) else {
                continue;
            };
            if parsed.region == region {
                buckets.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        buckets.sort();
        Ok(buckets)
    }

    async fn create_bucket(&self, region: &str, bucket: &str) -> StoreResult<()> {
        let dir = self.bucket_dir(bucket);
        tokio::fs::create_dir_all(dir.join("objects"))
            .await
            .map_err(|e| StoreError::io(dir.display(), e))?;
        let marker = serde_json::to_vec(&BucketMarker {
            region: region.to_string(),
        })
        .map_err(|e| StoreError::Backend(e.to_string()))?;
        let marker_path = dir.join(BUCKET_MARKER);
        tokio::fs::write(&marker_path, marker)
            .await
            .map_err(|e| StoreError::io(marker_path.display(), e))?;
        debug!(%bucket, %region, "bucket created");
        Ok(())
    }

    async fn put(&self, bucket: &str, path: &str, data: Bytes) -> StoreResult<()> {
        let target = self.object_path(bucket, path)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::io(parent.display(), e))?;
        }
        // Write then rename so readers never observe a partial object.
        let mut staging = target.clone().into_os_string();
        staging.push(STAGING_SUFFIX);
        let staging = PathBuf::from(staging);
        tokio::fs::write(&staging, &data)
            .await
            .map_err(|e| StoreError::io(staging.display(), e))?;
        tokio::fs::rename(&staging, &target)
            .await
            .map_err(|e| StoreError::io(target.display(), e))
    }

    async fn get(&self, bucket: &str, path: &str) -> StoreResult<Bytes> {
        let target = self.object_path(bucket, path)?;
        let data = tokio::fs::read(&target)
            .await
            .map_err(|e| StoreError::io(path, e))?;
        Ok(Bytes::from(data))
    }

    async fn head(&self, bucket: &str, path: &str) -> StoreResult<Option<u64>> {
        let target = self.object_path(bucket, path)?;
        match tokio::fs::metadata(&target).await {
            Ok(meta) if meta.is_file() => Ok(Some(meta.len())),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::io(path, e)),
        }
    }

    async fn list(&self, bucket: &str, prefix: &str) -> StoreResult<Vec<ObjectSummary>> {
        let dir = self.bucket_dir(bucket);
        if !dir.join(BUCKET_MARKER).exists() {
            return Err(StoreError::NotFound(format!("bucket {bucket}")));
        }
        let objects = dir.join("objects");
        let prefix = prefix.to_string();
        tokio::task::spawn_blocking(move || {
            let mut found = Vec::new();
            for entry in WalkDir::new(&objects).into_iter().filter_map(Result::ok) {
                if !entry.file_type().is_file() {
                    continue;
                }
                let Ok(relative) = entry.path().strip_prefix(&objects) else {
                    continue;
                };
                let path = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                if !path.starts_with(&prefix) || path.ends_with(STAGING_SUFFIX) {
                    continue;
                }
                let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
                found.push(ObjectSummary { path, size });
            }
            found.sort_by(|a, b| a.path.cmp(&b.path));
            found
        })
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))
    }

    async fn delete(&self, bucket: &str, path: &str) -> StoreResult<()> {
        let target = self.object_path(bucket, path)?;
        tokio::fs::remove_file(&target)
            .await
            .map_err(|e| StoreError::io(path, e))
    }

    async fn presign(&self, bucket: &str, path: &str, ttl: Duration) -> StoreResult<String> {
        let target = self.object_path(bucket, path)?;
        if self.head(bucket, path).await?.is_none() {
            return Err(StoreError::NotFound(path.to_string()));
        }
        let expires = epoch_secs() + ttl.as_secs();
        let token = self.sign(bucket, path, expires);
        Ok(format!(
            "file://{}?expires={expires}&token={token}",
            target.display()
        ))
    }
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store_with_bucket() -> (tempfile::TempDir, FsBlobStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path(), "acct-1");
        store.create_bucket("us-east1", "bkt").await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn put_get_list_delete() {
        let (_dir, store) = store_with_bucket().await;
        store
            .put("bkt", "sites/a/index.html", Bytes::from_static(b"<html>"))
            .await
            .unwrap();
        store
            .put("bkt", "sites/a/js/app.js", Bytes::from_static(b"1"))
            .await
            .unwrap();

        assert_eq!(
            store.get("bkt", "sites/a/index.html").await.unwrap(),
            Bytes::from_static(b"<html>")
        );
        let listed = store.list("bkt", "sites/a/").await.unwrap();
        assert_eq!(
            listed,
            vec![
                ObjectSummary { path: "sites/a/index.html".into(), size: 6 },
                ObjectSummary { path: "sites/a/js/app.js".into(), size: 1 },
            ]
        );

        store.delete("bkt", "sites/a/js/app.js").await.unwrap();
        let err = store.delete("bkt", "sites/a/js/app.js").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn buckets_are_listed_per_region() {
        let (_dir, store) = store_with_bucket().await;
        store.create_bucket("eu-west1", "other").await.unwrap();
        assert_eq!(store.list_buckets("us-east1").await.unwrap(), vec!["bkt"]);
        assert_eq!(store.list_buckets("eu-west1").await.unwrap(), vec!["other"]);
    }

    #[tokio::test]
    async fn rejects_escaping_paths() {
        let (_dir, store) = store_with_bucket().await;
        assert!(store.put("bkt", "../outside", Bytes::new()).await.is_err());
        assert!(store.put("bkt", "/abs", Bytes::new()).await.is_err());
    }

    #[tokio::test]
    async fn presign_embeds_expiry_and_token() {
        let (_dir, store) = store_with_bucket().await;
        store.put("bkt", "renders/j/out.mp4", Bytes::from_static(b"v")).await.unwrap();
        let url = store
            .presign("bkt", "renders/j/out.mp4", Duration::from_secs(60))
            .await
            .unwrap();
        assert!(url.starts_with("file://"));
        assert!(url.contains("expires="));
        assert!(url.contains("token="));

        let missing = store
            .presign("bkt", "renders/j/nope.mp4", Duration::from_secs(60))
            .await;
        assert!(matches!(missing, Err(StoreError::NotFound(_))));
    }
}
