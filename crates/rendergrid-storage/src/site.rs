//! Site bundles: upload, list and delete.
//!
//! A site is a directory of render assets uploaded under `sites/<site>/`.
//! Each deploy writes a `.manifest.json` with the sha256 and size of every
//! file, so a redeploy only uploads what changed and removes what was
//! dropped from the bundle.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{info, warn};
use walkdir::WalkDir;

use rendergrid_core::{ConfigError, naming};
use rendergrid_state::{SiteRecord, StateStore};

use crate::artifact::{ArtifactStore, PrefixDeletion, optional};
use crate::error::{StoreError, StoreResult};

const MANIFEST: &str = ".manifest.json";
const SERVE_TTL: Duration = Duration::from_secs(7 * 24 * 3600);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct ManifestEntry {
    sha256: String,
    size: u64,
}

type Manifest = BTreeMap<String, ManifestEntry>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadStats {
    pub uploaded: u32,
    pub deleted: u32,
    pub untouched: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteDeployment {
    pub site_name: String,
    pub bucket: String,
    pub serve_url: String,
    pub size_bytes: u64,
    pub files: u32,
    pub stats: UploadStats,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteInfo {
    pub site_name: String,
    pub size_bytes: u64,
    pub files: u32,
    pub serve_url: Option<String>,
}

struct BundleFile {
    relative: String,
    absolute: PathBuf,
    entry: ManifestEntry,
}

pub struct SiteManager {
    store: ArtifactStore,
    state: Option<StateStore>,
}

impl SiteManager {
    pub fn new(store: ArtifactStore) -> Self {
        Self { store, state: None }
    }

    /// Mirror site records into the registry.
    pub fn with_state(mut self, state: StateStore) -> Self {
        self.state = Some(state);
        self
    }

    /// Upload `bundle_dir` as a site.
    ///
    /// Without an explicit name the site is named after the bundle's
    /// content digest, so the same bundle always lands in the same place.
    pub async fn deploy_site(
        &self,
        bundle_dir: &Path,
        site_name: Option<&str>,
    ) -> StoreResult<SiteDeployment> {
        let files = scan_bundle(bundle_dir).await?;
        if files.is_empty() {
            return Err(ConfigError::invalid(
                "bundle_dir",
                format!("{} contains no files", bundle_dir.display()),
            )
            .into());
        }

        let site_name = match site_name {
            Some(name) => {
                naming::validate_site_name(name)?;
                name.to_string()
            }
            None => naming::site_name_from_digest(&bundle_digest(&files)),
        };
        let prefix = naming::site_prefix(&site_name);
        let manifest_key = format!("{prefix}{MANIFEST}");
        let previous = self.read_manifest(&manifest_key).await?;

        let mut stats = UploadStats::default();
        let mut manifest = Manifest::new();
        for file in &files {
            if previous.get(&file.relative) == Some(&file.entry) {
                stats.untouched += 1;
            } else {
                let data = tokio::fs::read(&file.absolute)
                    .await
                    .map_err(|e| StoreError::io(file.absolute.display(), e))?;
                self.store
                    .put_object(&format!("{prefix}{}", file.relative), Bytes::from(data))
                    .await?;
                stats.uploaded += 1;
            }
            manifest.insert(file.relative.clone(), file.entry.clone());
        }

        for stale in previous.keys().filter(|k| !manifest.contains_key(*k)) {
            match self.store.delete_object(&format!("{prefix}{stale}")).await {
                Ok(()) | Err(StoreError::NotFound(_)) => stats.deleted += 1,
                Err(e) => warn!(%site_name, file = %stale, error = %e, "failed to remove stale file"),
            }
        }

        let encoded =
            serde_json::to_vec_pretty(&manifest).map_err(|e| StoreError::Backend(e.to_string()))?;
        self.store.put_object(&manifest_key, Bytes::from(encoded)).await?;

        let entry_point = if manifest.contains_key("index.html") {
            "index.html"
        } else {
            files[0].relative.as_str()
        };
        let serve_url = self
            .store
            .presign(&format!("{prefix}{entry_point}"), SERVE_TTL)
            .await?;
        let bucket = self.store.bucket().await?;
        let size_bytes = manifest.values().map(|e| e.size).sum();
        let file_count = manifest.len() as u32;

        if let Some(state) = &self.state {
            state.put_site(&SiteRecord {
                site_name: site_name.clone(),
                region: self.store.region().to_string(),
                bucket: bucket.clone(),
                serve_url: serve_url.clone(),
                size_bytes,
                files: file_count,
                updated_at: epoch_secs(),
            })?;
        }

        info!(
            %site_name,
            uploaded = stats.uploaded,
            deleted = stats.deleted,
            untouched = stats.untouched,
            "site deployed"
        );
        Ok(SiteDeployment {
            site_name,
            bucket,
            serve_url,
            size_bytes,
            files: file_count,
            stats,
        })
    }

    /// Sites present in the region's bucket.
    pub async fn list_sites(&self) -> StoreResult<Vec<SiteInfo>> {
        let objects = self.store.get_object_list("sites/").await?;
        let mut sites: BTreeMap<String, SiteInfo> = BTreeMap::new();
        let mut has_index: BTreeMap<String, bool> = BTreeMap::new();
        for object in objects {
            let Some(rest) = object.path.strip_prefix("sites/") else {
                continue;
            };
            let Some((site, file)) = rest.split_once('/') else {
                continue;
            };
            let info = sites.entry(site.to_string()).or_insert_with(|| SiteInfo {
                site_name: site.to_string(),
                size_bytes: 0,
                files: 0,
                serve_url: None,
            });
            if file == MANIFEST {
                continue;
            }
            info.size_bytes += object.size;
            info.files += 1;
            if file == "index.html" {
                has_index.insert(site.to_string(), true);
            }
        }

        let mut result = Vec::with_capacity(sites.len());
        for (name, mut info) in sites {
            if has_index.contains_key(&name) {
                let path = format!("{}index.html", naming::site_prefix(&name));
                info.serve_url = Some(self.store.presign(&path, SERVE_TTL).await?);
            }
            result.push(info);
        }
        Ok(result)
    }

    /// Fresh serve URL for a deployed site's entry point.
    pub async fn serve_url(&self, site_name: &str) -> StoreResult<String> {
        naming::validate_site_name(site_name)?;
        let prefix = naming::site_prefix(site_name);
        let manifest = self.read_manifest(&format!("{prefix}{MANIFEST}")).await?;
        let entry_point = if manifest.contains_key("index.html") {
            "index.html"
        } else {
            manifest
                .keys()
                .next()
                .map(String::as_str)
                .ok_or_else(|| StoreError::NotFound(format!("site {site_name}")))?
        };
        self.store
            .presign(&format!("{prefix}{entry_point}"), SERVE_TTL)
            .await
    }

    /// Delete every object of a site. `NotFound` if nothing was there.
    pub async fn delete_site(&self, site_name: &str) -> StoreResult<PrefixDeletion> {
        naming::validate_site_name(site_name)?;
        let deletion = self
            .store
            .delete_all_under_prefix(&naming::site_prefix(site_name))
            .await?;
        if deletion.outcomes.is_empty() {
            return Err(StoreError::NotFound(format!("site {site_name}")));
        }
        if let Some(state) = &self.state {
            state.delete_site(self.store.region(), site_name)?;
        }
        Ok(deletion)
    }

    async fn read_manifest(&self, key: &str) -> StoreResult<Manifest> {
        let Some(raw) = optional(self.store.get_object(key).await)? else {
            return Ok(Manifest::new());
        };
        match serde_json::from_slice(&raw) {
            Ok(manifest) => Ok(manifest),
            Err(e) => {
                warn!(%key, error = %e, "unreadable site manifest, re-uploading everything");
                Ok(Manifest::new())
            }
        }
    }
}

/// Walk a bundle directory, hashing every regular file.
async fn scan_bundle(dir: &Path) -> StoreResult<Vec<BundleFile>> {
    if !dir.is_dir() {
        return Err(ConfigError::invalid(
            "bundle_dir",
            format!("{} is not a directory", dir.display()),
        )
        .into());
    }
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(|e| StoreError::Backend(e.to_string()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(dir) else {
            continue;
        };
        let relative = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        if relative == MANIFEST {
            continue;
        }
        let data = tokio::fs::read(entry.path())
            .await
            .map_err(|e| StoreError::io(entry.path().display(), e))?;
        files.push(BundleFile {
            relative,
            absolute: entry.path().to_path_buf(),
            entry: ManifestEntry {
                sha256: hex::encode(Sha256::digest(&data)),
                size: data.len() as u64,
            },
        });
    }
    Ok(files)
}

fn bundle_digest(files: &[BundleFile]) -> String {
    let mut hasher = Sha256::new();
    for file in files {
        hasher.update(file.relative.as_bytes());
        hasher.update(b":");
        hasher.update(file.entry.sha256.as_bytes());
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
