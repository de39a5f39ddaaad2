//! rendergrid-storage: artifact store adapter for RenderGrid.
//!
//! One bucket per region holds two kinds of objects: site bundles under
//! `sites/<site>/` and render outputs under `renders/<job>/`. The
//! [`ArtifactStore`] wraps a [`BlobStore`] backend with per-region bucket
//! memoisation and a read-through cache of prefix listings. The
//! [`SiteManager`] uploads bundle directories incrementally on top of it.

pub mod artifact;
pub mod backend;
pub mod error;
pub mod fs;
pub mod memory;
pub mod site;

pub use artifact::{ArtifactStore, BucketResolver, ObjectDeletion, PrefixDeletion};
pub use backend::{BlobStore, ObjectSummary};
pub use error::{StoreError, StoreResult};
pub use fs::FsBlobStore;
pub use memory::{InjectedFailure, MemoryBlobStore};
pub use site::{SiteDeployment, SiteInfo, SiteManager, UploadStats};
