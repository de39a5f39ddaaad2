//! Domain records persisted in the registry.
//!
//! Workers and sites mirror resources that live on the platform; render
//! records are progress snapshots written by the orchestrator so another
//! process can answer "how far along is job X".

use serde::{Deserialize, Serialize};

use rendergrid_core::{FailureSummary, JobPhase, JobProgress, NetworkConfig, WorkerIdentity};

// ── Workers ───────────────────────────────────────────────────────

/// A provisioned worker (function or service).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DeployedWorker {
    pub name: String,
    pub region: String,
    /// The identity `name` was derived from.
    pub identity: WorkerIdentity,
    pub memory_mb: u64,
    pub cpu_millis: u32,
    pub disk_mb: u32,
    pub timeout_secs: u32,
    pub version: String,
    pub enhanced_monitoring: bool,
    pub execution_role: Option<String>,
    pub network: Option<NetworkConfig>,
    /// Invocation endpoint, when the platform exposes one.
    pub endpoint: Option<String>,
    /// Unix timestamp (seconds) of creation.
    pub created_at: u64,
}

impl DeployedWorker {
    /// Build the composite key for the workers table.
    pub fn table_key(&self) -> String {
        worker_key(&self.region, &self.name)
    }
}

/// Composite key for a worker within a region.
pub fn worker_key(region: &str, name: &str) -> String {
    format!("{region}/{name}")
}

// ── Sites ─────────────────────────────────────────────────────────

/// An uploaded render bundle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SiteRecord {
    pub site_name: String,
    pub region: String,
    pub bucket: String,
    pub serve_url: String,
    pub size_bytes: u64,
    pub files: u32,
    pub updated_at: u64,
}

impl SiteRecord {
    /// Build the composite key for the sites table.
    pub fn table_key(&self) -> String {
        format!("{}/{}", self.region, self.site_name)
    }
}

// ── Renders ───────────────────────────────────────────────────────

/// Persisted snapshot of a render job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RenderRecord {
    pub job_id: String,
    pub region: String,
    pub site_name: String,
    pub worker_name: String,
    pub phase: JobPhase,
    pub progress: JobProgress,
    pub output_ref: Option<String>,
    pub failure: Option<FailureSummary>,
    pub started_at: u64,
    pub updated_at: u64,
}
