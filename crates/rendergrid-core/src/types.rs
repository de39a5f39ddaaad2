//! Shared types used across RenderGrid crates.

use serde::{Deserialize, Serialize};

use crate::naming::WorkerIdentity;

/// Half-open time range `[start_ms, end_ms)` of the output timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeRange {
    pub start_ms: u64,
    pub end_ms: u64,
}

impl TimeRange {
    pub fn new(start_ms: u64, end_ms: u64) -> Self {
        Self { start_ms, end_ms }
    }

    pub fn duration_ms(&self) -> u64 {
        self.end_ms.saturating_sub(self.start_ms)
    }
}

/// Network attachment for a provisioned worker.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// VPC connector / subnet the worker egresses through.
    pub vpc_connector: Option<String>,
    /// Egress policy, e.g. `all-traffic` or `private-ranges-only`.
    pub egress: Option<String>,
}

/// Everything needed to provision a worker.
///
/// The identity determines the worker name; the remaining fields are
/// provisioning settings that ride along on first creation only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerSpec {
    pub identity: WorkerIdentity,
    pub disk_mb: u32,
    pub enhanced_monitoring: bool,
    pub execution_role: Option<String>,
    pub network: Option<NetworkConfig>,
}

/// Error taxonomy surfaced to callers, webhooks and exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    InvalidConfig,
    InsufficientPermissions,
    ProvisioningFailed,
    UnsupportedConfiguration,
    InvocationTimeout,
    InvocationFailed,
    StitchFailed,
    QuotaExceeded,
    NotFound,
    AccessDenied,
    Cancelled,
    DeadlineExceeded,
    Internal,
}

/// Coarse failure class used for process exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitClass {
    /// The caller asked for something that can never work as given.
    Validation,
    /// The request was valid but something failed while carrying it out.
    Operational,
}

impl ExitClass {
    pub fn code(self) -> i32 {
        match self {
            ExitClass::Validation => 2,
            ExitClass::Operational => 1,
        }
    }
}

impl ErrorKind {
    pub fn exit_class(self) -> ExitClass {
        match self {
            ErrorKind::InvalidConfig
            | ErrorKind::InsufficientPermissions
            | ErrorKind::UnsupportedConfiguration => ExitClass::Validation,
            _ => ExitClass::Operational,
        }
    }

    /// Whether a chunk-level error of this kind may be retried.
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::InvocationTimeout | ErrorKind::InvocationFailed)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::InvalidConfig => "InvalidConfig",
            ErrorKind::InsufficientPermissions => "InsufficientPermissions",
            ErrorKind::ProvisioningFailed => "ProvisioningFailed",
            ErrorKind::UnsupportedConfiguration => "UnsupportedConfiguration",
            ErrorKind::InvocationTimeout => "InvocationTimeout",
            ErrorKind::InvocationFailed => "InvocationFailed",
            ErrorKind::StitchFailed => "StitchFailed",
            ErrorKind::QuotaExceeded => "QuotaExceeded",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::AccessDenied => "AccessDenied",
            ErrorKind::Cancelled => "Cancelled",
            ErrorKind::DeadlineExceeded => "DeadlineExceeded",
            ErrorKind::Internal => "Internal",
        };
        f.write_str(s)
    }
}

// ── Render jobs ───────────────────────────────────────────────────

/// Lifecycle state of one chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "state")]
pub enum ChunkState {
    Pending,
    InFlight,
    Done,
    /// `terminal` once retries are exhausted.
    Failed { terminal: bool },
}

/// Why a chunk attempt failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkError {
    pub kind: ErrorKind,
    pub message: String,
    /// Where the worker's logs for this attempt can be read.
    pub logs_url: Option<String>,
}

/// One row of a render job's chunk table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkRecord {
    pub index: u32,
    pub range: TimeRange,
    pub state: ChunkState,
    /// Attempts started so far (1-indexed once dispatched).
    pub attempts: u32,
    pub output_ref: Option<String>,
    pub error: Option<ChunkError>,
}

impl ChunkRecord {
    pub fn pending(index: u32, range: TimeRange) -> Self {
        Self {
            index,
            range,
            state: ChunkState::Pending,
            attempts: 0,
            output_ref: None,
            error: None,
        }
    }
}

/// Job-level phase of a render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum JobPhase {
    Splitting,
    Dispatching,
    Collecting,
    Stitching,
    Completed,
    Failed,
}

impl JobPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobPhase::Completed | JobPhase::Failed)
    }
}

/// Aggregate, read-only view over a chunk table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobProgress {
    pub total: u32,
    pub pending: u32,
    pub in_flight: u32,
    pub done: u32,
    /// Chunks currently failed, retryable or terminal.
    pub failed: u32,
    /// Completed share of the job, 0.0–100.0.
    pub percent: f64,
    /// First chunk that exhausted its retries, if any.
    pub first_fatal: Option<FatalChunk>,
}

/// A chunk failure that ended the job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FatalChunk {
    pub index: u32,
    pub error: ChunkError,
}

/// What a failed job reports: the first fatal error and what was left.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureSummary {
    pub kind: ErrorKind,
    pub message: String,
    /// Chunk that caused the failure; `None` for stitch, deadline or cancellation.
    pub chunk: Option<u32>,
    /// Chunks that never reached Done.
    pub unresolved_chunks: Vec<u32>,
}

impl std::fmt::Display for FailureSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.chunk {
            Some(index) => write!(f, "{} in chunk {index}: {}", self.kind, self.message)?,
            None => write!(f, "{}: {}", self.kind, self.message)?,
        }
        if !self.unresolved_chunks.is_empty() {
            write!(f, " (unresolved chunks: {:?})", self.unresolved_chunks)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_kinds_exit_with_two() {
        assert_eq!(ErrorKind::InvalidConfig.exit_class().code(), 2);
        assert_eq!(ErrorKind::InsufficientPermissions.exit_class().code(), 2);
        assert_eq!(ErrorKind::UnsupportedConfiguration.exit_class().code(), 2);
    }

    #[test]
    fn operational_kinds_exit_with_one() {
        for kind in [
            ErrorKind::ProvisioningFailed,
            ErrorKind::InvocationTimeout,
            ErrorKind::StitchFailed,
            ErrorKind::QuotaExceeded,
            ErrorKind::NotFound,
        ] {
            assert_eq!(kind.exit_class(), ExitClass::Operational);
        }
    }

    #[test]
    fn only_invocation_errors_are_retryable() {
        assert!(ErrorKind::InvocationTimeout.is_retryable());
        assert!(ErrorKind::InvocationFailed.is_retryable());
        assert!(!ErrorKind::StitchFailed.is_retryable());
        assert!(!ErrorKind::QuotaExceeded.is_retryable());
    }

    #[test]
    fn error_kind_serializes_camel_case() {
        let json = serde_json::to_string(&ErrorKind::InvocationTimeout).unwrap();
        assert_eq!(json, "\"invocationTimeout\"");
    }

    #[test]
    fn failure_summary_names_chunk_and_unresolved() {
        let summary = FailureSummary {
            kind: ErrorKind::InvocationTimeout,
            message: "worker did not answer".to_string(),
            chunk: Some(3),
            unresolved_chunks: vec![3, 4],
        };
        let text = summary.to_string();
        assert!(text.contains("chunk 3"));
        assert!(text.contains("[3, 4]"));
    }

    #[test]
    fn chunk_state_serializes_tagged() {
        let json = serde_json::to_string(&ChunkState::Failed { terminal: true }).unwrap();
        assert_eq!(json, r#"{"state":"failed","terminal":true}"#);
    }

    #[test]
    fn time_range_duration() {
        assert_eq!(TimeRange::new(30_000, 60_000).duration_ms(), 30_000);
        assert_eq!(TimeRange::new(5, 5).duration_ms(), 0);
    }
}
