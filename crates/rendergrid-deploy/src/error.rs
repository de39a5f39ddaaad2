//! Deployment errors.

use thiserror::Error;

use rendergrid_core::{ConfigError, ErrorKind};
use rendergrid_state::StateError;

pub type PlatformResult<T> = Result<T, PlatformError>;
pub type DeployResult<T> = Result<T, DeployError>;

/// Errors reported by a worker platform.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlatformError {
    #[error("throttled: {0}")]
    Throttled(String),

    /// A conflicting operation on the same resource is still in flight.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Other(String),
}

impl PlatformError {
    /// Worth retrying after a short wait.
    pub fn is_transient(&self) -> bool {
        matches!(self, PlatformError::Throttled(_) | PlatformError::Conflict(_))
    }
}

impl From<StateError> for PlatformError {
    fn from(e: StateError) -> Self {
        PlatformError::Other(e.to_string())
    }
}

#[derive(Debug, Error)]
pub enum DeployError {
    #[error(transparent)]
    InvalidConfig(#[from] ConfigError),

    #[error("unsupported configuration: {0}")]
    Unsupported(String),

    #[error("provisioning {name} failed: {cause}")]
    ProvisioningFailed {
        name: String,
        #[source]
        cause: PlatformError,
    },

    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("worker {name} not found in {region}")]
    NotFound { region: String, name: String },

    #[error("platform error: {0}")]
    Platform(PlatformError),

    #[error("registry error: {0}")]
    State(#[from] StateError),
}

impl DeployError {
    /// Classify a platform error that will not be retried.
    pub(crate) fn from_platform(e: PlatformError) -> Self {
        match e {
            PlatformError::QuotaExceeded(msg) => DeployError::QuotaExceeded(msg),
            PlatformError::AccessDenied(msg) => DeployError::AccessDenied(msg),
            other => DeployError::Platform(other),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            DeployError::InvalidConfig(_) => ErrorKind::InvalidConfig,
            DeployError::Unsupported(_) => ErrorKind::UnsupportedConfiguration,
            DeployError::ProvisioningFailed { .. } => ErrorKind::ProvisioningFailed,
            DeployError::QuotaExceeded(_) => ErrorKind::QuotaExceeded,
            DeployError::AccessDenied(_) => ErrorKind::AccessDenied,
            DeployError::NotFound { .. } => ErrorKind::NotFound,
            DeployError::Platform(_) | DeployError::State(_) => ErrorKind::Internal,
        }
    }
}
