//! Artifact store errors.

use thiserror::Error;

use rendergrid_core::{ConfigError, ErrorKind};
use rendergrid_state::StateError;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object not found: {0}")]
    NotFound(String),

    /// Passed through verbatim from the backend.
    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("i/o error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("registry error: {0}")]
    State(#[from] StateError),
}

impl StoreError {
    pub(crate) fn io(path: impl std::fmt::Display, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::NotFound {
            return StoreError::NotFound(path.to_string());
        }
        StoreError::Io {
            path: path.to_string(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::NotFound(_) => ErrorKind::NotFound,
            StoreError::AccessDenied(_) => ErrorKind::AccessDenied,
            StoreError::QuotaExceeded(_) => ErrorKind::QuotaExceeded,
            StoreError::Config(_) => ErrorKind::InvalidConfig,
            StoreError::Backend(_) | StoreError::Io { .. } | StoreError::State(_) => {
                ErrorKind::Internal
            }
        }
    }
}
