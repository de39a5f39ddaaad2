//! Errors that prevent a render from starting.
//!
//! Failures after dispatch begins are not errors: they are reported in
//! the [`RenderOutcome`](crate::RenderOutcome) with a failure summary.

use thiserror::Error;

use rendergrid_core::{ConfigError, ErrorKind};
use rendergrid_deploy::DeployError;
use rendergrid_state::StateError;
use rendergrid_storage::StoreError;

pub type RenderResult<T> = Result<T, RenderError>;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Deploy(#[from] DeployError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("registry error: {0}")]
    State(#[from] StateError),

    #[error("no render job {0}")]
    JobNotFound(String),
}

impl RenderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RenderError::Config(e) => e.kind(),
            RenderError::Deploy(e) => e.kind(),
            RenderError::Store(e) => e.kind(),
            RenderError::State(_) => ErrorKind::Internal,
            RenderError::JobNotFound(_) => ErrorKind::NotFound,
        }
    }
}
