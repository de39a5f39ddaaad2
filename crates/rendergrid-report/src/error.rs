//! Reporter errors.

use thiserror::Error;

use rendergrid_core::ErrorKind;

pub type ReportResult<T> = Result<T, ReportError>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReportError {
    #[error("failed to encode webhook payload: {0}")]
    Encode(String),

    #[error("webhook transport error: {0}")]
    Transport(String),

    #[error("webhook endpoint answered HTTP {0}")]
    Status(u16),

    #[error("webhook delivery timed out after {0}ms")]
    Timeout(u64),
}

impl ReportError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Internal
    }
}
