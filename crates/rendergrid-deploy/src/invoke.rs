//! Worker invocation: the request/response contract and an HTTP client.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use rendergrid_core::TimeRange;
use rendergrid_state::DeployedWorker;

use crate::client::post_json;

/// What a worker is asked to render.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationRequest {
    pub job_id: String,
    pub chunk_index: u32,
    pub time_range: TimeRange,
    /// URL of the site bundle to render from.
    pub site_ref: String,
    /// Name of the worker configuration serving the request.
    pub worker_config_ref: String,
    /// Object key the worker must write its output to.
    pub output_key: String,
    pub attempt: u32,
}

/// What a worker answers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationResponse {
    pub success: bool,
    pub output_ref: Option<String>,
    pub error_detail: Option<String>,
}

impl InvocationResponse {
    pub fn ok(output_ref: impl Into<String>) -> Self {
        Self {
            success: true,
            output_ref: Some(output_ref.into()),
            error_detail: None,
        }
    }

    pub fn failed(detail: impl Into<String>) -> Self {
        Self {
            success: false,
            output_ref: None,
            error_detail: Some(detail.into()),
        }
    }
}

/// The invocation never produced a worker response.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InvokeError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("worker returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed worker response: {0}")]
    Decode(String),
}

/// Sends one chunk render to a worker.
///
/// Implementations must not retry; the orchestrator owns retries.
#[async_trait]
pub trait WorkerInvoker: Send + Sync + 'static {
    async fn invoke(
        &self,
        worker: &DeployedWorker,
        request: &InvocationRequest,
    ) -> Result<InvocationResponse, InvokeError>;
}

/// Invokes workers over HTTP/1: `POST <endpoint>/invoke/<worker-name>`.
#[derive(Debug, Clone)]
pub struct HttpInvoker {
    default_endpoint: String,
}

impl HttpInvoker {
    /// `default_endpoint` is used for workers that carry no endpoint of
    /// their own, e.g. `http://127.0.0.1:9000`.
    pub fn new(default_endpoint: impl Into<String>) -> Self {
        Self {
            default_endpoint: default_endpoint.into(),
        }
    }

    fn url_for(&self, worker: &DeployedWorker) -> String {
        let base = worker
            .endpoint
            .as_deref()
            .unwrap_or(&self.default_endpoint)
            .trim_end_matches('/');
        format!("{base}/invoke/{}", worker.name)
    }
}

#[async_trait]
impl WorkerInvoker for HttpInvoker {
    async fn invoke(
        &self,
        worker: &DeployedWorker,
        request: &InvocationRequest,
    ) -> Result<InvocationResponse, InvokeError> {
        let url = self.url_for(worker);
        let body = serde_json::to_vec(request).map_err(|e| InvokeError::Decode(e.to_string()))?;
        let (status, response) = post_json(&url, Bytes::from(body)).await?;
        if !(200..300).contains(&status) {
            return Err(InvokeError::Status {
                status,
                body: String::from_utf8_lossy(&response).into_owned(),
            });
        }
        serde_json::from_slice(&response).map_err(|e| InvokeError::Decode(e.to_string()))
    }
}
