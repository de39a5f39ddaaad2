//! Webhook transports.

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

use crate::error::{ReportError, ReportResult};
use crate::webhook::{SIGNATURE_HEADER, SignedWebhook};

/// Delivers one signed webhook once. Retries are the reporter's job.
#[async_trait]
pub trait WebhookTransport: Send + Sync + 'static {
    /// Returns the HTTP status on any response; non-2xx is the caller's call.
    async fn send(&self, url: &str, webhook: &SignedWebhook) -> ReportResult<u16>;
}

/// Plain HTTP/1 transport over a fresh connection per delivery.
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpTransport;

#[async_trait]
impl WebhookTransport for HttpTransport {
    async fn send(&self, url: &str, webhook: &SignedWebhook) -> ReportResult<u16> {
        let signature = webhook.header_value();
        let (status, _) = rendergrid_deploy::post(
            url,
            Bytes::from(webhook.body.clone()),
            &[
                ("content-type", "application/json"),
                (SIGNATURE_HEADER, signature.as_str()),
            ],
        )
        .await
        .map_err(|e| ReportError::Transport(e.to_string()))?;
        debug!(url, status, "webhook delivered");
        Ok(status)
    }
}

#[derive(Default)]
struct Recorded {
    deliveries: Vec<(String, SignedWebhook)>,
    failures_left: u32,
}

/// Test transport that records every delivery attempt.
#[derive(Clone, Default)]
pub struct RecordingTransport {
    inner: Arc<Mutex<Recorded>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the first `n` attempts with a transport error.
    pub fn failing_first(n: u32) -> Self {
        let transport = Self::default();
        transport.lock().failures_left = n;
        transport
    }

    /// Every attempt so far, failed ones included.
    pub fn deliveries(&self) -> Vec<(String, SignedWebhook)> {
        self.lock().deliveries.clone()
    }

    fn lock(&self) -> MutexGuard<'_, Recorded> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl WebhookTransport for RecordingTransport {
    async fn send(&self, url: &str, webhook: &SignedWebhook) -> ReportResult<u16> {
        let mut inner = self.lock();
        inner.deliveries.push((url.to_string(), webhook.clone()));
        if inner.failures_left > 0 {
            inner.failures_left -= 1;
            return Err(ReportError::Transport("connection refused".to_string()));
        }
        Ok(200)
    }
}
