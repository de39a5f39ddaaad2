//! Fire-and-forget webhook delivery with bounded retries.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use rendergrid_core::RetryPolicy;
use rendergrid_core::config::WebhookConfig;

use crate::error::ReportError;
use crate::transport::WebhookTransport;
use crate::webhook::{WebhookPayload, sign};

/// How a delivery went. Informational only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryReport {
    pub delivered: bool,
    pub attempts: u32,
    pub last_error: Option<String>,
}

#[derive(Clone)]
pub struct WebhookReporter {
    url: String,
    secret: Option<String>,
    timeout: Duration,
    retry: RetryPolicy,
    transport: Arc<dyn WebhookTransport>,
}

impl WebhookReporter {
    pub fn new(config: &WebhookConfig, transport: Arc<dyn WebhookTransport>) -> Self {
        Self {
            url: config.url.clone(),
            secret: config.secret.clone(),
            timeout: Duration::from_millis(config.timeout_ms),
            retry: RetryPolicy::new(
                config.max_attempts.max(1),
                Duration::from_millis(200),
                Duration::from_secs(2),
            ),
            transport,
        }
    }

    pub fn with_backoff(mut self, base: Duration, max: Duration) -> Self {
        self.retry.base = base;
        self.retry.max = max;
        self
    }

    /// Deliver in a background task.
    ///
    /// The handle can be awaited for the report or dropped; either way the
    /// caller's own result is unaffected.
    pub fn dispatch(&self, payload: WebhookPayload) -> JoinHandle<DeliveryReport> {
        let reporter = self.clone();
        tokio::spawn(async move { reporter.deliver(&payload).await })
    }

    pub async fn deliver(&self, payload: &WebhookPayload) -> DeliveryReport {
        let signed = match sign(payload, self.secret.as_deref()) {
            Ok(signed) => signed,
            Err(e) => {
                warn!(job_id = %payload.job_id, error = %e, "webhook not sent");
                return DeliveryReport {
                    delivered: false,
                    attempts: 0,
                    last_error: Some(e.to_string()),
                };
            }
        };

        let mut attempt = 1;
        loop {
            let result = tokio::time::timeout(self.timeout, self.transport.send(&self.url, &signed))
                .await
                .unwrap_or_else(|_| Err(ReportError::Timeout(self.timeout.as_millis() as u64)))
                .and_then(|status| {
                    if (200..300).contains(&status) {
                        Ok(())
                    } else {
                        Err(ReportError::Status(status))
                    }
                });

            match result {
                Ok(()) => {
                    info!(job_id = %payload.job_id, attempt, "webhook delivered");
                    return DeliveryReport {
                        delivered: true,
                        attempts: attempt,
                        last_error: None,
                    };
                }
                Err(e) if self.retry.allows_retry(attempt) => {
                    let delay = self.retry.delay_after(attempt);
                    debug!(job_id = %payload.job_id, attempt, ?delay, error = %e, "webhook attempt failed");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    warn!(job_id = %payload.job_id, attempts = attempt, error = %e, "webhook delivery abandoned");
                    return DeliveryReport {
                        delivered: false,
                        attempts: attempt,
                        last_error: Some(e.to_string()),
                    };
                }
            }
        }
    }
}
