//! rendergrid-report: progress and notifications for render jobs.
//!
//! [`compute_progress`] and [`ProgressTracker`] turn a chunk table into a
//! [`JobProgress`](rendergrid_core::JobProgress) view. When a job reaches a
//! terminal state the [`WebhookReporter`] signs a payload with
//! HMAC-SHA256 and delivers it in the background. Delivery never affects
//! the job outcome.

pub mod error;
pub mod progress;
pub mod reporter;
pub mod transport;
pub mod webhook;

pub use error::{ReportError, ReportResult};
pub use progress::{ProgressTracker, compute_progress};
pub use reporter::{DeliveryReport, WebhookReporter};
pub use transport::{HttpTransport, RecordingTransport, WebhookTransport};
pub use webhook::{
    NO_SECRET_PROVIDED, SIGNATURE_FIELD, SIGNATURE_HEADER, SignedWebhook, WebhookPayload, sign,
    verify_embedded, verify_signature,
};
