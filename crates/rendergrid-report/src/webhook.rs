//! Webhook payloads and their HMAC-SHA256 signatures.
//!
//! The signature is computed over the JSON payload *without* its
//! `signature` field, then embedded in the body and repeated in the
//! [`SIGNATURE_HEADER`] header. Receivers drop the field, recompute the
//! HMAC with the shared secret and must reject the request on mismatch.

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::Sha256;

use rendergrid_core::{ErrorKind, FailureSummary, JobPhase};

use crate::error::{ReportError, ReportResult};

type HmacSha256 = Hmac<Sha256>;

/// Signature sent when no secret is configured.
pub const NO_SECRET_PROVIDED: &str = "NO_SECRET_PROVIDED";

/// Header carrying `sha256=<signature>`.
pub const SIGNATURE_HEADER: &str = "X-RenderGrid-Signature";

/// Body field carrying the bare signature.
pub const SIGNATURE_FIELD: &str = "signature";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookPayload {
    pub job_id: String,
    /// Terminal phase: `completed` or `failed`.
    pub state: JobPhase,
    pub output_ref: Option<String>,
    pub error_kind: Option<ErrorKind>,
    pub error_message: Option<String>,
    /// Chunk that caused the failure, if any.
    pub failed_chunk: Option<u32>,
    #[serde(default)]
    pub unresolved_chunks: Vec<u32>,
}

impl WebhookPayload {
    pub fn completed(job_id: &str, output_ref: Option<String>) -> Self {
        Self {
            job_id: job_id.to_string(),
            state: JobPhase::Completed,
            output_ref,
            error_kind: None,
            error_message: None,
            failed_chunk: None,
            unresolved_chunks: Vec::new(),
        }
    }

    pub fn failed(job_id: &str, failure: &FailureSummary) -> Self {
        Self {
            job_id: job_id.to_string(),
            state: JobPhase::Failed,
            output_ref: None,
            error_kind: Some(failure.kind),
            error_message: Some(failure.message.clone()),
            failed_chunk: failure.chunk,
            unresolved_chunks: failure.unresolved_chunks.clone(),
        }
    }
}

/// A serialized payload plus its signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedWebhook {
    /// JSON body, `signature` field included.
    pub body: String,
    pub signature: String,
}

impl SignedWebhook {
    /// Value for the [`SIGNATURE_HEADER`] header.
    pub fn header_value(&self) -> String {
        format!("sha256={}", self.signature)
    }
}

/// Serialize and sign a payload, embedding the signature in the body.
pub fn sign(payload: &WebhookPayload, secret: Option<&str>) -> ReportResult<SignedWebhook> {
    let mut value =
        serde_json::to_value(payload).map_err(|e| ReportError::Encode(e.to_string()))?;
    let unsigned = serde_json::to_string(&value).map_err(|e| ReportError::Encode(e.to_string()))?;
    let signature = signature_for(unsigned.as_bytes(), secret);

    let Value::Object(fields) = &mut value else {
        return Err(ReportError::Encode("payload is not a JSON object".to_string()));
    };
    fields.insert(SIGNATURE_FIELD.to_string(), Value::String(signature.clone()));
    let body = serde_json::to_string(&value).map_err(|e| ReportError::Encode(e.to_string()))?;
    Ok(SignedWebhook { body, signature })
}

fn signature_for(body: &[u8], secret: Option<&str>) -> String {
    let Some(secret) = secret else {
        return NO_SECRET_PROVIDED.to_string();
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return NO_SECRET_PROVIDED.to_string();
    };
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Split a received body into the embedded signature (if any) and the
/// canonical bytes that were signed. `None` when the body is not a JSON
/// object.
fn unsigned_body(body: &[u8]) -> Option<(Option<String>, String)> {
    let Ok(Value::Object(mut fields)) = serde_json::from_slice::<Value>(body) else {
        return None;
    };
    let embedded = match fields.remove(SIGNATURE_FIELD) {
        Some(Value::String(signature)) => Some(signature),
        Some(_) => return None,
        None => None,
    };
    let canonical = serde_json::to_string(&Value::Object(fields)).ok()?;
    Some((embedded, canonical))
}

/// Check a received signature against the body in constant time.
///
/// Accepts the bare hex signature or the `sha256=`-prefixed header value.
/// An embedded `signature` field is dropped before recomputing, and when
/// present it must agree with `signature`. With no secret, only the
/// [`NO_SECRET_PROVIDED`] marker verifies.
pub fn verify_signature(body: &[u8], signature: &str, secret: Option<&str>) -> bool {
    let signature = signature.strip_prefix("sha256=").unwrap_or(signature);
    let Some((embedded, canonical)) = unsigned_body(body) else {
        return false;
    };
    if embedded.is_some_and(|embedded| embedded != signature) {
        return false;
    }
    let Some(secret) = secret else {
        return signature == NO_SECRET_PROVIDED;
    };
    let Ok(expected) = hex::decode(signature) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(canonical.as_bytes());
    mac.verify_slice(&expected).is_ok()
}

/// Verify a body using only the signature embedded in it.
pub fn verify_embedded(body: &[u8], secret: Option<&str>) -> bool {
    match unsigned_body(body) {
        Some((Some(signature), _)) => verify_signature(body, &signature, secret),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> WebhookPayload {
        WebhookPayload::completed("job-1", Some("renders/job-1/out.mp4".to_string()))
    }

    #[test]
    fn signed_payload_verifies() {
        let signed = sign(&payload(), Some("s3cret")).unwrap();
        assert_eq!(signed.signature.len(), 64);
        assert!(verify_signature(signed.body.as_bytes(), &signed.signature, Some("s3cret")));
        assert!(verify_signature(
            signed.body.as_bytes(),
            &signed.header_value(),
            Some("s3cret")
        ));
    }

    #[test]
    fn tampered_body_or_wrong_secret_is_rejected() {
        let signed = sign(&payload(), Some("s3cret")).unwrap();
        let tampered = signed.body.replace("job-1", "job-2");
        assert!(!verify_signature(tampered.as_bytes(), &signed.signature, Some("s3cret")));
        assert!(!verify_signature(signed.body.as_bytes(), &signed.signature, Some("other")));
        assert!(!verify_signature(signed.body.as_bytes(), "zz-not-hex", Some("s3cret")));
    }

    #[test]
    fn missing_secret_uses_marker() {
        let signed = sign(&payload(), None).unwrap();
        assert_eq!(signed.signature, NO_SECRET_PROVIDED);
        assert!(verify_signature(signed.body.as_bytes(), NO_SECRET_PROVIDED, None));
        assert!(!verify_signature(signed.body.as_bytes(), NO_SECRET_PROVIDED, Some("s3cret")));
    }

    #[test]
    fn body_embeds_the_signature() {
        let signed = sign(&payload(), Some("s3cret")).unwrap();
        let json: Value = serde_json::from_str(&signed.body).unwrap();
        assert_eq!(json[SIGNATURE_FIELD], signed.signature.as_str());
        assert_eq!(json["jobId"], "job-1");
        assert!(verify_embedded(signed.body.as_bytes(), Some("s3cret")));
        assert!(!verify_embedded(signed.body.as_bytes(), Some("other")));

        // The signature covers the payload as it looks without the field.
        let unsigned = serde_json::to_string(&payload()).unwrap();
        assert!(!unsigned.contains(SIGNATURE_FIELD));
        assert_eq!(signature_for(unsigned.as_bytes(), Some("s3cret")), signed.signature);
    }

    #[test]
    fn embedded_signature_must_match_the_presented_one() {
        let signed = sign(&payload(), Some("s3cret")).unwrap();
        let other = sign(&WebhookPayload::completed("job-2", None), Some("s3cret")).unwrap();
        assert!(!verify_signature(signed.body.as_bytes(), &other.signature, Some("s3cret")));

        let swapped = signed.body.replace(&signed.signature, &other.signature);
        assert!(!verify_embedded(swapped.as_bytes(), Some("s3cret")));
        assert!(!verify_embedded(b"not json", Some("s3cret")));
        assert!(!verify_embedded(br#"{"jobId":"job-1"}"#, Some("s3cret")));
    }

    #[test]
    fn failed_payload_carries_failure_details() {
        let failure = FailureSummary {
            kind: ErrorKind::InvocationTimeout,
            message: "chunk 3 timed out".to_string(),
            chunk: Some(3),
            unresolved_chunks: vec![3],
        };
        let payload = WebhookPayload::failed("job-9", &failure);
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["state"], "failed");
        assert_eq!(json["errorKind"], "invocationTimeout");
        assert_eq!(json["failedChunk"], 3);
        assert_eq!(json["unresolvedChunks"], serde_json::json!([3]));
    }
}
