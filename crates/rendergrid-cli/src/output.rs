//! The JSON envelope every command prints, and the exit status it implies.

use std::process::ExitCode;

use serde::Serialize;
use serde_json::Value;

use rendergrid_core::{ConfigError, ErrorKind};
use rendergrid_deploy::{DeployError, PermissionError};
use rendergrid_orchestrator::RenderError;
use rendergrid_state::StateError;
use rendergrid_storage::StoreError;

pub type CliResult<T> = Result<T, CliError>;

/// A failed command: what went wrong plus any partial result.
#[derive(Debug)]
pub struct CliError {
    pub kind: ErrorKind,
    pub message: String,
    pub data: Option<Value>,
}

impl CliError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

macro_rules! from_kinded {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl From<$ty> for CliError {
                fn from(e: $ty) -> Self {
                    Self::new(e.kind(), e.to_string())
                }
            }
        )+
    };
}

from_kinded!(ConfigError, DeployError, PermissionError, RenderError, StoreError);

impl From<StateError> for CliError {
    fn from(e: StateError) -> Self {
        Self::new(ErrorKind::Internal, e.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        Self::new(ErrorKind::Internal, format!("failed to encode result: {e}"))
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct Envelope {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl Envelope {
    pub fn from_result(result: CliResult<Value>) -> (Self, u8) {
        match result {
            Ok(data) => (
                Self {
                    success: true,
                    data: Some(data),
                    error: None,
                },
                0,
            ),
            Err(e) => {
                let code = e.kind.exit_class().code() as u8;
                (
                    Self {
                        success: false,
                        data: e.data,
                        error: Some(ErrorBody {
                            kind: e.kind,
                            message: e.message,
                        }),
                    },
                    code,
                )
            }
        }
    }
}

/// Print the envelope on stdout and turn the result into an exit status.
pub fn emit(result: CliResult<Value>) -> anyhow::Result<ExitCode> {
    let (envelope, code) = Envelope::from_result(result);
    println!("{}", serde_json::to_string_pretty(&envelope)?);
    Ok(ExitCode::from(code))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_envelope_has_no_error() {
        let (envelope, code) = Envelope::from_result(Ok(serde_json::json!({"name": "w"})));
        assert_eq!(code, 0);
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["data"]["name"], "w");
        assert!(json.get("error").is_none());
    }

    #[test]
    fn validation_failures_exit_with_two() {
        let err = CliError::from(ConfigError::invalid("worker.memory", "bad"));
        let (envelope, code) = Envelope::from_result(Err(err));
        assert_eq!(code, 2);
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"]["kind"], "invalidConfig");
    }

    #[test]
    fn operational_failures_exit_with_one_and_keep_data() {
        let err = CliError::new(ErrorKind::StitchFailed, "muxer exited with 1")
            .with_data(serde_json::json!({"jobId": "j"}));
        let (envelope, code) = Envelope::from_result(Err(err));
        assert_eq!(code, 1);
        assert_eq!(envelope.data.unwrap()["jobId"], "j");
    }
}
