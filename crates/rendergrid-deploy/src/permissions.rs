//! Permission pre-flight.
//!
//! Each operation declares the capabilities it needs. Before the
//! operation touches anything, the validator asks a [`PolicySimulator`]
//! whether the caller holds each one and aborts on the first gap.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use rendergrid_core::ErrorKind;
use rendergrid_core::config::CredentialsConfig;

pub type PermissionResult<T> = Result<T, PermissionError>;

#[derive(Debug, Error)]
pub enum PermissionError {
    #[error("missing capability {capability} required to {operation}")]
    InsufficientPermissions {
        capability: Capability,
        operation: Operation,
    },

    #[error("policy simulation failed: {0}")]
    Simulator(String),
}

impl PermissionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PermissionError::InsufficientPermissions { .. } => ErrorKind::InsufficientPermissions,
            PermissionError::Simulator(_) => ErrorKind::Internal,
        }
    }
}

macro_rules! capabilities {
    ($($variant:ident => $name:literal),+ $(,)?) => {
        /// A single platform permission, written `service:Action`.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum Capability {
            $(#[serde(rename = $name)] $variant,)+
        }

        impl Capability {
            pub const ALL: &'static [Capability] = &[$(Capability::$variant,)+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $(Capability::$variant => $name,)+
                }
            }
        }

        impl FromStr for Capability {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($name => Ok(Capability::$variant),)+
                    other => Err(format!("unknown capability {other:?}")),
                }
            }
        }
    };
}

capabilities! {
    StorageCreateBucket => "storage:CreateBucket",
    StorageListBuckets => "storage:ListBuckets",
    StoragePutObject => "storage:PutObject",
    StorageGetObject => "storage:GetObject",
    StorageListObjects => "storage:ListObjects",
    StorageDeleteObject => "storage:DeleteObject",
    WorkerCreate => "worker:Create",
    WorkerGet => "worker:Get",
    WorkerList => "worker:List",
    WorkerDelete => "worker:Delete",
    WorkerInvoke => "worker:Invoke",
    LogsRead => "logs:Read",
    IamPassRole => "iam:PassRole",
}

impl Capability {
    /// The `service` part of `service:Action`.
    pub fn service(self) -> &'static str {
        self.as_str().split(':').next().unwrap_or_default()
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An operation exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Operation {
    DeployWorker,
    ListWorkers,
    DeleteWorker,
    DeploySite,
    ListSites,
    DeleteSite,
    Render,
    Progress,
}

impl Operation {
    pub const ALL: &'static [Operation] = &[
        Operation::DeployWorker,
        Operation::ListWorkers,
        Operation::DeleteWorker,
        Operation::DeploySite,
        Operation::ListSites,
        Operation::DeleteSite,
        Operation::Render,
        Operation::Progress,
    ];

    pub fn required_capabilities(self) -> &'static [Capability] {
        use Capability::*;
        match self {
            Operation::DeployWorker => &[WorkerGet, WorkerCreate, IamPassRole],
            Operation::ListWorkers => &[WorkerList],
            Operation::DeleteWorker => &[WorkerList, WorkerDelete],
            Operation::DeploySite => &[
                StorageListBuckets,
                StorageCreateBucket,
                StorageListObjects,
                StorageGetObject,
                StoragePutObject,
                StorageDeleteObject,
            ],
            Operation::ListSites => &[StorageListBuckets, StorageListObjects],
            Operation::DeleteSite => &[
                StorageListBuckets,
                StorageListObjects,
                StorageDeleteObject,
            ],
            Operation::Render => &[
                WorkerGet,
                WorkerCreate,
                WorkerInvoke,
                StorageListBuckets,
                StorageGetObject,
                StoragePutObject,
                StorageListObjects,
                LogsRead,
            ],
            Operation::Progress => &[],
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Operation::DeployWorker => "deploy-worker",
            Operation::ListWorkers => "list-workers",
            Operation::DeleteWorker => "delete-worker",
            Operation::DeploySite => "deploy-site",
            Operation::ListSites => "list-sites",
            Operation::DeleteSite => "delete-site",
            Operation::Render => "render",
            Operation::Progress => "progress",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Operation::ALL
            .iter()
            .copied()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| format!("unknown operation {s:?}"))
    }
}

/// Answers whether credentials hold a capability. Must not mutate anything.
#[async_trait]
pub trait PolicySimulator: Send + Sync + 'static {
    async fn is_allowed(
        &self,
        credentials: &CredentialsConfig,
        capability: Capability,
    ) -> PermissionResult<bool>;
}

/// Evaluates the `granted` patterns from `[credentials]`.
///
/// A pattern is `*`, `service:*`, or an exact `service:Action`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticPolicySimulator;

impl StaticPolicySimulator {
    fn matches(pattern: &str, capability: Capability) -> bool {
        let pattern = pattern.trim();
        if pattern == "*" || pattern == capability.as_str() {
            return true;
        }
        match pattern.split_once(':') {
            Some((service, "*")) => service == capability.service(),
            _ => false,
        }
    }
}

#[async_trait]
impl PolicySimulator for StaticPolicySimulator {
    async fn is_allowed(
        &self,
        credentials: &CredentialsConfig,
        capability: Capability,
    ) -> PermissionResult<bool> {
        Ok(credentials
            .granted
            .iter()
            .any(|pattern| Self::matches(pattern, capability)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationResult {
    pub capability: Capability,
    pub allowed: bool,
}

pub struct PermissionValidator {
    simulator: Arc<dyn PolicySimulator>,
}

impl PermissionValidator {
    pub fn new(simulator: Arc<dyn PolicySimulator>) -> Self {
        Self { simulator }
    }

    /// One result per required capability, in the order given.
    pub async fn simulate(
        &self,
        credentials: &CredentialsConfig,
        required: &[Capability],
    ) -> PermissionResult<Vec<SimulationResult>> {
        let mut results = Vec::with_capacity(required.len());
        for &capability in required {
            let allowed = self.simulator.is_allowed(credentials, capability).await?;
            results.push(SimulationResult {
                capability,
                allowed,
            });
        }
        Ok(results)
    }

    /// Fail with `InsufficientPermissions` naming the first capability
    /// `operation` needs that the credentials lack.
    pub async fn preflight(
        &self,
        credentials: &CredentialsConfig,
        operation: Operation,
    ) -> PermissionResult<Vec<SimulationResult>> {
        let results = self
            .simulate(credentials, operation.required_capabilities())
            .await?;
        if let Some(missing) = results.iter().find(|r| !r.allowed) {
            warn!(%operation, capability = %missing.capability, "permission pre-flight failed");
            return Err(PermissionError::InsufficientPermissions {
                capability: missing.capability,
                operation,
            });
        }
        debug!(%operation, checked = results.len(), "permission pre-flight passed");
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds(granted: &[&str]) -> CredentialsConfig {
        CredentialsConfig {
            principal: Some("ci".to_string()),
            granted: granted.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn validator() -> PermissionValidator {
        PermissionValidator::new(Arc::new(StaticPolicySimulator))
    }

    #[test]
    fn capability_names_round_trip() {
        for &cap in Capability::ALL {
            assert_eq!(cap.as_str().parse::<Capability>().unwrap(), cap);
        }
        assert!("storage:Teleport".parse::<Capability>().is_err());
        assert_eq!(
            serde_json::to_string(&Capability::WorkerInvoke).unwrap(),
            "\"worker:Invoke\""
        );
    }

    #[test]
    fn operation_names_parse() {
        assert_eq!("deploy-site".parse::<Operation>().unwrap(), Operation::DeploySite);
        assert!("launch".parse::<Operation>().is_err());
    }

    #[test]
    fn pattern_matching() {
        assert!(StaticPolicySimulator::matches("*", Capability::LogsRead));
        assert!(StaticPolicySimulator::matches("storage:*", Capability::StoragePutObject));
        assert!(!StaticPolicySimulator::matches("storage:*", Capability::WorkerInvoke));
        assert!(StaticPolicySimulator::matches("worker:Invoke", Capability::WorkerInvoke));
        assert!(!StaticPolicySimulator::matches("worker:Invok", Capability::WorkerInvoke));
    }

    #[tokio::test]
    async fn simulate_reports_every_capability() {
        let results = validator()
            .simulate(
                &creds(&["storage:*"]),
                &[Capability::StorageGetObject, Capability::WorkerInvoke],
            )
            .await
            .unwrap();
        assert_eq!(
            results,
            vec![
                SimulationResult { capability: Capability::StorageGetObject, allowed: true },
                SimulationResult { capability: Capability::WorkerInvoke, allowed: false },
            ]
        );
    }

    #[tokio::test]
    async fn preflight_names_first_missing_capability() {
        let err = validator()
            .preflight(&creds(&["storage:*", "worker:Get"]), Operation::Render)
            .await
            .unwrap_err();
        match err {
            PermissionError::InsufficientPermissions { capability, operation } => {
                assert_eq!(capability, Capability::WorkerCreate);
                assert_eq!(operation, Operation::Render);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn wildcard_passes_everything() {
        for &op in Operation::ALL {
            validator().preflight(&creds(&["*"]), op).await.unwrap();
        }
    }

    #[tokio::test]
    async fn progress_needs_nothing() {
        validator().preflight(&creds(&[]), Operation::Progress).await.unwrap();
    }
}
