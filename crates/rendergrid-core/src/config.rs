//! rendergrid.toml configuration parser.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::naming::{self, WorkerIdentity};
use crate::types::{NetworkConfig, WorkerSpec};

/// Per-account ceiling on concurrent worker invocations when none is configured.
pub const DEFAULT_CONCURRENCY_LIMIT: u32 = 1000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridConfig {
    pub platform: PlatformConfig,
    pub worker: WorkerConfig,
    #[serde(default)]
    pub render: RenderConfig,
    pub webhook: Option<WebhookConfig>,
    #[serde(default)]
    pub credentials: CredentialsConfig,
    pub muxer: Option<MuxerConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConfig {
    /// Prefix for worker and bucket names.
    #[serde(default = "default_family")]
    pub family: String,
    pub region: String,
    pub account_id: String,
    /// Local directory for the registry database and filesystem buckets.
    pub data_dir: Option<String>,
    /// HTTP endpoint that fronts worker invocations.
    pub invoke_url: Option<String>,
    #[serde(default = "default_concurrency_limit")]
    pub concurrency_limit: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub version: String,
    pub memory: String,
    pub cpu: String,
    pub timeout_secs: u32,
    #[serde(default = "default_disk_mb")]
    pub disk_mb: u32,
    #[serde(default)]
    pub enhanced_monitoring: bool,
    pub execution_role: Option<String>,
    pub network: Option<NetworkConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub chunk_duration_ms: u64,
    /// Requested parallelism; capped by the platform concurrency limit.
    pub parallelism: Option<u32>,
    pub max_attempts: u32,
    pub retry_base_ms: u64,
    pub retry_max_ms: u64,
    /// Per-invocation deadline. Defaults to the worker timeout.
    pub chunk_timeout_secs: Option<u64>,
    /// Deadline for the whole render, if any.
    pub job_timeout_secs: Option<u64>,
    pub output_extension: String,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            chunk_duration_ms: 20_000,
            parallelism: None,
            max_attempts: 3,
            retry_base_ms: 500,
            retry_max_ms: 8_000,
            chunk_timeout_secs: None,
            job_timeout_secs: None,
            output_extension: "mp4".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub url: String,
    pub secret: Option<String>,
    #[serde(default = "default_webhook_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_webhook_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CredentialsConfig {
    pub principal: Option<String>,
    /// Capability patterns granted to the principal (`*`, `storage:*`, `worker:Invoke`).
    #[serde(default)]
    pub granted: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MuxerConfig {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
}

/// Workers and webhook receivers are reached over plain HTTP/1; there is
/// no TLS client, so `https://` endpoints must sit behind a local proxy.
fn require_plain_http(field: &str, url: &str) -> ConfigResult<()> {
    match url.strip_prefix("http://") {
        Some(rest) if !rest.is_empty() => Ok(()),
        _ => Err(ConfigError::invalid(
            field,
            format!("{url:?} must be an http:// URL (TLS endpoints need a local proxy)"),
        )),
    }
}

fn default_family() -> String {
    "rendergrid".to_string()
}

fn default_concurrency_limit() -> u32 {
    DEFAULT_CONCURRENCY_LIMIT
}

fn default_disk_mb() -> u32 {
    2048
}

fn default_webhook_attempts() -> u32 {
    3
}

fn default_webhook_timeout_ms() -> u64 {
    5_000
}

impl GridConfig {
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let config: GridConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> ConfigResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check everything that can be checked without talking to a platform.
    pub fn validate(&self) -> ConfigResult<()> {
        naming::derive_name(&self.worker_identity())?;
        if self.platform.account_id.trim().is_empty() {
            return Err(ConfigError::invalid("platform.account_id", "must not be empty"));
        }
        if self.platform.concurrency_limit == 0 {
            return Err(ConfigError::invalid("platform.concurrency_limit", "must be at least 1"));
        }
        if self.render.chunk_duration_ms == 0 {
            return Err(ConfigError::invalid("render.chunk_duration_ms", "must be positive"));
        }
        if self.render.max_attempts == 0 {
            return Err(ConfigError::invalid("render.max_attempts", "must be at least 1"));
        }
        if self.render.parallelism == Some(0) {
            return Err(ConfigError::invalid("render.parallelism", "must be at least 1"));
        }
        if self.render.output_extension.is_empty()
            || !self.render.output_extension.chars().all(|c| c.is_ascii_alphanumeric())
        {
            return Err(ConfigError::invalid(
                "render.output_extension",
                "must be a non-empty alphanumeric extension",
            ));
        }
        if self.render.chunk_timeout_secs == Some(0) {
            return Err(ConfigError::invalid("render.chunk_timeout_secs", "must be positive"));
        }
        if self.render.job_timeout_secs == Some(0) {
            return Err(ConfigError::invalid("render.job_timeout_secs", "must be positive"));
        }
        if let Some(url) = &self.platform.invoke_url {
            require_plain_http("platform.invoke_url", url)?;
        }
        if let Some(webhook) = &self.webhook {
            require_plain_http("webhook.url", &webhook.url)?;
            if webhook.timeout_ms == 0 {
                return Err(ConfigError::invalid("webhook.timeout_ms", "must be positive"));
            }
        }
        Ok(())
    }

    /// The identity the worker name is derived from.
    pub fn worker_identity(&self) -> WorkerIdentity {
        WorkerIdentity {
            family: self.platform.family.clone(),
            version: self.worker.version.clone(),
            memory: self.worker.memory.clone(),
            cpu: self.worker.cpu.clone(),
            timeout_secs: self.worker.timeout_secs,
            region: self.platform.region.clone(),
        }
    }

    /// Full provisioning spec for the configured worker.
    pub fn worker_spec(&self) -> WorkerSpec {
        WorkerSpec {
            identity: self.worker_identity(),
            disk_mb: self.worker.disk_mb,
            enhanced_monitoring: self.worker.enhanced_monitoring,
            execution_role: self.worker.execution_role.clone(),
            network: self.worker.network.clone(),
        }
    }

    /// Override the region everywhere it appears.
    pub fn with_region(mut self, region: &str) -> Self {
        self.platform.region = region.to_string();
        self
    }

    /// Scaffold a minimal rendergrid.toml.
    pub fn scaffold(region: &str, account_id: &str, version: &str) -> Self {
        GridConfig {
            platform: PlatformConfig {
                family: default_family(),
                region: region.to_string(),
                account_id: account_id.to_string(),
                data_dir: Some(".rendergrid".to_string()),
                invoke_url: Some("http://127.0.0.1:9000".to_string()),
                concurrency_limit: DEFAULT_CONCURRENCY_LIMIT,
            },
            worker: WorkerConfig {
                version: version.to_string(),
                memory: "2Gi".to_string(),
                cpu: "1".to_string(),
                timeout_secs: 300,
                disk_mb: default_disk_mb(),
                enhanced_monitoring: false,
                execution_role: None,
                network: None,
            },
            render: RenderConfig::default(),
            webhook: None,
            credentials: CredentialsConfig {
                principal: None,
                granted: vec!["*".to_string()],
            },
            muxer: None,
        }
    }
}
