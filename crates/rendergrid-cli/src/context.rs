//! Wiring: config file → registry, platform, artifact store and services.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use rendergrid_core::config::GridConfig;
use rendergrid_deploy::{
    DeploymentManager, HttpInvoker, LocalPlatform, Operation, PermissionValidator,
    StaticPolicySimulator,
};
use rendergrid_orchestrator::{CommandMuxer, ConcatMuxer, Muxer, Orchestrator};
use rendergrid_report::{HttpTransport, WebhookReporter};
use rendergrid_state::StateStore;
use rendergrid_storage::{ArtifactStore, FsBlobStore, SiteManager};

use crate::output::CliResult;

/// Overrides the key used to sign `file://` URLs handed to workers.
const SIGNING_KEY_ENV: &str = "RENDERGRID_SIGNING_KEY";
const DEFAULT_INVOKE_URL: &str = "http://127.0.0.1:9000";

pub struct Context {
    pub config: GridConfig,
    pub state: StateStore,
    pub platform: Arc<LocalPlatform>,
    pub store: ArtifactStore,
    validator: PermissionValidator,
}

impl Context {
    /// Load `rendergrid.toml` and open everything under its data dir.
    ///
    /// A relative `data_dir` is resolved against the config file's directory.
    pub fn load(config_path: &Path, region: Option<&str>) -> CliResult<Self> {
        let config = load_config(config_path, region)?;
        let data_dir = data_dir(config_path, &config);
        debug!(data_dir = %data_dir.display(), region = %config.platform.region, "opening context");

        let state = StateStore::open(&data_dir.join("registry.redb"))?;
        let platform = Arc::new(LocalPlatform::new(
            state.clone(),
            config.platform.invoke_url.clone(),
            format!("file://{}/logs", data_dir.display()),
        ));
        let signing_key = std::env::var(SIGNING_KEY_ENV).unwrap_or_else(|_| {
            format!("{}:{}", config.platform.family, config.platform.account_id)
        });
        let store = ArtifactStore::for_region(
            Arc::new(FsBlobStore::new(data_dir.join("blobs"), signing_key)),
            &config.platform.family,
            &config.platform.account_id,
            &config.platform.region,
        );

        Ok(Self {
            config,
            state,
            platform,
            store,
            validator: PermissionValidator::new(Arc::new(StaticPolicySimulator)),
        })
    }

    pub fn region(&self) -> &str {
        &self.config.platform.region
    }

    pub fn validator(&self) -> &PermissionValidator {
        &self.validator
    }

    /// Fail unless the configured credentials may run `operation`.
    pub async fn preflight(&self, operation: Operation) -> CliResult<()> {
        self.validator
            .preflight(&self.config.credentials, operation)
            .await?;
        Ok(())
    }

    pub fn deployer(&self) -> DeploymentManager {
        DeploymentManager::new(self.platform.clone())
    }

    pub fn sites(&self) -> SiteManager {
        SiteManager::new(self.store.clone()).with_state(self.state.clone())
    }

    pub fn orchestrator(&self) -> Orchestrator {
        let muxer: Arc<dyn Muxer> = match &self.config.muxer {
            Some(muxer) => Arc::new(CommandMuxer::new(
                muxer.command.clone(),
                muxer.args.clone(),
                self.store.clone(),
            )),
            None => Arc::new(ConcatMuxer::new(self.store.clone())),
        };
        let invoke_url = self
            .config
            .platform
            .invoke_url
            .clone()
            .unwrap_or_else(|| DEFAULT_INVOKE_URL.to_string());

        let mut orchestrator =
            Orchestrator::new(Arc::new(HttpInvoker::new(invoke_url)), self.store.clone(), muxer)
                .with_state(self.state.clone())
                .with_platform(self.platform.clone());
        if let Some(webhook) = &self.config.webhook {
            orchestrator =
                orchestrator.with_reporter(WebhookReporter::new(webhook, Arc::new(HttpTransport)));
        }
        orchestrator
    }
}

/// Parse and validate the config, applying a `--region` override.
pub fn load_config(config_path: &Path, region: Option<&str>) -> CliResult<GridConfig> {
    let mut config = GridConfig::from_file(config_path)?;
    if let Some(region) = region {
        config = config.with_region(region);
        config.validate()?;
    }
    Ok(config)
}

fn data_dir(config_path: &Path, config: &GridConfig) -> PathBuf {
    let configured = PathBuf::from(config.platform.data_dir.as_deref().unwrap_or(".rendergrid"));
    if configured.is_absolute() {
        return configured;
    }
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.join(configured),
        _ => configured,
    }
}
