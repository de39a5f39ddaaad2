use std::path::Path;

use serde_json::{Value, json};
use tracing::info;

use rendergrid_core::config::GridConfig;
use rendergrid_core::{ErrorKind, naming};

use crate::context::load_config;
use crate::output::{CliError, CliResult};

pub fn init(
    config_path: &Path,
    region: Option<&str>,
    account_id: &str,
    renderer_version: &str,
    force: bool,
) -> CliResult<Value> {
    if config_path.exists() && !force {
        return Err(CliError::new(
            ErrorKind::InvalidConfig,
            format!("{} already exists; pass --force to overwrite", config_path.display()),
        ));
    }
    let config = GridConfig::scaffold(region.unwrap_or("us-east-1"), account_id, renderer_version);
    config.validate()?;
    let worker_name = config.worker_identity().name()?;

    std::fs::write(config_path, config.to_toml_string()?).map_err(|e| {
        CliError::new(
            ErrorKind::Internal,
            format!("failed to write {}: {e}", config_path.display()),
        )
    })?;
    info!(path = %config_path.display(), %worker_name, "config written");
    Ok(json!({
        "path": config_path.display().to_string(),
        "workerName": worker_name,
    }))
}

/// The derived name plus the normalized resources it encodes.
pub fn name(config_path: &Path, region: Option<&str>) -> CliResult<Value> {
    let config = load_config(config_path, region)?;
    let identity = config.worker_identity();
    Ok(json!({
        "name": identity.name()?,
        "region": identity.region,
        "memoryMb": naming::memory_mib(&identity.memory)?,
        "cpuMillis": naming::cpu_millis(&identity.cpu)?,
        "timeoutSecs": identity.timeout_secs,
    }))
}
