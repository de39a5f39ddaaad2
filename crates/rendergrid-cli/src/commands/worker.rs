use std::path::Path;

use serde_json::{Value, json};

use rendergrid_core::ErrorKind;
use rendergrid_deploy::Operation;

use crate::context::Context;
use crate::output::{CliError, CliResult};

pub async fn deploy(config_path: &Path, region: Option<&str>) -> CliResult<Value> {
    let ctx = Context::load(config_path, region)?;
    ctx.preflight(Operation::DeployWorker).await?;
    let ensured = ctx.deployer().ensure_worker(&ctx.config.worker_spec()).await?;
    Ok(serde_json::to_value(ensured)?)
}

pub async fn list(config_path: &Path, region: Option<&str>) -> CliResult<Value> {
    let ctx = Context::load(config_path, region)?;
    ctx.preflight(Operation::ListWorkers).await?;
    let workers = ctx.deployer().list_workers(ctx.region()).await?;
    Ok(json!({ "region": ctx.region(), "workers": workers }))
}

pub async fn delete(
    config_path: &Path,
    region: Option<&str>,
    name: Option<&str>,
    all: bool,
) -> CliResult<Value> {
    let ctx = Context::load(config_path, region)?;
    ctx.preflight(Operation::DeleteWorker).await?;
    let deployer = ctx.deployer();

    if !all {
        let Some(name) = name else {
            return Err(CliError::new(
                ErrorKind::InvalidConfig,
                "pass a worker name or --all",
            ));
        };
        deployer.delete_worker(ctx.region(), name).await?;
        return Ok(json!({ "deleted": [name] }));
    }

    let outcomes = deployer.delete_all_workers(ctx.region()).await?;
    let failed = outcomes.iter().filter(|o| o.error.is_some()).count();
    let data = json!({ "region": ctx.region(), "outcomes": outcomes });
    if failed > 0 {
        return Err(CliError::new(
            ErrorKind::Internal,
            format!("{failed} of {} workers could not be deleted", outcomes.len()),
        )
        .with_data(data));
    }
    Ok(data)
}
