use std::path::Path;

use serde_json::{Value, json};

use rendergrid_core::ErrorKind;
use rendergrid_deploy::Operation;

use crate::context::Context;
use crate::output::{CliError, CliResult};

pub async fn deploy(
    config_path: &Path,
    region: Option<&str>,
    dir: &Path,
    name: Option<&str>,
) -> CliResult<Value> {
    let ctx = Context::load(config_path, region)?;
    ctx.preflight(Operation::DeploySite).await?;
    let deployment = ctx.sites().deploy_site(dir, name).await?;
    Ok(serde_json::to_value(deployment)?)
}

pub async fn list(config_path: &Path, region: Option<&str>) -> CliResult<Value> {
    let ctx = Context::load(config_path, region)?;
    ctx.preflight(Operation::ListSites).await?;
    let sites = ctx.sites().list_sites().await?;
    Ok(json!({ "region": ctx.region(), "sites": sites }))
}

pub async fn delete(config_path: &Path, region: Option<&str>, name: &str) -> CliResult<Value> {
    let ctx = Context::load(config_path, region)?;
    ctx.preflight(Operation::DeleteSite).await?;
    let deletion = ctx.sites().delete_site(name).await?;
    let failed = deletion.failures().count();
    let data = json!({
        "siteName": name,
        "deleted": deletion.deleted(),
        "freedBytes": deletion.freed_bytes,
        "outcomes": deletion.outcomes,
    });
    if failed > 0 {
        return Err(CliError::new(
            ErrorKind::Internal,
            format!("{failed} objects of site {name} could not be deleted"),
        )
        .with_data(data));
    }
    Ok(data)
}
