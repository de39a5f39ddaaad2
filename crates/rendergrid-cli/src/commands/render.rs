use std::path::Path;

use serde_json::{Value, json};
use tokio::sync::watch;
use tracing::{info, warn};

use rendergrid_core::ErrorKind;
use rendergrid_deploy::Operation;

use crate::context::Context;
use crate::output::{CliError, CliResult};

/// Run a render in the foreground. Ctrl-C cancels it: no new chunks are
/// dispatched and the ones in flight are allowed to finish.
pub async fn render(
    config_path: &Path,
    region: Option<&str>,
    site: &str,
    duration_ms: u64,
    parallelism: Option<u32>,
    job_id: Option<&str>,
) -> CliResult<Value> {
    let mut ctx = Context::load(config_path, region)?;
    if parallelism == Some(0) {
        return Err(CliError::new(
            ErrorKind::InvalidConfig,
            "--parallelism must be at least 1",
        ));
    }
    if parallelism.is_some() {
        ctx.config.render.parallelism = parallelism;
    }
    ctx.preflight(Operation::Render).await?;

    let orchestrator = ctx.orchestrator();
    let job = orchestrator
        .prepare(
            &ctx.config,
            &ctx.deployer(),
            &ctx.sites(),
            site,
            duration_ms,
            job_id,
        )
        .await?;
    info!(job_id = %job.job_id, site, duration_ms, "render starting");

    let (cancel_tx, cancel_rx) = watch::channel(false);
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling render");
            let _ = cancel_tx.send(true);
        }
    });
    let mut outcome = orchestrator.run(job, cancel_rx).await;
    interrupt.abort();

    // Delivery is bounded by the reporter's own retries and timeouts.
    let webhook = match outcome.webhook.take() {
        Some(handle) => handle.await.ok(),
        None => None,
    };
    let mut data = serde_json::to_value(&outcome)?;
    if let Some(fields) = data.as_object_mut() {
        fields.insert("webhook".to_string(), serde_json::to_value(&webhook)?);
    }

    match outcome.failure {
        Some(failure) => Err(CliError::new(failure.kind, failure.to_string()).with_data(data)),
        None => Ok(data),
    }
}

pub async fn progress(config_path: &Path, region: Option<&str>, job_id: &str) -> CliResult<Value> {
    let ctx = Context::load(config_path, region)?;
    ctx.preflight(Operation::Progress).await?;
    let record = ctx.orchestrator().progress(job_id)?;
    Ok(json!({ "render": record }))
}
