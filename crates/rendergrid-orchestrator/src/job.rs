//! Render job parameters.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rendergrid_core::config::GridConfig;
use rendergrid_core::{ConfigError, ConfigResult, RetryPolicy};
use rendergrid_state::DeployedWorker;

use crate::plan::DEFAULT_CONCURRENCY_CEILING;

/// Everything [`Orchestrator::run`](crate::Orchestrator::run) needs for one job.
#[derive(Debug, Clone)]
pub struct RenderJob {
    pub job_id: String,
    pub site_name: String,
    /// URL the worker fetches the bundle from.
    pub site_ref: String,
    pub worker: DeployedWorker,
    pub duration_ms: u64,
    pub chunk_duration_ms: u64,
    pub parallelism: Option<u32>,
    /// Upper bound on chunk count and on concurrent invocations.
    pub ceiling: u32,
    pub retry: RetryPolicy,
    pub chunk_timeout: Duration,
    pub job_timeout: Option<Duration>,
    pub output_extension: String,
}

impl RenderJob {
    /// Build a job from the `[render]` and `[platform]` sections.
    ///
    /// The chunk timeout falls back to the worker's own timeout, and a zero
    /// concurrency limit means the default ceiling.
    pub fn from_config(
        config: &GridConfig,
        job_id: &str,
        site_name: &str,
        site_ref: &str,
        worker: DeployedWorker,
        duration_ms: u64,
    ) -> ConfigResult<Self> {
        validate_job_id(job_id)?;
        let render = &config.render;
        if render.chunk_duration_ms == 0 {
            return Err(ConfigError::invalid(
                "render.chunk_duration_ms",
                "must be greater than zero",
            ));
        }
        if render.max_attempts == 0 {
            return Err(ConfigError::invalid("render.max_attempts", "must be at least 1"));
        }
        if render.chunk_timeout_secs == Some(0) {
            return Err(ConfigError::invalid(
                "render.chunk_timeout_secs",
                "must be greater than zero",
            ));
        }
        if render.job_timeout_secs == Some(0) {
            return Err(ConfigError::invalid(
                "render.job_timeout_secs",
                "must be greater than zero",
            ));
        }
        if render.chunk_timeout_secs.is_none() && worker.timeout_secs == 0 {
            return Err(ConfigError::invalid("worker.timeout_secs", "must be greater than zero"));
        }

        let ceiling = match config.platform.concurrency_limit {
            0 => DEFAULT_CONCURRENCY_CEILING,
            limit => limit,
        };
        let chunk_timeout = Duration::from_secs(
            render
                .chunk_timeout_secs
                .unwrap_or(u64::from(worker.timeout_secs)),
        );

        Ok(Self {
            job_id: job_id.to_string(),
            site_name: site_name.to_string(),
            site_ref: site_ref.to_string(),
            worker,
            duration_ms,
            chunk_duration_ms: render.chunk_duration_ms,
            parallelism: render.parallelism,
            ceiling,
            retry: RetryPolicy::for_chunks(render),
            chunk_timeout,
            job_timeout: render.job_timeout_secs.map(Duration::from_secs),
            output_extension: render.output_extension.clone(),
        })
    }
}

/// Fresh job id: `render-<epoch-ms hex><pid hex>`.
pub fn generate_job_id() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    format!("render-{millis:x}{:x}", std::process::id())
}

/// Job ids end up in object keys, so they are restricted to
/// `[a-z0-9-]`, 1–64 characters.
pub fn validate_job_id(job_id: &str) -> ConfigResult<()> {
    if job_id.is_empty() || job_id.len() > 64 {
        return Err(ConfigError::invalid("job_id", "must be 1-64 characters"));
    }
    if !job_id
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(ConfigError::invalid(
            "job_id",
            format!("{job_id:?} may only contain a-z, 0-9 and '-'"),
        ));
    }
    Ok(())
}
