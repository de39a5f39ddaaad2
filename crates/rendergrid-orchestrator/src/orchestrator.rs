//! The render run loop.
//!
//! One [`Orchestrator::run`] call owns its chunk table for the lifetime of
//! the job. Chunk attempts run on the [`DispatchPool`]; the loop only
//! reacts to four events: an attempt finishing, a backoff elapsing,
//! cancellation and the job deadline.

use std::future::Future;
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info, warn};

use rendergrid_core::config::GridConfig;
use rendergrid_core::naming::{chunk_output_key, final_output_key};
use rendergrid_core::{ChunkError, ChunkRecord, ErrorKind, FailureSummary, JobPhase, JobProgress};
use rendergrid_deploy::{DeploymentManager, InvocationRequest, WorkerInvoker, WorkerPlatform};
use rendergrid_report::{DeliveryReport, WebhookPayload, WebhookReporter};
use rendergrid_state::{RenderRecord, StateStore};
use rendergrid_storage::{ArtifactStore, SiteManager};

use crate::error::{RenderError, RenderResult};
use crate::job::{RenderJob, generate_job_id};
use crate::muxer::Muxer;
use crate::plan::plan_chunks;
use crate::pool::DispatchPool;
use crate::table::{ChunkTable, FailOutcome};

/// Final state of a render.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderOutcome {
    pub job_id: String,
    /// `Completed` or `Failed`.
    pub phase: JobPhase,
    pub output_ref: Option<String>,
    pub progress: JobProgress,
    pub chunks: Vec<ChunkRecord>,
    pub failure: Option<FailureSummary>,
    /// Background webhook delivery, when a reporter is attached.
    #[serde(skip)]
    pub webhook: Option<JoinHandle<DeliveryReport>>,
}

impl RenderOutcome {
    pub fn is_success(&self) -> bool {
        self.phase == JobPhase::Completed
    }
}

/// Why dispatch stopped before every chunk was done.
#[derive(Debug)]
enum Halt {
    Chunk(u32),
    Cancelled,
    Deadline,
    Internal(String),
}

struct Attempt {
    index: u32,
    attempt: u32,
    result: Result<String, ChunkError>,
}

pub struct Orchestrator {
    invoker: Arc<dyn WorkerInvoker>,
    store: ArtifactStore,
    muxer: Arc<dyn Muxer>,
    state: Option<StateStore>,
    reporter: Option<WebhookReporter>,
    platform: Option<Arc<dyn WorkerPlatform>>,
}

impl Orchestrator {
    pub fn new(invoker: Arc<dyn WorkerInvoker>, store: ArtifactStore, muxer: Arc<dyn Muxer>) -> Self {
        Self {
            invoker,
            store,
            muxer,
            state: None,
            reporter: None,
            platform: None,
        }
    }

    /// Persist a [`RenderRecord`] on every chunk table change.
    pub fn with_state(mut self, state: StateStore) -> Self {
        self.state = Some(state);
        self
    }

    /// Fire a signed webhook when a job reaches a terminal state.
    pub fn with_reporter(mut self, reporter: WebhookReporter) -> Self {
        self.reporter = Some(reporter);
        self
    }

    /// Attach worker log links to chunk errors.
    pub fn with_platform(mut self, platform: Arc<dyn WorkerPlatform>) -> Self {
        self.platform = Some(platform);
        self
    }

    /// Resolve everything a render of `site_name` needs: the worker
    /// (provisioned if missing) and a fresh serve URL for the site.
    pub async fn prepare(
        &self,
        config: &GridConfig,
        deployer: &DeploymentManager,
        sites: &SiteManager,
        site_name: &str,
        duration_ms: u64,
        job_id: Option<&str>,
    ) -> RenderResult<RenderJob> {
        let job_id = job_id.map_or_else(generate_job_id, str::to_string);
        let site_ref = sites.serve_url(site_name).await?;
        let ensured = deployer.ensure_worker(&config.worker_spec()).await?;
        let job = RenderJob::from_config(
            config,
            &job_id,
            site_name,
            &site_ref,
            ensured.worker,
            duration_ms,
        )?;
        Ok(job)
    }

    /// Last persisted snapshot of a job.
    pub fn progress(&self, job_id: &str) -> RenderResult<RenderRecord> {
        let Some(state) = &self.state else {
            return Err(RenderError::JobNotFound(job_id.to_string()));
        };
        state
            .get_render(job_id)?
            .ok_or_else(|| RenderError::JobNotFound(job_id.to_string()))
    }

    /// Render `job` to completion, failure or cancellation.
    ///
    /// Never returns an error: every way a started job can end is
    /// described by the outcome.
    pub async fn run(&self, job: RenderJob, mut cancel: watch::Receiver<bool>) -> RenderOutcome {
        let mut journal = Journal::new(self.state.clone(), &job);

        let plan = plan_chunks(job.duration_ms, job.chunk_duration_ms, job.ceiling);
        let mut table = ChunkTable::new(&plan.ranges, job.retry);
        journal.record(JobPhase::Splitting, &table);
        info!(
            job_id = %job.job_id,
            worker = %job.worker.name,
            chunks = plan.len(),
            chunk_ms = plan.chunk_duration_ms,
            "render planned"
        );

        if table.is_empty() {
            return self.finish(&job, journal, &table, Ok(None));
        }

        let result = match self.dispatch(&job, &mut table, &mut journal, &mut cancel).await {
            Some(halt) => Err(failure_for(&halt, &table)),
            None => self.stitch(&job, &table, &mut journal).await,
        };
        self.finish(&job, journal, &table, result)
    }

    // ── Dispatch ──────────────────────────────────────────────────

    async fn dispatch(
        &self,
        job: &RenderJob,
        table: &mut ChunkTable,
        journal: &mut Journal,
        cancel: &mut watch::Receiver<bool>,
    ) -> Option<Halt> {
        let mut pool: DispatchPool<Attempt> = DispatchPool::new(job.ceiling, job.parallelism);
        let deadline = job
            .job_timeout
            .map(|t| tokio::time::Instant::now() + t);
        let mut halt = if *cancel.borrow() {
            Some(Halt::Cancelled)
        } else {
            None
        };
        let mut watching_cancel = true;
        let mut phase = JobPhase::Dispatching;
        debug!(job_id = %job.job_id, pool = pool.size(), "dispatching");

        loop {
            if halt.is_none() {
                table.requeue_due(Instant::now());
                while pool.has_capacity() {
                    let Some(index) = table.next_pending() else {
                        break;
                    };
                    match table.start(index) {
                        Ok(attempt) => {
                            let task = self.attempt(job, &table.chunks()[index as usize], attempt);
                            pool.spawn(task).await;
                        }
                        Err(e) => {
                            halt = Some(Halt::Internal(e.to_string()));
                            break;
                        }
                    }
                }
                if phase == JobPhase::Dispatching && table.all_dispatched() {
                    phase = JobPhase::Collecting;
                }
            }
            journal.record(phase, table);

            // Nothing running and nothing left to wait for.
            if pool.is_empty() && (halt.is_some() || table.next_wake().is_none()) {
                break;
            }

            let wake = table
                .next_wake()
                .filter(|_| halt.is_none())
                .map(tokio::time::Instant::from_std);
            tokio::select! {
                Some(joined) = pool.join_next(), if !pool.is_empty() => {
                    self.settle(job, table, joined, &mut halt);
                }
                _ = sleep_until(wake), if wake.is_some() => {}
                changed = cancel.changed(), if halt.is_none() && watching_cancel => {
                    match changed {
                        Ok(()) if *cancel.borrow() => {
                            warn!(job_id = %job.job_id, in_flight = pool.in_flight(), "render cancelled, draining");
                            halt = Some(Halt::Cancelled);
                        }
                        Ok(()) => {}
                        Err(_) => watching_cancel = false,
                    }
                }
                _ = sleep_until(deadline), if halt.is_none() && deadline.is_some() => {
                    warn!(job_id = %job.job_id, in_flight = pool.in_flight(), "render deadline reached, draining");
                    halt = Some(Halt::Deadline);
                }
            }
        }
        halt
    }

    /// Build one attempt as a self-contained task.
    fn attempt(
        &self,
        job: &RenderJob,
        chunk: &ChunkRecord,
        attempt: u32,
    ) -> impl Future<Output = Attempt> + Send + 'static {
        let invoker = Arc::clone(&self.invoker);
        let store = self.store.clone();
        let worker = job.worker.clone();
        let timeout = job.chunk_timeout;
        let index = chunk.index;
        let request = InvocationRequest {
            job_id: job.job_id.clone(),
            chunk_index: index,
            time_range: chunk.range,
            site_ref: job.site_ref.clone(),
            worker_config_ref: worker.name.clone(),
            output_key: chunk_output_key(&job.job_id, index, chunk.range, &job.output_extension),
            attempt,
        };
        debug!(job_id = %job.job_id, chunk = index, attempt, "chunk dispatched");

        async move {
            let answered = tokio::time::timeout(timeout, invoker.invoke(&worker, &request)).await;
            let result = match answered {
                Ok(Ok(response)) if response.success => {
                    Ok(response.output_ref.unwrap_or(request.output_key))
                }
                Ok(Ok(response)) => Err(chunk_error(
                    ErrorKind::InvocationFailed,
                    response
                        .error_detail
                        .unwrap_or_else(|| "worker reported failure".to_string()),
                )),
                Ok(Err(e)) => Err(chunk_error(ErrorKind::InvocationFailed, e.to_string())),
                // The worker may have finished after we stopped waiting.
                Err(_) => match store.object_exists(&request.output_key).await {
                    Ok(true) => {
                        info!(chunk = index, attempt, "output present after timeout");
                        Ok(request.output_key)
                    }
                    Ok(false) => Err(chunk_error(
                        ErrorKind::InvocationTimeout,
                        format!("no response within {}s", timeout.as_secs()),
                    )),
                    Err(e) => Err(chunk_error(
                        ErrorKind::InvocationTimeout,
                        format!(
                            "no response within {}s; output check failed: {e}",
                            timeout.as_secs()
                        ),
                    )),
                },
            };
            Attempt {
                index,
                attempt,
                result,
            }
        }
    }

    fn settle(
        &self,
        job: &RenderJob,
        table: &mut ChunkTable,
        joined: Result<Attempt, JoinError>,
        halt: &mut Option<Halt>,
    ) {
        let attempt = match joined {
            Ok(attempt) => attempt,
            Err(e) => {
                error!(job_id = %job.job_id, error = %e, "chunk task aborted");
                halt.get_or_insert(Halt::Internal(format!("chunk task aborted: {e}")));
                return;
            }
        };
        let Attempt {
            index,
            attempt,
            result,
        } = attempt;

        let settled = match result {
            Ok(output_ref) => {
                info!(job_id = %job.job_id, chunk = index, attempt, %output_ref, "chunk done");
                table.complete(index, output_ref).map(|()| None)
            }
            Err(mut chunk_error) => {
                chunk_error.logs_url = self.logs_url(job);
                let message = chunk_error.message.clone();
                let kind = chunk_error.kind;
                table.fail(index, chunk_error, Instant::now()).map(|outcome| {
                    match outcome {
                        FailOutcome::Retry { after } => {
                            warn!(job_id = %job.job_id, chunk = index, attempt, %kind, ?after, error = %message, "chunk failed, will retry");
                            None
                        }
                        FailOutcome::Terminal => {
                            error!(job_id = %job.job_id, chunk = index, attempt, %kind, error = %message, "chunk failed permanently");
                            Some(Halt::Chunk(index))
                        }
                    }
                })
            }
        };

        match settled {
            Ok(Some(fatal)) => {
                halt.get_or_insert(fatal);
            }
            Ok(None) => {}
            Err(e) => {
                error!(job_id = %job.job_id, chunk = index, error = %e, "chunk table rejected update");
                halt.get_or_insert(Halt::Internal(e.to_string()));
            }
        }
    }

    fn logs_url(&self, job: &RenderJob) -> Option<String> {
        self.platform
            .as_ref()
            .map(|p| p.logs_url(&job.worker.region, &job.worker.name))
    }

    // ── Stitch and finish ─────────────────────────────────────────

    async fn stitch(
        &self,
        job: &RenderJob,
        table: &ChunkTable,
        journal: &mut Journal,
    ) -> Result<Option<String>, FailureSummary> {
        journal.record(JobPhase::Stitching, table);
        let Some(outputs) = table.ordered_outputs() else {
            return Err(FailureSummary {
                kind: ErrorKind::Internal,
                message: "chunk outputs missing after completion".to_string(),
                chunk: None,
                unresolved_chunks: table.unresolved(),
            });
        };
        if outputs.len() == 1 {
            return Ok(outputs.into_iter().next());
        }

        let output_key = final_output_key(&job.job_id, &job.output_extension);
        match self.muxer.stitch(&job.job_id, &outputs, &output_key).await {
            Ok(output_ref) => Ok(Some(output_ref)),
            Err(e) => {
                error!(job_id = %job.job_id, error = %e, "stitch failed");
                Err(FailureSummary {
                    kind: ErrorKind::StitchFailed,
                    message: e.to_string(),
                    chunk: None,
                    unresolved_chunks: Vec::new(),
                })
            }
        }
    }

    fn finish(
        &self,
        job: &RenderJob,
        mut journal: Journal,
        table: &ChunkTable,
        result: Result<Option<String>, FailureSummary>,
    ) -> RenderOutcome {
        let (phase, output_ref, failure) = match result {
            Ok(output_ref) => {
                info!(job_id = %job.job_id, chunks = table.len(), output = ?output_ref, "render completed");
                (JobPhase::Completed, output_ref, None)
            }
            Err(failure) => {
                error!(job_id = %job.job_id, %failure, "render failed");
                (JobPhase::Failed, None, Some(failure))
            }
        };
        journal.snapshot.output_ref = output_ref.clone();
        journal.snapshot.failure = failure.clone();
        journal.record(phase, table);

        let webhook = self.reporter.as_ref().map(|reporter| {
            let payload = match &failure {
                Some(failure) => WebhookPayload::failed(&job.job_id, failure),
                None => WebhookPayload::completed(&job.job_id, output_ref.clone()),
            };
            reporter.dispatch(payload)
        });

        RenderOutcome {
            job_id: job.job_id.clone(),
            phase,
            output_ref,
            progress: table.progress(),
            chunks: table.chunks().to_vec(),
            failure,
            webhook,
        }
    }
}

/// Progress snapshots written to the registry.
struct Journal {
    state: Option<StateStore>,
    snapshot: RenderRecord,
}

impl Journal {
    fn new(state: Option<StateStore>, job: &RenderJob) -> Self {
        let now = epoch_secs();
        Self {
            state,
            snapshot: RenderRecord {
                job_id: job.job_id.clone(),
                region: job.worker.region.clone(),
                site_name: job.site_name.clone(),
                worker_name: job.worker.name.clone(),
                phase: JobPhase::Splitting,
                progress: JobProgress::default(),
                output_ref: None,
                failure: None,
                started_at: now,
                updated_at: now,
            },
        }
    }

    fn record(&mut self, phase: JobPhase, table: &ChunkTable) {
        self.snapshot.phase = phase;
        self.snapshot.progress = table.progress();
        self.snapshot.updated_at = epoch_secs();
        if let Some(state) = &self.state {
            // A lost snapshot only makes `progress` stale.
            if let Err(e) = state.put_render(&self.snapshot) {
                warn!(job_id = %self.snapshot.job_id, error = %e, "failed to persist render progress");
            }
        }
    }
}

fn failure_for(halt: &Halt, table: &ChunkTable) -> FailureSummary {
    let unresolved_chunks = table.unresolved();
    match halt {
        Halt::Chunk(index) => {
            let error = table.get(*index).and_then(|c| c.error.as_ref());
            FailureSummary {
                kind: error.map_or(ErrorKind::InvocationFailed, |e| e.kind),
                message: error.map_or_else(|| "chunk failed".to_string(), |e| e.message.clone()),
                chunk: Some(*index),
                unresolved_chunks,
            }
        }
        Halt::Cancelled => FailureSummary {
            kind: ErrorKind::Cancelled,
            message: "render cancelled".to_string(),
            chunk: None,
            unresolved_chunks,
        },
        Halt::Deadline => FailureSummary {
            kind: ErrorKind::DeadlineExceeded,
            message: "render deadline exceeded".to_string(),
            chunk: None,
            unresolved_chunks,
        },
        Halt::Internal(message) => FailureSummary {
            kind: ErrorKind::Internal,
            message: message.clone(),
            chunk: None,
            unresolved_chunks,
        },
    }
}

fn chunk_error(kind: ErrorKind, message: String) -> ChunkError {
    ChunkError {
        kind,
        message,
        logs_url: None,
    }
}

async fn sleep_until(at: Option<tokio::time::Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
