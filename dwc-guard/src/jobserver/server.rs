//! The job lifecycle manager.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::{debug, error, info, instrument, warn};

use crate::error::{Result, ValidatorError};
use crate::logging::{truncate_field, DEFAULT_MAX_FIELD_LENGTH};
use crate::model::{
    DataOutputType, Job, JobDataOutput, JobId, JobIdSeed, JobStatus, JobStatusResponse,
};

use super::registry::{JobRegistry, WorkerSlot};
use super::storage::JobStorage;

/// Default bound on registry lookups made by `status` and `kill`.
pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);

/// Context handed to an executor for one job.
#[derive(Debug, Clone)]
pub struct JobContext {
    job_id: JobId,
    cancelled: Arc<AtomicBool>,
}

impl JobContext {
    pub fn new(job_id: JobId, cancelled: Arc<AtomicBool>) -> Self {
        Self { job_id, cancelled }
    }

    /// A context that is never cancelled, for running an executor directly.
    pub fn detached(job_id: JobId) -> Self {
        Self::new(job_id, Arc::new(AtomicBool::new(false)))
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    /// True once the job was killed or the server stopped.
    /// Long-running work should check it between units of work.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// The flag behind [`is_cancelled`](Self::is_cancelled), for blocking
    /// threads.
    pub fn cancellation_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    /// Returns an error if the job was cancelled.
    pub fn ensure_active(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(ValidatorError::Internal(format!(
                "job {} was cancelled",
                self.job_id
            )))
        } else {
            Ok(())
        }
    }
}

/// What a successful execution produces.
#[derive(Debug, Clone)]
pub struct JobOutcome<R> {
    pub result: R,
    pub data_outputs: Vec<(DataOutputType, serde_json::Value)>,
}

impl<R> JobOutcome<R> {
    pub fn new(result: R) -> Self {
        Self {
            result,
            data_outputs: Vec::new(),
        }
    }

    pub fn with_data_output(
        mut self,
        output_type: DataOutputType,
        content: serde_json::Value,
    ) -> Self {
        self.data_outputs.push((output_type, content));
        self
    }
}

/// The work run for each submitted job.
#[async_trait]
pub trait JobExecutor: Send + Sync + 'static {
    type Payload: Send + 'static;
    type Output: Serialize + Clone + Send + Sync + 'static;

    async fn execute(
        &self,
        ctx: JobContext,
        payload: Self::Payload,
    ) -> Result<JobOutcome<Self::Output>>;
}

/// Settings of a [`JobServer`].
#[derive(Debug, Clone)]
pub struct JobServerConfig {
    /// Jobs executing at the same time. Further jobs wait for a permit.
    pub max_concurrent_jobs: usize,
    pub lookup_timeout: Duration,
}

impl Default for JobServerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: num_cpus::get().max(1),
            lookup_timeout: DEFAULT_LOOKUP_TIMEOUT,
        }
    }
}

impl JobServerConfig {
    pub fn with_max_concurrent_jobs(mut self, max_concurrent_jobs: usize) -> Self {
        self.max_concurrent_jobs = max_concurrent_jobs.max(1);
        self
    }

    pub fn with_lookup_timeout(mut self, lookup_timeout: Duration) -> Self {
        self.lookup_timeout = lookup_timeout;
        self
    }
}

/// Accepts jobs, runs them on the tokio runtime and answers status and kill
/// queries.
///
/// Status is answered from [`JobStorage`] first, then from the registry of
/// live workers. A job's terminal status is written exactly once, by whichever
/// of completion, [`kill`](Self::kill) or [`stop`](Self::stop) claims the
/// worker first.
///
/// # Example
///
/// ```rust,ignore
/// let storage = Arc::new(InMemoryJobStorage::new());
/// let server = JobServer::new(pipeline, storage, JobServerConfig::default());
/// let accepted = server.submit(data_file).await;
/// let status = server.status(accepted.job_id).await;
/// ```
pub struct JobServer<E: JobExecutor> {
    executor: Arc<E>,
    storage: Arc<dyn JobStorage<E::Output>>,
    registry: Arc<JobRegistry>,
    seed: JobIdSeed,
    permits: Arc<Semaphore>,
    config: JobServerConfig,
    stopped: AtomicBool,
}

impl<E: JobExecutor> JobServer<E> {
    pub fn new(
        executor: E,
        storage: Arc<dyn JobStorage<E::Output>>,
        config: JobServerConfig,
    ) -> Self {
        Self::with_seed(executor, storage, config, JobIdSeed::from_clock())
    }

    pub fn with_seed(
        executor: E,
        storage: Arc<dyn JobStorage<E::Output>>,
        config: JobServerConfig,
        seed: JobIdSeed,
    ) -> Self {
        info!(
            max_concurrent_jobs = config.max_concurrent_jobs,
            lookup_timeout_ms = config.lookup_timeout.as_millis() as u64,
            "Starting job server"
        );
        Self {
            executor: Arc::new(executor),
            storage,
            registry: Arc::new(JobRegistry::new()),
            seed,
            permits: Arc::new(Semaphore::new(config.max_concurrent_jobs.max(1))),
            config,
            stopped: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &JobServerConfig {
        &self.config
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    /// Accepts a job and dispatches it. Returns without waiting for any
    /// validation work.
    #[instrument(skip(self, payload))]
    pub async fn submit(&self, payload: E::Payload) -> JobStatusResponse<E::Output> {
        let job = Job::new(self.seed.next_id(), payload);
        let job_id = job.id;

        if self.stopped.load(Ordering::Acquire) {
            let response = JobStatusResponse::failed(job_id, "job server is stopped");
            self.persist(response.clone()).await;
            return response;
        }

        let executor = Arc::clone(&self.executor);
        let storage = Arc::clone(&self.storage);
        let registry = Arc::clone(&self.registry);
        let permits = Arc::clone(&self.permits);

        let registered = self
            .registry
            .register(job_id, move |slot| {
                tokio::spawn(run_worker(executor, storage, registry, permits, slot, job))
            })
            .await;
        if registered.is_none() {
            // Ids come from an atomic counter, so this only happens with a
            // badly seeded server.
            error!(job_id, "A worker is already registered for this job id");
            return JobStatusResponse::failed(job_id, "a job with the same id is already running");
        }

        info!(
            job_id,
            running_jobs = self.registry.len().await,
            "Job accepted"
        );
        JobStatusResponse::accepted(job_id)
    }

    /// Current status of a job. Never returns [`JobStatus::Accepted`].
    #[instrument(skip(self))]
    pub async fn status(&self, job_id: JobId) -> JobStatusResponse<E::Output> {
        if let Some(stored) = self.stored(job_id).await {
            return stored;
        }

        match timeout(self.config.lookup_timeout, self.registry.contains(job_id)).await {
            Ok(true) => JobStatusResponse::running(job_id),
            Ok(false) => {
                // A worker persists before it deregisters; look again in case
                // it finished between the two reads.
                self.stored(job_id)
                    .await
                    .unwrap_or_else(|| JobStatusResponse::not_found(job_id))
            }
            Err(_) => {
                warn!(job_id, "Worker lookup timed out");
                JobStatusResponse::not_found(job_id)
            }
        }
    }

    /// Forcefully terminates a live job.
    ///
    /// Returns `Killed` when a live worker was found and stopped, `NotFound`
    /// otherwise. Nothing is persisted in the latter case.
    #[instrument(skip(self))]
    pub async fn kill(&self, job_id: JobId) -> JobStatusResponse<E::Output> {
        let worker = match timeout(self.config.lookup_timeout, self.registry.get(job_id)).await {
            Ok(Some(worker)) => worker,
            Ok(None) => return JobStatusResponse::not_found(job_id),
            Err(_) => {
                warn!(job_id, "Worker lookup timed out");
                return JobStatusResponse::not_found(job_id);
            }
        };

        if !worker.slot.claim_terminal() {
            debug!(job_id, "Job is already completing");
            return JobStatusResponse::not_found(job_id);
        }
        worker.slot.cancel();
        worker.abort.abort();

        let response = JobStatusResponse::killed(job_id);
        self.persist(response.clone()).await;
        self.registry.remove(job_id).await;
        info!(
            job_id,
            running_ms = (chrono::Utc::now() - worker.slot.started_at()).num_milliseconds(),
            "Job killed"
        );
        response
    }

    /// Persists a failure reported by the caller, typically a job that could
    /// not be scheduled.
    #[instrument(skip(self, response), fields(job_id = response.job_id))]
    pub async fn push_failed_job_status(
        &self,
        response: JobStatusResponse<E::Output>,
    ) -> Result<()> {
        if response.status != JobStatus::Failed {
            return Err(ValidatorError::InvalidArgument(format!(
                "expected a FAILED status for job {}, got {}",
                response.job_id, response.status
            )));
        }
        self.storage.put(response).await
    }

    /// Side output published by a finished job.
    pub async fn data_output(
        &self,
        job_id: JobId,
        output_type: DataOutputType,
    ) -> Option<JobDataOutput> {
        match self.storage.get_data_output(job_id, output_type).await {
            Ok(output) => output,
            Err(e) => {
                warn!(
                    job_id,
                    output_type = output_type.as_str(),
                    error = %e,
                    "Failed to read data output"
                );
                None
            }
        }
    }

    /// Number of live workers.
    pub async fn running_jobs(&self) -> usize {
        self.registry.len().await
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Cancels every live worker and refuses further submissions. Cancelled
    /// jobs are persisted as `Failed`. Calling it again has no effect.
    #[instrument(skip(self))]
    pub async fn stop(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        self.permits.close();

        let workers = self.registry.workers().await;
        let mut cancelled = 0usize;
        for worker in workers {
            if !worker.slot.claim_terminal() {
                continue;
            }
            worker.slot.cancel();
            worker.abort.abort();
            let job_id = worker.slot.job_id();
            self.persist(JobStatusResponse::failed(
                job_id,
                "job server stopped before the job completed",
            ))
            .await;
            self.registry.remove(job_id).await;
            cancelled += 1;
        }
        info!(cancelled, "Job server stopped");
    }

    async fn stored(&self, job_id: JobId) -> Option<JobStatusResponse<E::Output>> {
        match self.storage.get(job_id).await {
            Ok(stored) => stored,
            Err(e) => {
                warn!(job_id, error = %e, "Failed to read job storage");
                None
            }
        }
    }

    async fn persist(&self, response: JobStatusResponse<E::Output>) {
        persist_status(self.storage.as_ref(), response).await;
    }
}

async fn persist_status<R: Send + Sync + 'static>(
    storage: &dyn JobStorage<R>,
    response: JobStatusResponse<R>,
) {
    let job_id = response.job_id;
    let status = response.status;
    if let Err(e) = storage.put(response).await {
        error!(job_id, %status, error = %e, "Failed to persist job status");
    }
}

async fn run_worker<E: JobExecutor>(
    executor: Arc<E>,
    storage: Arc<dyn JobStorage<E::Output>>,
    registry: Arc<JobRegistry>,
    permits: Arc<Semaphore>,
    slot: Arc<WorkerSlot>,
    job: Job<E::Payload>,
) {
    let job_id = job.id;

    let _permit = match permits.acquire_owned().await {
        Ok(permit) => permit,
        Err(_) => {
            if slot.claim_terminal() {
                persist_status(
                    storage.as_ref(),
                    JobStatusResponse::failed(job_id, "job could not be scheduled"),
                )
                .await;
                registry.remove(job_id).await;
            }
            return;
        }
    };
    if slot.is_claimed() {
        return;
    }

    debug!(
        job_id,
        queued_ms = (chrono::Utc::now() - job.submitted_at).num_milliseconds(),
        "Job started"
    );
    let ctx = JobContext::new(job_id, slot.cancellation_flag());
    let outcome = AssertUnwindSafe(executor.execute(ctx, job.payload))
        .catch_unwind()
        .await;

    if !slot.claim_terminal() {
        debug!(job_id, "Job was terminated before completing");
        return;
    }

    let response = match outcome {
        Ok(Ok(outcome)) => {
            for (output_type, content) in outcome.data_outputs {
                let output = JobDataOutput {
                    job_id,
                    output_type,
                    content,
                };
                if let Err(e) = storage.put_data_output(output).await {
                    warn!(
                        job_id,
                        output_type = output_type.as_str(),
                        error = %e,
                        "Failed to store data output"
                    );
                }
            }
            info!(job_id, "Job finished");
            JobStatusResponse::finished(job_id, outcome.result)
        }
        Ok(Err(e)) => {
            warn!(
                job_id,
                error = %truncate_field(&e.to_string(), DEFAULT_MAX_FIELD_LENGTH),
                "Job failed"
            );
            JobStatusResponse::failed(job_id, e.to_string())
        }
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            error!(
                job_id,
                panic = %truncate_field(&message, DEFAULT_MAX_FIELD_LENGTH),
                "Job panicked"
            );
            JobStatusResponse::failed(job_id, format!("job panicked: {message}"))
        }
    };

    persist_status(storage.as_ref(), response).await;
    registry.remove(job_id).await;
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
