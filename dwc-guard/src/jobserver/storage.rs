//! Durable storage of terminal job statuses and job side outputs.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, instrument, warn};

use crate::error::{Result, ValidatorError};
use crate::model::{DataOutputType, JobDataOutput, JobId, JobStatusResponse};

/// Storage of terminal job statuses, queried before the live registry.
///
/// A job id is written at most once: a second [`put`](JobStorage::put) for
/// the same id fails with [`ValidatorError::JobAlreadyStored`].
#[async_trait]
pub trait JobStorage<R>: Send + Sync
where
    R: Send + Sync + 'static,
{
    async fn get(&self, job_id: JobId) -> Result<Option<JobStatusResponse<R>>>;

    /// Persists a terminal status.
    async fn put(&self, response: JobStatusResponse<R>) -> Result<()>;

    async fn put_data_output(&self, output: JobDataOutput) -> Result<()>;

    async fn get_data_output(
        &self,
        job_id: JobId,
        output_type: DataOutputType,
    ) -> Result<Option<JobDataOutput>>;

    /// Removes everything stored for `job_id`. Returns true if anything was
    /// removed.
    async fn clean_by_key(&self, job_id: JobId) -> Result<bool>;

    /// Removes every job stored before `until`. Returns the number of jobs
    /// removed.
    async fn clean_until(&self, until: DateTime<Utc>) -> Result<usize>;
}

fn ensure_terminal<R>(response: &JobStatusResponse<R>) -> Result<()> {
    if response.status.is_terminal() {
        Ok(())
    } else {
        Err(ValidatorError::InvalidArgument(format!(
            "only terminal statuses are stored, job {} is {}",
            response.job_id, response.status
        )))
    }
}

struct StoredStatus<R> {
    response: JobStatusResponse<R>,
    stored_at: DateTime<Utc>,
}

/// Job storage kept in memory, lost on restart.
pub struct InMemoryJobStorage<R> {
    statuses: Arc<RwLock<HashMap<JobId, StoredStatus<R>>>>,
    outputs: Arc<RwLock<HashMap<(JobId, DataOutputType), JobDataOutput>>>,
}

impl<R> InMemoryJobStorage<R> {
    pub fn new() -> Self {
        Self {
            statuses: Arc::new(RwLock::new(HashMap::new())),
            outputs: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Returns the number of stored statuses.
    pub async fn size(&self) -> usize {
        self.statuses.read().await.len()
    }
}

impl<R> Default for InMemoryJobStorage<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> Clone for InMemoryJobStorage<R> {
    fn clone(&self) -> Self {
        Self {
            statuses: Arc::clone(&self.statuses),
            outputs: Arc::clone(&self.outputs),
        }
    }
}

#[async_trait]
impl<R> JobStorage<R> for InMemoryJobStorage<R>
where
    R: Clone + Send + Sync + 'static,
{
    async fn get(&self, job_id: JobId) -> Result<Option<JobStatusResponse<R>>> {
        Ok(self
            .statuses
            .read()
            .await
            .get(&job_id)
            .map(|stored| stored.response.clone()))
    }

    #[instrument(
        skip(self, response),
        fields(job_id = response.job_id, status = %response.status, storage_type = "in_memory")
    )]
    async fn put(&self, response: JobStatusResponse<R>) -> Result<()> {
        ensure_terminal(&response)?;
        let mut statuses = self.statuses.write().await;
        if statuses.contains_key(&response.job_id) {
            return Err(ValidatorError::JobAlreadyStored(response.job_id));
        }
        statuses.insert(
            response.job_id,
            StoredStatus {
                response,
                stored_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn put_data_output(&self, output: JobDataOutput) -> Result<()> {
        self.outputs
            .write()
            .await
            .insert((output.job_id, output.output_type), output);
        Ok(())
    }

    async fn get_data_output(
        &self,
        job_id: JobId,
        output_type: DataOutputType,
    ) -> Result<Option<JobDataOutput>> {
        Ok(self
            .outputs
            .read()
            .await
            .get(&(job_id, output_type))
            .cloned())
    }

    #[instrument(skip(self))]
    async fn clean_by_key(&self, job_id: JobId) -> Result<bool> {
        let removed_status = self.statuses.write().await.remove(&job_id).is_some();
        let mut outputs = self.outputs.write().await;
        let before = outputs.len();
        outputs.retain(|(id, _), _| *id != job_id);
        Ok(removed_status || outputs.len() != before)
    }

    #[instrument(skip(self))]
    async fn clean_until(&self, until: DateTime<Utc>) -> Result<usize> {
        let mut statuses = self.statuses.write().await;
        let expired: Vec<JobId> = statuses
            .iter()
            .filter(|(_, stored)| stored.stored_at < until)
            .map(|(job_id, _)| *job_id)
            .collect();
        for job_id in &expired {
            statuses.remove(job_id);
        }
        drop(statuses);

        self.outputs
            .write()
            .await
            .retain(|(id, _), _| !expired.contains(id));
        debug!(removed = expired.len(), "Cleaned expired jobs");
        Ok(expired.len())
    }
}

static STAGING_SEQ: AtomicU64 = AtomicU64::new(0);

/// Job storage writing one JSON document per job.
///
/// Layout under the base directory:
///
/// ```text
/// <job_id>.json                 terminal JobStatusResponse
/// <job_id>/<OUTPUT_TYPE>.json   side outputs
/// ```
///
/// Status files are first written to a temporary name then hard-linked into
/// place, so readers never see a partial document and a second writer for
/// the same id fails.
pub struct FileJobStorage<R> {
    base_path: PathBuf,
    _result: PhantomData<fn() -> R>,
}

impl<R> FileJobStorage<R> {
    /// Creates the storage, creating `base_path` if needed.
    pub fn new<P: AsRef<Path>>(base_path: P) -> Result<Self> {
        let base_path = base_path.as_ref().to_path_buf();
        std::fs::create_dir_all(&base_path).map_err(|e| {
            ValidatorError::storage(
                "file",
                format!("failed to create {}: {e}", base_path.display()),
            )
        })?;
        Ok(Self {
            base_path,
            _result: PhantomData,
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn status_path(&self, job_id: JobId) -> PathBuf {
        self.base_path.join(format!("{job_id}.json"))
    }

    fn output_dir(&self, job_id: JobId) -> PathBuf {
        self.base_path.join(job_id.to_string())
    }

    fn output_path(&self, job_id: JobId, output_type: DataOutputType) -> PathBuf {
        self.output_dir(job_id)
            .join(format!("{}.json", output_type.as_str()))
    }

    async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
        match fs::read(path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ValidatorError::storage(
                "file",
                format!("failed to read {}: {e}", path.display()),
            )),
        }
    }

    async fn remove_job(&self, job_id: JobId) -> Result<bool> {
        let mut removed = false;
        match fs::remove_file(self.status_path(job_id)).await {
            Ok(()) => removed = true,
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        match fs::remove_dir_all(self.output_dir(job_id)).await {
            Ok(()) => removed = true,
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        Ok(removed)
    }
}

#[async_trait]
impl<R> JobStorage<R> for FileJobStorage<R>
where
    R: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn get(&self, job_id: JobId) -> Result<Option<JobStatusResponse<R>>> {
        Self::read_json(&self.status_path(job_id)).await
    }

    #[instrument(
        skip(self, response),
        fields(job_id = response.job_id, status = %response.status, storage_type = "file")
    )]
    async fn put(&self, response: JobStatusResponse<R>) -> Result<()> {
        ensure_terminal(&response)?;
        let job_id = response.job_id;
        let path = self.status_path(job_id);
        let staging = self.base_path.join(format!(
            ".{job_id}.json.{}.{}",
            std::process::id(),
            STAGING_SEQ.fetch_add(1, Ordering::Relaxed)
        ));

        let bytes = serde_json::to_vec(&response)?;
        fs::write(&staging, bytes).await?;
        let linked = fs::hard_link(&staging, &path).await;
        if let Err(e) = fs::remove_file(&staging).await {
            warn!(error = %e, staging = %staging.display(), "Failed to remove staging file");
        }

        match linked {
            Ok(()) => {
                debug!(path = %path.display(), "Stored job status");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                Err(ValidatorError::JobAlreadyStored(job_id))
            }
            Err(e) => Err(ValidatorError::storage(
                "file",
                format!("failed to store {}: {e}", path.display()),
            )),
        }
    }

    #[instrument(
        skip(self, output),
        fields(job_id = output.job_id, output_type = output.output_type.as_str())
    )]
    async fn put_data_output(&self, output: JobDataOutput) -> Result<()> {
        fs::create_dir_all(self.output_dir(output.job_id)).await?;
        let path = self.output_path(output.job_id, output.output_type);
        fs::write(&path, serde_json::to_vec(&output)?).await?;
        Ok(())
    }

    async fn get_data_output(
        &self,
        job_id: JobId,
        output_type: DataOutputType,
    ) -> Result<Option<JobDataOutput>> {
        Self::read_json(&self.output_path(job_id, output_type)).await
    }

    #[instrument(skip(self))]
    async fn clean_by_key(&self, job_id: JobId) -> Result<bool> {
        self.remove_job(job_id).await
    }

    #[instrument(skip(self))]
    async fn clean_until(&self, until: DateTime<Utc>) -> Result<usize> {
        let mut entries = fs::read_dir(&self.base_path).await?;
        let mut removed = 0;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }
            let Some(job_id) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<JobId>().ok())
            else {
                continue;
            };
            let modified: DateTime<Utc> = entry.metadata().await?.modified()?.into();
            if modified < until && self.remove_job(job_id).await? {
                removed += 1;
            }
        }

        debug!(removed, "Cleaned expired jobs");
        Ok(removed)
    }
}
