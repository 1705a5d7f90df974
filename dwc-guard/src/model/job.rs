//! Job identity, status and side outputs.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidatorError;

/// Identifier of a job, unique within one server lifetime.
pub type JobId = u64;

/// A unit of work accepted by the job server.
#[derive(Debug, Clone)]
pub struct Job<P> {
    pub id: JobId,
    pub payload: P,
    pub submitted_at: DateTime<Utc>,
}

impl<P> Job<P> {
    pub fn new(id: JobId, payload: P) -> Self {
        Self {
            id,
            payload,
            submitted_at: Utc::now(),
        }
    }
}

/// Source of job ids.
///
/// Seeded from the wall clock by default so ids from a restarted server do
/// not collide with ids persisted by a previous run.
#[derive(Debug)]
pub struct JobIdSeed {
    next: AtomicU64,
}

impl JobIdSeed {
    pub fn new(seed: JobId) -> Self {
        Self {
            next: AtomicU64::new(seed),
        }
    }

    /// Seeds with the current time in milliseconds since the Unix epoch.
    pub fn from_clock() -> Self {
        let millis = Utc::now().timestamp_millis().max(0) as u64;
        Self::new(millis)
    }

    pub fn next_id(&self) -> JobId {
        self.next.fetch_add(1, Ordering::SeqCst)
    }
}

impl Default for JobIdSeed {
    fn default() -> Self {
        Self::from_clock()
    }
}

/// Lifecycle status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Accepted,
    Running,
    Finished,
    Failed,
    Killed,
    /// Only ever a query answer, never stored.
    NotFound,
}

impl JobStatus {
    /// Returns true for statuses that end a job's lifecycle.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Failed | Self::Killed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Accepted => "ACCEPTED",
            Self::Running => "RUNNING",
            Self::Finished => "FINISHED",
            Self::Failed => "FAILED",
            Self::Killed => "KILLED",
            Self::NotFound => "NOT_FOUND",
        };
        f.write_str(name)
    }
}

/// Answer to a submit, status or kill request.
///
/// `result` is only present when the status is [`JobStatus::Finished`];
/// `message` carries diagnostics for failed jobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(bound(deserialize = "R: Deserialize<'de>"))]
pub struct JobStatusResponse<R> {
    pub job_id: JobId,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<R>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<R> JobStatusResponse<R> {
    fn with_status(job_id: JobId, status: JobStatus) -> Self {
        Self {
            job_id,
            status,
            result: None,
            message: None,
        }
    }

    pub fn accepted(job_id: JobId) -> Self {
        Self::with_status(job_id, JobStatus::Accepted)
    }

    pub fn running(job_id: JobId) -> Self {
        Self::with_status(job_id, JobStatus::Running)
    }

    pub fn killed(job_id: JobId) -> Self {
        Self::with_status(job_id, JobStatus::Killed)
    }

    pub fn not_found(job_id: JobId) -> Self {
        Self::with_status(job_id, JobStatus::NotFound)
    }

    pub fn failed(job_id: JobId, message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::with_status(job_id, JobStatus::Failed)
        }
    }

    pub fn finished(job_id: JobId, result: R) -> Self {
        Self {
            result: Some(result),
            ..Self::with_status(job_id, JobStatus::Finished)
        }
    }

    /// HTTP status code the resource layer answers with for this response.
    pub fn http_status(&self) -> u16 {
        match self.status {
            JobStatus::Accepted => 202,
            JobStatus::NotFound => 404,
            _ => 200,
        }
    }
}

/// Kinds of side output a finished job may publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DataOutputType {
    /// The prepared dataset description
    DatasetObject,
    /// The first records of the core file, as read
    VerbatimRecordSample,
}

impl DataOutputType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DatasetObject => "DATASET_OBJECT",
            Self::VerbatimRecordSample => "VERBATIM_RECORD_SAMPLE",
        }
    }
}

impl FromStr for DataOutputType {
    type Err = ValidatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "DATASET_OBJECT" => Ok(Self::DatasetObject),
            "VERBATIM_RECORD_SAMPLE" => Ok(Self::VerbatimRecordSample),
            other => Err(ValidatorError::InvalidArgument(format!(
                "unknown data output type: {other}"
            ))),
        }
    }
}

/// A named artifact associated with a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobDataOutput {
    pub job_id: JobId,
    pub output_type: DataOutputType,
    pub content: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_is_monotonic() {
        let seed = JobIdSeed::new(100);
        assert_eq!(seed.next_id(), 100);
        assert_eq!(seed.next_id(), 101);
        assert!(JobIdSeed::from_clock().next_id() > 1_600_000_000_000);
    }

    #[test]
    fn test_response_serialization() {
        let response: JobStatusResponse<u32> = JobStatusResponse::finished(7, 3);
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["jobId"], 7);
        assert_eq!(json["status"], "FINISHED");
        assert_eq!(json["result"], 3);

        let not_found: JobStatusResponse<u32> = JobStatusResponse::not_found(8);
        let json = serde_json::to_value(&not_found).unwrap();
        assert!(json.get("result").is_none());
        assert_eq!(not_found.http_status(), 404);
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(JobStatus::Killed.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(!JobStatus::NotFound.is_terminal());
    }

    #[test]
    fn test_data_output_type_parse() {
        assert_eq!(
            "verbatim_record_sample".parse::<DataOutputType>().unwrap(),
            DataOutputType::VerbatimRecordSample
        );
        assert!("unknown".parse::<DataOutputType>().is_err());
    }
}
