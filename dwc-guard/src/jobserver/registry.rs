//! Live workers, keyed by job id.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tokio::task::{AbortHandle, JoinHandle};

use crate::model::JobId;

/// Shared state of one live worker.
///
/// `terminal` is claimed exactly once by whichever of worker completion,
/// kill or stop gets there first; only the claimer writes the terminal status.
#[derive(Debug)]
pub struct WorkerSlot {
    job_id: JobId,
    started_at: DateTime<Utc>,
    terminal: AtomicBool,
    cancelled: Arc<AtomicBool>,
}

impl WorkerSlot {
    fn new(job_id: JobId) -> Self {
        Self {
            job_id,
            started_at: Utc::now(),
            terminal: AtomicBool::new(false),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Returns true for the first caller only.
    pub fn claim_terminal(&self) -> bool {
        !self.terminal.swap(true, Ordering::AcqRel)
    }

    pub fn is_claimed(&self) -> bool {
        self.terminal.load(Ordering::Acquire)
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Flag observed by the work running for this slot.
    pub fn cancellation_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }
}

#[derive(Debug, Clone)]
pub struct Worker {
    pub slot: Arc<WorkerSlot>,
    pub abort: AbortHandle,
}

/// Registry of live workers. At most one worker per job id.
#[derive(Debug, Default)]
pub struct JobRegistry {
    workers: RwLock<HashMap<JobId, Worker>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawns the worker of `job_id` and registers it.
    ///
    /// The write lock is held across the spawn so the task cannot deregister
    /// itself before it is registered. Returns `None` if a worker is already
    /// registered for `job_id`; `spawn` is not called in that case.
    pub async fn register<F>(&self, job_id: JobId, spawn: F) -> Option<Arc<WorkerSlot>>
    where
        F: FnOnce(Arc<WorkerSlot>) -> JoinHandle<()>,
    {
        let mut workers = self.workers.write().await;
        if workers.contains_key(&job_id) {
            return None;
        }
        let slot = Arc::new(WorkerSlot::new(job_id));
        let handle = spawn(Arc::clone(&slot));
        workers.insert(
            job_id,
            Worker {
                slot: Arc::clone(&slot),
                abort: handle.abort_handle(),
            },
        );
        Some(slot)
    }

    pub async fn get(&self, job_id: JobId) -> Option<Worker> {
        self.workers.read().await.get(&job_id).cloned()
    }

    pub async fn contains(&self, job_id: JobId) -> bool {
        self.workers.read().await.contains_key(&job_id)
    }

    pub async fn remove(&self, job_id: JobId) -> Option<Worker> {
        self.workers.write().await.remove(&job_id)
    }

    pub async fn len(&self) -> usize {
        self.workers.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.workers.read().await.is_empty()
    }

    /// Every live worker, without removing them.
    pub async fn workers(&self) -> Vec<Worker> {
        self.workers.read().await.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_claimed_once() {
        let slot = WorkerSlot::new(1);
        assert!(!slot.is_claimed());
        assert!(slot.claim_terminal());
        assert!(!slot.claim_terminal());
        assert!(slot.is_claimed());
    }

    #[tokio::test]
    async fn test_register_rejects_duplicate_job_id() {
        let registry = JobRegistry::new();
        let before = Utc::now();
        let first = registry
            .register(7, |_| tokio::spawn(std::future::pending::<()>()))
            .await;
        let slot = first.unwrap();
        assert!(slot.started_at() >= before && slot.started_at() <= Utc::now());
        assert_eq!(slot.job_id(), 7);

        let second = registry
            .register(7, |_| unreachable!("second worker must not be spawned"))
            .await;
        assert!(second.is_none());
        assert_eq!(registry.len().await, 1);

        let worker = registry.remove(7).await.unwrap();
        worker.abort.abort();
        assert!(registry.is_empty().await);
    }
}
