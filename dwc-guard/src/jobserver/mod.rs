//! Asynchronous job lifecycle management.
//!
//! A [`JobServer`] accepts jobs, runs each on a tokio task through a
//! [`JobExecutor`], and answers status and kill queries. Terminal statuses
//! are written once to a [`JobStorage`]; live jobs are tracked in a
//! [`JobRegistry`].
//!
//! ```text
//! submit ──► registry ──► worker task ──► executor
//!                               │
//!                               └──► storage (FINISHED | FAILED) ──► deregister
//! kill   ──► registry ──► abort ──► storage (KILLED) ──► deregister
//! status ──► storage ──► registry (RUNNING | NOT_FOUND)
//! ```

mod registry;
mod server;
mod storage;

pub use registry::{JobRegistry, Worker, WorkerSlot};
pub use server::{
    JobContext, JobExecutor, JobOutcome, JobServer, JobServerConfig, DEFAULT_LOOKUP_TIMEOUT,
};
pub use storage::{FileJobStorage, InMemoryJobStorage, JobStorage};
