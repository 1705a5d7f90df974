//! # dwc-guard - Biodiversity data validation for Rust
//!
//! dwc-guard validates biodiversity occurrence files and Darwin Core
//! Archives asynchronously. Each uploaded file becomes a job: the job server
//! answers immediately with a job id, runs the validation on the tokio
//! runtime, and keeps the terminal status so it can be queried later.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use dwc_guard::prelude::*;
//!
//! # async fn example() -> Result<()> {
//! let config = ValidatorConfig::from_env()?;
//! let pipeline = ValidationPipeline::new(
//!     Arc::new(DelimitedFilePreparer::new(RowType::occurrence())),
//!     config.pipeline_config(),
//! );
//! let storage: Arc<dyn JobStorage<ValidationResult>> = Arc::new(InMemoryJobStorage::new());
//! let server = JobServer::new(pipeline, storage, config.job_server_config());
//!
//! let accepted = server
//!     .submit(DataFile::new("/uploads/occ.csv", "occ.csv", FileFormat::Tabular))
//!     .await;
//!
//! // Poll until the job reaches a terminal status
//! let response = server.status(accepted.job_id).await;
//! if let Some(result) = response.result {
//!     for element in &result.results {
//!         println!("{}: {:?}", element.file_name, element.issue_counts);
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Components
//!
//! - [`jobserver`]: job lifecycle (submit, status, kill, stop) over a
//!   write-once [`jobserver::JobStorage`].
//! - [`pipeline`]: prepares a dataset, splits its files into shards and
//!   merges the per-shard reports.
//! - [`collector`]: bounded, mergeable issue counters and samples, in a
//!   single-owner and a thread-safe flavor.
//! - [`evaluator`]: record evaluators and whole-file evaluators
//!   (uniqueness, referential integrity).
//!
//! Validation findings are data, reported in a
//! [`ValidationResult`](model::ValidationResult); [`error::ValidatorError`]
//! is reserved for failures that prevent a validation from completing.
//!
//! ## Logging
//!
//! All components emit `tracing` events. Install a subscriber with
//! [`config::ValidatorConfig::init_logging`] or your own.

pub mod collector;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod jobserver;
pub mod logging;
pub mod model;
pub mod pipeline;
pub mod prelude;
pub mod reader;
