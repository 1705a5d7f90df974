//! Prelude for commonly used types and traits in dwc-guard.

pub use crate::collector::{
    CollectorGroup, ExclusiveCollectorGroup, GroupSnapshot, SharedCollectorGroup,
};
pub use crate::config::ValidatorConfig;
pub use crate::error::{ErrorContext, Result, ValidatorError};
pub use crate::evaluator::{RecordCollectionEvaluator, RecordEvaluator};
pub use crate::jobserver::{
    FileJobStorage, InMemoryJobStorage, JobExecutor, JobServer, JobServerConfig, JobStorage,
};
pub use crate::model::{
    DataFile, DwcDataFile, EvaluationType, FileFormat, JobStatus, JobStatusResponse, RowType,
    ValidationResult,
};
pub use crate::pipeline::{DelimitedFilePreparer, ValidationPipeline};
