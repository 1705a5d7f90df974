//! Data model shared by evaluators, collectors and the job server.

pub mod dataset;
pub mod evaluation;
pub mod job;
pub mod result;

pub use dataset::{
    simple_term, Contact, DataFile, DatasetMetadata, DwcDataFile, DwcFileType, FileFormat, RowType,
    TabularDataFile, TermIndex,
};
pub use evaluation::{
    CustomEvaluationType, EvaluationCategory, EvaluationDetail, EvaluationType, RecordEvaluationResult,
    RecordEvaluationResultBuilder,
};
pub use job::{
    DataOutputType, Job, JobDataOutput, JobId, JobIdSeed, JobStatus, JobStatusResponse,
};
pub use result::{
    ValidationIssue, ValidationResult, ValidationResultDetails, ValidationResultElement,
};
