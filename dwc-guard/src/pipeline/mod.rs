//! The validation pipeline run for each job.

mod preparer;
mod shard;
mod validation;

pub use preparer::{DatasetPreparer, DelimitedFilePreparer, DEFAULT_IDENTIFIER_TERMS};
pub use shard::{plan_shards, run_shard, Shard};
pub use validation::{
    PipelineConfig, ValidationPipeline, DEFAULT_FILE_SPLIT_SIZE, DEFAULT_VERBATIM_SAMPLE_SIZE,
};
