use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::try_join_all;
use tokio::task::{spawn_blocking, JoinError};
use tracing::{debug, info, instrument};

use crate::collector::{
    merge_and_get_result, CollectorGroup, CollectorMode, ExclusiveCollectorGroup, GroupSnapshot,
    SharedCollectorGroup, DEFAULT_MAX_NUMBER_OF_SAMPLE,
};
use crate::error::{Result, ValidatorError};
use crate::evaluator::{
    CollectionEvaluation, EvaluatorChain, InterpretationEvaluator, MetadataEvaluator,
    RecordCollectionEvaluator, RecordEvaluator, RecordStructureEvaluator,
    ReferentialIntegrityEvaluator, UniquenessEvaluator, INTERPRETED_TERMS,
};
use crate::jobserver::{JobContext, JobExecutor, JobOutcome};
use crate::model::{
    DataFile, DataOutputType, DwcDataFile, RowType, TabularDataFile, ValidationResult,
};
use crate::reader;

use super::preparer::DatasetPreparer;
use super::shard::{plan_shards, run_shard};

/// Default number of records per shard.
pub const DEFAULT_FILE_SPLIT_SIZE: u64 = 10_000;

/// Default number of core records published as the verbatim sample.
pub const DEFAULT_VERBATIM_SAMPLE_SIZE: usize = 10;

/// Settings of a [`ValidationPipeline`].
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub file_split_size: u64,
    pub max_number_of_sample: usize,
    pub verbatim_sample_size: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            file_split_size: DEFAULT_FILE_SPLIT_SIZE,
            max_number_of_sample: DEFAULT_MAX_NUMBER_OF_SAMPLE,
            verbatim_sample_size: DEFAULT_VERBATIM_SAMPLE_SIZE,
        }
    }
}

/// Validates an uploaded file end to end.
///
/// The file is prepared, each of its tabular files is split into shards
/// evaluated on blocking threads, collection evaluators run alongside, and
/// everything is merged into one [`ValidationResult`]. Two side outputs are
/// published: the prepared dataset and a verbatim sample of the core file.
#[derive(Debug, Clone)]
pub struct ValidationPipeline {
    preparer: Arc<dyn DatasetPreparer>,
    config: PipelineConfig,
    record_evaluators: Vec<Arc<dyn RecordEvaluator>>,
    interpreted_terms: Vec<String>,
    metadata_evaluator: MetadataEvaluator,
}

impl ValidationPipeline {
    pub fn new(preparer: Arc<dyn DatasetPreparer>, config: PipelineConfig) -> Self {
        Self {
            preparer,
            config,
            record_evaluators: Vec::new(),
            interpreted_terms: INTERPRETED_TERMS.iter().map(|term| term.to_string()).collect(),
            metadata_evaluator: MetadataEvaluator::default(),
        }
    }

    /// Runs `evaluator` on every record, after the structure check.
    pub fn with_record_evaluator(mut self, evaluator: Arc<dyn RecordEvaluator>) -> Self {
        self.record_evaluators.push(evaluator);
        self
    }

    /// Counts interpreted values of `terms` reported by record evaluators.
    /// Defaults to [`INTERPRETED_TERMS`]; an empty list disables counting.
    pub fn with_interpreted_terms(mut self, terms: Vec<String>) -> Self {
        self.interpreted_terms = terms;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Validates `data_file`. Returns an error when the file cannot be read
    /// or the job is cancelled; issues found in the data are part of the
    /// result.
    #[instrument(
        skip(self, ctx, data_file),
        fields(job_id = ctx.job_id(), file = %data_file.source_file_name)
    )]
    pub async fn validate(
        &self,
        ctx: &JobContext,
        data_file: DataFile,
    ) -> Result<JobOutcome<ValidationResult>> {
        ctx.ensure_active()?;

        let preparer = Arc::clone(&self.preparer);
        let dataset = spawn_blocking(move || preparer.prepare(&data_file))
            .await
            .map_err(join_error)??;
        let dataset = Arc::new(dataset);
        info!(
            files = dataset.tabular_files().count(),
            core_records = dataset.core().num_of_records(),
            "Dataset prepared"
        );
        ctx.ensure_active()?;

        let files = dataset
            .tabular_files()
            .map(|file| self.run_file(ctx, file.clone()));
        let (shards, mut collection) = tokio::try_join!(
            try_join_all(files),
            self.run_collection_evaluators(ctx, Arc::clone(&dataset))
        )?;

        let mut results = Vec::with_capacity(shards.len() + 1);
        for (file, mut snapshots) in dataset.tabular_files().zip(shards) {
            if let Some(snapshot) = collection.remove(&file.row_type) {
                snapshots.push(snapshot);
            }
            let element = merge_and_get_result(file, &file.source_file_name, snapshots);
            results.extend(element);
        }
        results.extend(self.metadata_evaluator.evaluate(&dataset));

        let result = ValidationResult::new(
            dataset.data_file.source_file_name.clone(),
            dataset.data_file.file_format,
            results,
        );
        info!(
            elements = result.results.len(),
            indexeable = result.indexeable,
            "Validation complete"
        );

        let verbatim = {
            let core = dataset.core().clone();
            let size = self.config.verbatim_sample_size;
            spawn_blocking(move || verbatim_sample(&core, size))
                .await
                .map_err(join_error)??
        };
        Ok(JobOutcome::new(result)
            .with_data_output(DataOutputType::DatasetObject, serde_json::to_value(&*dataset)?)
            .with_data_output(DataOutputType::VerbatimRecordSample, verbatim))
    }

    fn evaluator_chain(&self, file: &TabularDataFile) -> EvaluatorChain {
        let mut chain =
            EvaluatorChain::new().with_evaluator(RecordStructureEvaluator::for_file(file));
        if let Some(interpretation) = InterpretationEvaluator::for_file(file) {
            chain = chain.with_evaluator(interpretation);
        }
        for evaluator in &self.record_evaluators {
            chain.push(Arc::clone(evaluator));
        }
        chain
    }

    fn new_group<M: CollectorMode>(&self, columns: Vec<String>) -> CollectorGroup<M> {
        let group = CollectorGroup::new(columns, self.config.max_number_of_sample);
        if self.interpreted_terms.is_empty() {
            group
        } else {
            group.with_interpreted_terms(self.interpreted_terms.clone())
        }
    }

    /// Evaluates every shard of `file` and returns their snapshots.
    async fn run_file(
        &self,
        ctx: &JobContext,
        file: TabularDataFile,
    ) -> Result<Vec<GroupSnapshot>> {
        let file = Arc::new(file);
        let shards = {
            let file = Arc::clone(&file);
            let split_size = self.config.file_split_size;
            spawn_blocking(move || plan_shards(&file, split_size))
                .await
                .map_err(join_error)??
        };
        let chain = Arc::new(self.evaluator_chain(&file));
        debug!(file = %file.source_file_name, shards = shards.len(), "Evaluating file");
        ctx.ensure_active()?;

        if let [shard] = shards.as_slice() {
            let shard = shard.clone();
            let group: ExclusiveCollectorGroup = self.new_group(file.columns.clone());
            let cancelled = ctx.cancellation_flag();
            let snapshot = spawn_blocking(move || {
                run_shard(&file, &shard, &*chain, &group, &cancelled)?;
                Ok::<_, ValidatorError>(group.into_snapshot())
            })
            .await
            .map_err(join_error)??;
            return Ok(vec![snapshot]);
        }

        let groups: Vec<Arc<SharedCollectorGroup>> = shards
            .iter()
            .map(|_| Arc::new(self.new_group(file.columns.clone())))
            .collect();
        let handles = shards.into_iter().zip(&groups).map(|(shard, group)| {
            let file = Arc::clone(&file);
            let chain = Arc::clone(&chain);
            let group = Arc::clone(group);
            let cancelled = ctx.cancellation_flag();
            spawn_blocking(move || run_shard(&file, &shard, &*chain, &*group, &cancelled))
        });
        for outcome in try_join_all(handles).await.map_err(join_error)? {
            outcome?;
        }

        Ok(groups.iter().map(|group| group.snapshot()).collect())
    }

    /// Runs the collection evaluators that apply to `dataset` concurrently,
    /// one shared group per file.
    async fn run_collection_evaluators(
        &self,
        ctx: &JobContext,
        dataset: Arc<DwcDataFile>,
    ) -> Result<HashMap<RowType, GroupSnapshot>> {
        let evaluators = collection_evaluators(&dataset);

        let mut groups: HashMap<RowType, Arc<SharedCollectorGroup>> = HashMap::new();
        for evaluator in &evaluators {
            let columns = dataset
                .by_row_type(evaluator.row_type())
                .map(|file| file.columns.clone())
                .unwrap_or_default();
            groups
                .entry(evaluator.row_type().clone())
                .or_insert_with(|| Arc::new(self.new_group(columns)));
        }

        let handles = evaluators.into_iter().filter_map(|evaluator| {
            let group = Arc::clone(groups.get(evaluator.row_type())?);
            let dataset = Arc::clone(&dataset);
            let ctx = ctx.clone();
            Some(spawn_blocking(move || -> Result<()> {
                match evaluator.evaluate(&dataset)? {
                    CollectionEvaluation::NotApplicable(reason) => {
                        debug!(evaluator = evaluator.name(), %reason, "Evaluator not applicable");
                    }
                    CollectionEvaluation::Applicable(results) => {
                        for result in results {
                            ctx.ensure_active()?;
                            group.collect_result(&result);
                        }
                    }
                }
                Ok(())
            }))
        });
        for outcome in try_join_all(handles).await.map_err(join_error)? {
            outcome?;
        }

        Ok(groups
            .into_iter()
            .map(|(row_type, group)| (row_type, group.snapshot()))
            .collect())
    }
}

/// Uniqueness of the core identifier and referential integrity of every
/// extension.
fn collection_evaluators(dataset: &DwcDataFile) -> Vec<Arc<dyn RecordCollectionEvaluator>> {
    let mut evaluators: Vec<Arc<dyn RecordCollectionEvaluator>> = vec![Arc::new(
        UniquenessEvaluator::new(dataset.core().row_type.clone(), false),
    )];
    for extension in &dataset.extensions {
        evaluators.push(Arc::new(ReferentialIntegrityEvaluator::new(
            extension.row_type.clone(),
        )));
    }
    evaluators
}

/// The first `size` records of `file`, as JSON objects keyed by column.
fn verbatim_sample(file: &TabularDataFile, size: usize) -> Result<serde_json::Value> {
    let mut sample = Vec::with_capacity(size);
    for record in reader::records(file)?.take(size) {
        let record = record?;
        let object: serde_json::Map<String, serde_json::Value> = record
            .values
            .into_iter()
            .enumerate()
            .map(|(index, value)| {
                let column = file
                    .columns
                    .get(index)
                    .cloned()
                    .unwrap_or_else(|| format!("column_{index}"));
                (column, serde_json::Value::String(value))
            })
            .collect();
        sample.push(serde_json::Value::Object(object));
    }
    Ok(serde_json::Value::Array(sample))
}

fn join_error(e: JoinError) -> ValidatorError {
    ValidatorError::Internal(format!("validation task failed: {e}"))
}

#[async_trait]
impl JobExecutor for ValidationPipeline {
    type Payload = DataFile;
    type Output = ValidationResult;

    async fn execute(
        &self,
        ctx: JobContext,
        payload: DataFile,
    ) -> Result<JobOutcome<ValidationResult>> {
        self.validate(&ctx, payload).await
    }
}
