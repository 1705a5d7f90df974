use std::sync::Arc;

use tracing::{debug, instrument};

use crate::error::Result;
use crate::model::{DwcDataFile, EvaluationType, RecordEvaluationResult, RowType};

use super::{CollectionEvaluation, ColumnDiff, HashJoinColumnDiff, RecordCollectionEvaluator};

/// Checks that every record of an extension points to an existing core record.
///
/// Each extension identifier with no matching core identifier yields one
/// [`EvaluationType::RecordReferentialIntegrityViolation`] result keyed by
/// that identifier.
#[derive(Debug, Clone)]
pub struct ReferentialIntegrityEvaluator {
    extension_row_type: RowType,
    diff: Arc<dyn ColumnDiff>,
}

impl ReferentialIntegrityEvaluator {
    pub fn new(extension_row_type: RowType) -> Self {
        Self::with_diff(extension_row_type, Arc::new(HashJoinColumnDiff))
    }

    pub fn with_diff(extension_row_type: RowType, diff: Arc<dyn ColumnDiff>) -> Self {
        Self {
            extension_row_type,
            diff,
        }
    }

    fn violation(&self, unlinked_id: String) -> RecordEvaluationResult {
        RecordEvaluationResult::builder()
            .with_row_type(self.extension_row_type.clone())
            .with_record_id(Some(unlinked_id))
            .add_base_detail(EvaluationType::RecordReferentialIntegrityViolation, None, None)
            .build()
    }
}

impl RecordCollectionEvaluator for ReferentialIntegrityEvaluator {
    #[instrument(skip(self, dataset), fields(extension = %self.extension_row_type))]
    fn evaluate(&self, dataset: &DwcDataFile) -> Result<CollectionEvaluation> {
        let core = dataset.core();
        let Some(core_id) = core.record_identifier.as_ref() else {
            return Ok(CollectionEvaluation::NotApplicable(
                "core file has no record identifier".to_string(),
            ));
        };
        let Some(extension) = dataset
            .extensions
            .iter()
            .find(|file| file.row_type == self.extension_row_type)
        else {
            return Ok(CollectionEvaluation::NotApplicable(format!(
                "no extension with row type {}",
                self.extension_row_type
            )));
        };
        let Some(extension_id) = extension.record_identifier.as_ref() else {
            return Ok(CollectionEvaluation::NotApplicable(
                "extension file has no record identifier".to_string(),
            ));
        };

        let unlinked = self.diff.diff_on_columns(
            &core.file_path,
            &extension.file_path,
            core_id.index,
            extension_id.index,
            core.delimiter,
            core.has_headers,
        )?;
        debug!(unlinked = unlinked.len(), "Referential integrity diff complete");

        let this = self.clone();
        Ok(CollectionEvaluation::applicable(
            unlinked.into_iter().map(move |id| this.violation(id)),
        ))
    }

    fn row_type(&self) -> &RowType {
        &self.extension_row_type
    }

    fn name(&self) -> &str {
        "referential_integrity"
    }
}
