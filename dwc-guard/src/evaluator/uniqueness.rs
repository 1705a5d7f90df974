use std::collections::HashMap;

use tracing::{debug, instrument};

use crate::error::Result;
use crate::model::{DwcDataFile, EvaluationType, RecordEvaluationResult, RowType};
use crate::reader;

use super::{CollectionEvaluation, RecordCollectionEvaluator};

/// Checks that the identifier column of one file holds distinct values.
///
/// Every record whose identifier is shared with another record yields one
/// [`EvaluationType::RecordNotUniquelyIdentified`] result carrying its id and
/// line number. Blank identifiers are ignored.
#[derive(Debug, Clone)]
pub struct UniquenessEvaluator {
    row_type: RowType,
    case_sensitive: bool,
}

impl UniquenessEvaluator {
    pub fn new(row_type: RowType, case_sensitive: bool) -> Self {
        Self {
            row_type,
            case_sensitive,
        }
    }

    fn key(&self, value: &str) -> String {
        if self.case_sensitive {
            value.to_string()
        } else {
            value.to_lowercase()
        }
    }
}

impl RecordCollectionEvaluator for UniquenessEvaluator {
    #[instrument(skip(self, dataset), fields(row_type = %self.row_type))]
    fn evaluate(&self, dataset: &DwcDataFile) -> Result<CollectionEvaluation> {
        let Some(file) = dataset.by_row_type(&self.row_type) else {
            return Ok(CollectionEvaluation::NotApplicable(format!(
                "no file with row type {}",
                self.row_type
            )));
        };
        let Some(identifier) = file.record_identifier.as_ref() else {
            return Ok(CollectionEvaluation::NotApplicable(format!(
                "{} has no record identifier",
                file.source_file_name
            )));
        };

        // key -> (id as written, line numbers)
        let mut occurrences: HashMap<String, Vec<(String, u64)>> = HashMap::new();
        for record in reader::records(file)? {
            let record = record?;
            let Some(value) = record.values.get(identifier.index).map(|v| v.trim()) else {
                continue;
            };
            if value.is_empty() {
                continue;
            }
            occurrences
                .entry(self.key(value))
                .or_default()
                .push((value.to_string(), record.line_number));
        }

        let mut duplicates: Vec<(String, u64)> = occurrences
            .into_values()
            .filter(|records| records.len() > 1)
            .flatten()
            .collect();
        duplicates.sort_by_key(|(_, line_number)| *line_number);
        debug!(duplicates = duplicates.len(), "Uniqueness check complete");

        let row_type = self.row_type.clone();
        Ok(CollectionEvaluation::applicable(duplicates.into_iter().map(
            move |(id, line_number)| {
                RecordEvaluationResult::builder()
                    .with_row_type(row_type.clone())
                    .with_line_number(Some(line_number))
                    .with_record_id(Some(id))
                    .add_base_detail(EvaluationType::RecordNotUniquelyIdentified, None, None)
                    .build()
            },
        )))
    }

    fn row_type(&self) -> &RowType {
        &self.row_type
    }

    fn name(&self) -> &str {
        "uniqueness"
    }
}
