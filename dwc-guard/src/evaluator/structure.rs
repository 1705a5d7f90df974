use crate::model::{EvaluationType, RecordEvaluationResult, RowType, TabularDataFile};

use super::RecordEvaluator;

/// Checks that every record has the number of columns its file declares.
#[derive(Debug, Clone)]
pub struct RecordStructureEvaluator {
    row_type: RowType,
    expected_columns: usize,
    id_index: Option<usize>,
}

impl RecordStructureEvaluator {
    pub fn new(row_type: RowType, expected_columns: usize) -> Self {
        Self {
            row_type,
            expected_columns,
            id_index: None,
        }
    }

    /// Reads the record id from the column at `index`.
    pub fn with_id_index(mut self, index: Option<usize>) -> Self {
        self.id_index = index;
        self
    }

    /// Builds an evaluator matching the declared layout of `file`.
    pub fn for_file(file: &TabularDataFile) -> Self {
        Self::new(file.row_type.clone(), file.columns.len())
            .with_id_index(file.record_identifier.as_ref().map(|id| id.index))
    }
}

impl RecordEvaluator for RecordStructureEvaluator {
    fn evaluate(
        &self,
        line_number: Option<u64>,
        record: &[String],
    ) -> Option<RecordEvaluationResult> {
        if record.len() == self.expected_columns {
            return None;
        }
        let record_id = self
            .id_index
            .and_then(|index| record.get(index))
            .filter(|value| !value.trim().is_empty())
            .cloned();

        Some(
            RecordEvaluationResult::builder()
                .with_line_number(line_number)
                .with_record_id(record_id)
                .with_row_type(self.row_type.clone())
                .add_base_detail(
                    EvaluationType::ColumnMismatch,
                    Some(self.expected_columns.to_string()),
                    Some(record.len().to_string()),
                )
                .build(),
        )
    }

    fn name(&self) -> &str {
        "record_structure"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_matching_record_has_no_result() {
        let evaluator = RecordStructureEvaluator::new(RowType::occurrence(), 2);
        assert!(evaluator.evaluate(Some(2), &record(&["1", "a"])).is_none());
    }

    #[test]
    fn test_column_mismatch() {
        let evaluator = RecordStructureEvaluator::new(RowType::occurrence(), 3).with_id_index(Some(0));
        let result = evaluator
            .evaluate(Some(5), &record(&["occ-9", "a"]))
            .unwrap();

        assert_eq!(result.record_id(), Some("occ-9"));
        assert_eq!(result.line_number(), Some(5));
        let detail = &result.details()[0];
        assert_eq!(detail.evaluation_type, EvaluationType::ColumnMismatch);
        assert_eq!(detail.expected.as_deref(), Some("3"));
        assert_eq!(detail.found.as_deref(), Some("2"));
    }
}
