use std::sync::Arc;

use crate::model::RecordEvaluationResult;

use super::RecordEvaluator;

/// Runs several record evaluators and merges their results per record.
#[derive(Debug, Clone, Default)]
pub struct EvaluatorChain {
    evaluators: Vec<Arc<dyn RecordEvaluator>>,
}

impl EvaluatorChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_evaluator(mut self, evaluator: impl RecordEvaluator + 'static) -> Self {
        self.evaluators.push(Arc::new(evaluator));
        self
    }

    pub fn push(&mut self, evaluator: Arc<dyn RecordEvaluator>) {
        self.evaluators.push(evaluator);
    }

    pub fn len(&self) -> usize {
        self.evaluators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.evaluators.is_empty()
    }
}

impl RecordEvaluator for EvaluatorChain {
    fn evaluate(
        &self,
        line_number: Option<u64>,
        record: &[String],
    ) -> Option<RecordEvaluationResult> {
        self.evaluators.iter().fold(None, |merged, evaluator| {
            RecordEvaluationResult::merge(merged, evaluator.evaluate(line_number, record))
        })
    }

    fn name(&self) -> &str {
        "evaluator_chain"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::RecordStructureEvaluator;
    use crate::model::{EvaluationType, RowType};

    #[derive(Debug)]
    struct EmptyValueEvaluator;

    impl RecordEvaluator for EmptyValueEvaluator {
        fn evaluate(
            &self,
            line_number: Option<u64>,
            record: &[String],
        ) -> Option<RecordEvaluationResult> {
            let builder = RecordEvaluationResult::builder().with_line_number(line_number);
            let builder = record
                .iter()
                .filter(|value| value.is_empty())
                .fold(builder, |builder, _| {
                    builder.add_base_detail(
                        EvaluationType::custom("EMPTY_VALUE"),
                        None,
                        None,
                    )
                });
            builder.has_details().then(|| builder.build())
        }

        fn name(&self) -> &str {
            "empty_value"
        }
    }

    #[test]
    fn test_chain_merges_details_in_order() {
        let chain = EvaluatorChain::new()
            .with_evaluator(RecordStructureEvaluator::new(RowType::occurrence(), 3))
            .with_evaluator(EmptyValueEvaluator);

        let result = chain
            .evaluate(Some(4), &["".to_string(), "b".to_string()])
            .unwrap();
        let types: Vec<_> = result
            .details()
            .iter()
            .map(|d| d.evaluation_type.as_str().to_string())
            .collect();
        assert_eq!(types, vec!["COLUMN_MISMATCH", "EMPTY_VALUE"]);
    }

    #[test]
    fn test_chain_without_issue() {
        let chain = EvaluatorChain::new().with_evaluator(EmptyValueEvaluator);
        assert!(chain.evaluate(Some(2), &["a".to_string()]).is_none());
        assert!(EvaluatorChain::new().evaluate(None, &[]).is_none());
    }
}
