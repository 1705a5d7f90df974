use std::collections::BTreeMap;

use crate::model::{
    EvaluationDetail, EvaluationType, RecordEvaluationResult, ValidationResultDetails,
};

use super::counter::{BoundedSamples, CollectorMode, KeyedCounter};
use super::ResultsCollector;

/// Default cap on the number of samples kept per evaluation type.
pub const DEFAULT_MAX_NUMBER_OF_SAMPLE: usize = 10;

/// Counts issues by evaluation type and keeps the first N samples of each.
///
/// Samples are kept in arrival order. With the [`Shared`](super::Shared)
/// mode the arrival order of concurrent producers is not deterministic; the
/// merge stage re-sorts samples by line number.
pub struct RecordEvaluationResultCollector<M: CollectorMode> {
    max_number_of_sample: usize,
    counts: M::Counter<EvaluationType>,
    samples: M::Samples<EvaluationType, ValidationResultDetails>,
}

impl<M: CollectorMode> RecordEvaluationResultCollector<M> {
    pub fn new(max_number_of_sample: usize) -> Self {
        Self {
            max_number_of_sample,
            counts: Default::default(),
            samples: Default::default(),
        }
    }
}

impl<M: CollectorMode> Default for RecordEvaluationResultCollector<M> {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_NUMBER_OF_SAMPLE)
    }
}

impl<M: CollectorMode> ResultsCollector for RecordEvaluationResultCollector<M> {
    fn collect(&self, result: &RecordEvaluationResult) {
        for detail in result.details() {
            self.counts.increment(detail.evaluation_type.clone());
            self.samples.offer(
                detail.evaluation_type.clone(),
                self.max_number_of_sample,
                || to_sample(detail),
            );
        }
    }

    fn aggregated_counts(&self) -> BTreeMap<EvaluationType, u64> {
        self.counts.snapshot()
    }

    fn samples(&self) -> BTreeMap<EvaluationType, Vec<ValidationResultDetails>> {
        self.samples.snapshot()
    }
}

fn to_sample(detail: &EvaluationDetail) -> ValidationResultDetails {
    ValidationResultDetails {
        line_number: detail.line_number,
        record_id: detail.record_id.clone(),
        expected: detail.expected.clone(),
        found: detail.found.clone(),
        related_data: detail.related_data.clone(),
    }
}
