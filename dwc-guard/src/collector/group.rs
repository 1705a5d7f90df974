use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::model::{
    EvaluationType, RecordEvaluationResult, TabularDataFile, ValidationResultDetails,
    ValidationResultElement,
};

use super::counter::{CollectorMode, Exclusive, Shared};
use super::interpreted::InterpretedTermsCountCollector;
use super::metrics::TermsFrequencyCollector;
use super::results::RecordEvaluationResultCollector;
use super::{MetricsCollector, ResultsCollector};

/// The collectors of one shard of one file. They always advance together.
pub struct CollectorGroup<M: CollectorMode> {
    columns: Vec<String>,
    max_number_of_sample: usize,
    metrics: TermsFrequencyCollector<M>,
    results: RecordEvaluationResultCollector<M>,
    interpreted: Option<InterpretedTermsCountCollector<M>>,
}

pub type ExclusiveCollectorGroup = CollectorGroup<Exclusive>;
pub type SharedCollectorGroup = CollectorGroup<Shared>;

impl<M: CollectorMode> CollectorGroup<M> {
    pub fn new(columns: Vec<String>, max_number_of_sample: usize) -> Self {
        Self {
            metrics: TermsFrequencyCollector::new(columns.clone()),
            results: RecordEvaluationResultCollector::new(max_number_of_sample),
            interpreted: None,
            columns,
            max_number_of_sample,
        }
    }

    /// Also counts interpreted values of `terms`.
    pub fn with_interpreted_terms(mut self, terms: Vec<String>) -> Self {
        self.interpreted = Some(InterpretedTermsCountCollector::new(terms));
        self
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn collect_metrics(&self, record: &[String]) {
        self.metrics.collect(record);
    }

    pub fn collect_result(&self, result: &RecordEvaluationResult) {
        self.results.collect(result);
        if let Some(interpreted) = &self.interpreted {
            interpreted.collect(result);
        }
    }

    /// Point-in-time copy of the group state.
    pub fn snapshot(&self) -> GroupSnapshot {
        GroupSnapshot {
            max_number_of_sample: self.max_number_of_sample,
            term_frequency: self.metrics.term_frequency(),
            issue_counts: self.results.aggregated_counts(),
            issue_samples: self.results.samples(),
            interpreted_term_counts: self
                .interpreted
                .as_ref()
                .map(InterpretedTermsCountCollector::interpreted_term_counts),
        }
    }

    /// Consumes the group once its shard is done.
    pub fn into_snapshot(self) -> GroupSnapshot {
        self.snapshot()
    }
}

/// Frozen state of a [`CollectorGroup`], as consumed by the merge stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupSnapshot {
    pub max_number_of_sample: usize,
    pub term_frequency: BTreeMap<String, u64>,
    pub issue_counts: BTreeMap<EvaluationType, u64>,
    pub issue_samples: BTreeMap<EvaluationType, Vec<ValidationResultDetails>>,
    pub interpreted_term_counts: Option<BTreeMap<String, u64>>,
}

/// Combines the snapshots of every shard of one file into one report.
///
/// Counts are summed. Samples of all shards are concatenated then
/// [`resample`]d to the largest `max_number_of_sample` of the snapshots, so
/// the sample bound holds after the merge. Term frequency is
/// emitted in the declared column order of `data_file`. Returns `None` when
/// `shards` is empty.
pub fn merge_and_get_result(
    data_file: &TabularDataFile,
    file_name: &str,
    shards: Vec<GroupSnapshot>,
) -> Option<ValidationResultElement> {
    let max_number_of_sample = shards
        .iter()
        .map(|shard| shard.max_number_of_sample)
        .max()?;

    let mut term_frequency: BTreeMap<String, u64> = BTreeMap::new();
    let mut issue_counts: BTreeMap<EvaluationType, u64> = BTreeMap::new();
    let mut issue_samples: BTreeMap<EvaluationType, Vec<ValidationResultDetails>> =
        BTreeMap::new();
    let mut interpreted_term_counts: BTreeMap<String, u64> = BTreeMap::new();

    for shard in shards {
        for (term, count) in shard.term_frequency {
            *term_frequency.entry(term).or_insert(0) += count;
        }
        for (issue, count) in shard.issue_counts {
            *issue_counts.entry(issue).or_insert(0) += count;
        }
        for (issue, samples) in shard.issue_samples {
            issue_samples.entry(issue).or_default().extend(samples);
        }
        for (term, count) in shard.interpreted_term_counts.into_iter().flatten() {
            *interpreted_term_counts.entry(term).or_insert(0) += count;
        }
    }

    let issue_samples = issue_samples
        .into_iter()
        .map(|(issue, samples)| (issue, resample(samples, max_number_of_sample)))
        .collect();

    let mut seen = HashSet::new();
    let term_frequency = data_file
        .columns
        .iter()
        .filter(|column| seen.insert(column.as_str()))
        .map(|column| {
            let count = term_frequency.get(column).copied().unwrap_or(0);
            (column.clone(), count)
        })
        .collect();

    Some(ValidationResultElement {
        file_name: file_name.to_string(),
        number_of_lines: data_file.num_of_lines,
        file_type: data_file.file_type,
        row_type: Some(data_file.row_type.clone()),
        id_term: data_file
            .record_identifier
            .as_ref()
            .map(|identifier| identifier.term.clone()),
        issue_counts,
        issue_samples,
        term_frequency,
        interpreted_term_counts,
    })
}

/// Orders samples by line number, samples without one last, then keeps the
/// first `max`. The sort is stable.
pub fn resample(
    mut samples: Vec<ValidationResultDetails>,
    max: usize,
) -> Vec<ValidationResultDetails> {
    samples.sort_by_key(|sample| (sample.line_number.is_none(), sample.line_number));
    samples.truncate(max);
    samples
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RowType;
    use proptest::prelude::*;

    fn data_file() -> TabularDataFile {
        TabularDataFile::new(
            "occurrence.txt",
            RowType::occurrence(),
            vec!["id".to_string(), "country".to_string(), "year".to_string()],
        )
        .with_num_of_lines(101)
        .with_record_identifier(0)
    }

    fn mismatch(line: Option<u64>) -> RecordEvaluationResult {
        RecordEvaluationResult::builder()
            .with_line_number(line)
            .add_base_detail(EvaluationType::ColumnMismatch, None, None)
            .build()
    }

    fn row(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn sample(line: Option<u64>) -> ValidationResultDetails {
        ValidationResultDetails {
            line_number: line,
            record_id: None,
            expected: None,
            found: None,
            related_data: None,
        }
    }

    #[test]
    fn test_merge_of_nothing_is_none() {
        assert!(merge_and_get_result(&data_file(), "occurrence.txt", vec![]).is_none());
    }

    #[test]
    fn test_merge_sums_and_orders_terms() {
        let first = ExclusiveCollectorGroup::new(data_file().columns, 10);
        first.collect_metrics(&row(&["1", "CA", ""]));
        first.collect_result(&mismatch(Some(2)));

        let second = SharedCollectorGroup::new(data_file().columns, 10);
        second.collect_metrics(&row(&["2", "", "1999"]));
        second.collect_result(&mismatch(Some(40)));

        let element = merge_and_get_result(
            &data_file(),
            "occurrence.txt",
            vec![first.into_snapshot(), second.into_snapshot()],
        )
        .unwrap();

        assert_eq!(
            element.term_frequency,
            vec![
                ("id".to_string(), 2),
                ("country".to_string(), 1),
                ("year".to_string(), 1)
            ]
        );
        assert_eq!(element.issue_counts[&EvaluationType::ColumnMismatch], 2);
        assert_eq!(element.number_of_lines, 101);
        assert_eq!(element.id_term.as_deref(), Some("id"));
    }

    #[test]
    fn test_missing_terms_count_zero() {
        let group = ExclusiveCollectorGroup::new(data_file().columns, 10);
        let element =
            merge_and_get_result(&data_file(), "occurrence.txt", vec![group.into_snapshot()])
                .unwrap();
        assert!(element.term_frequency.iter().all(|(_, count)| *count == 0));
        assert_eq!(element.term_frequency.len(), 3);
    }

    #[test]
    fn test_single_shard_merge_is_identity() {
        let group = ExclusiveCollectorGroup::new(data_file().columns, 3)
            .with_interpreted_terms(vec!["year".to_string()]);
        for line in [9, 3, 5, 1] {
            group.collect_result(&mismatch(Some(line)));
        }
        let snapshot = group.snapshot();
        let element =
            merge_and_get_result(&data_file(), "occurrence.txt", vec![snapshot.clone()])
                .unwrap();

        assert_eq!(element.issue_counts, snapshot.issue_counts);
        // First three arrivals, re-sorted by line
        let lines: Vec<_> = element.issue_samples[&EvaluationType::ColumnMismatch]
            .iter()
            .map(|s| s.line_number)
            .collect();
        assert_eq!(lines, vec![Some(3), Some(5), Some(9)]);
    }

    #[test]
    fn test_merge_bound_comes_from_snapshots() {
        let shards: Vec<GroupSnapshot> = [vec![8, 4], vec![6, 2, 10]]
            .into_iter()
            .map(|lines| {
                let group = SharedCollectorGroup::new(data_file().columns, 2);
                for line in lines {
                    group.collect_result(&mismatch(Some(line)));
                }
                group.into_snapshot()
            })
            .collect();
        assert!(shards.iter().all(|shard| shard.max_number_of_sample == 2));

        let element = merge_and_get_result(&data_file(), "occurrence.txt", shards).unwrap();
        assert_eq!(element.issue_counts[&EvaluationType::ColumnMismatch], 5);
        let lines: Vec<_> = element.issue_samples[&EvaluationType::ColumnMismatch]
            .iter()
            .map(|s| s.line_number)
            .collect();
        assert_eq!(lines, vec![Some(2), Some(4)]);
    }

    #[test]
    fn test_resample_puts_missing_lines_last() {
        let samples = vec![sample(None), sample(Some(7)), sample(Some(2)), sample(None)];
        let lines: Vec<_> = resample(samples, 10)
            .into_iter()
            .map(|s| s.line_number)
            .collect();
        assert_eq!(lines, vec![Some(2), Some(7), None, None]);
    }

    #[test]
    fn test_shared_group_snapshot_during_collection() {
        let group = std::sync::Arc::new(SharedCollectorGroup::new(data_file().columns, 10));
        let writer = {
            let group = std::sync::Arc::clone(&group);
            std::thread::spawn(move || {
                for line in 0..500 {
                    group.collect_result(&mismatch(Some(line)));
                }
            })
        };
        let partial = group.snapshot();
        writer.join().unwrap();

        let partial_count = partial
            .issue_counts
            .get(&EvaluationType::ColumnMismatch)
            .copied()
            .unwrap_or(0);
        assert!(partial_count <= 500);
        assert_eq!(group.snapshot().issue_counts[&EvaluationType::ColumnMismatch], 500);
    }

    proptest! {
        #[test]
        fn prop_merge_counts_are_additive(
            shard_lines in prop::collection::vec(prop::collection::vec(0u64..10_000, 0..40), 1..6),
            max in 1usize..15,
        ) {
            let shards: Vec<GroupSnapshot> = shard_lines
                .iter()
                .map(|lines| {
                    let group = ExclusiveCollectorGroup::new(data_file().columns, max);
                    for line in lines {
                        group.collect_result(&mismatch(Some(*line)));
                    }
                    group.into_snapshot()
                })
                .collect();
            let expected: u64 = shard_lines.iter().map(|lines| lines.len() as u64).sum();

            let element = merge_and_get_result(&data_file(), "occurrence.txt", shards).unwrap();
            let merged = element.issue_counts.get(&EvaluationType::ColumnMismatch).copied().unwrap_or(0);
            prop_assert_eq!(merged, expected);

            let samples = element
                .issue_samples
                .get(&EvaluationType::ColumnMismatch)
                .cloned()
                .unwrap_or_default();
            prop_assert!(samples.len() <= max);
            prop_assert!(samples.windows(2).all(|w| w[0].line_number <= w[1].line_number));
        }
    }
}
