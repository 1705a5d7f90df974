//! Result aggregation.
//!
//! Each shard of a file owns a [`CollectorGroup`]: issue counts with bounded
//! samples, per-column value frequency and, optionally, interpreted-term
//! counts. When every shard is done, [`merge_and_get_result`] folds the group
//! snapshots into one [`ValidationResultElement`](crate::model::ValidationResultElement).
//!
//! ## Example
//!
//! ```rust
//! use dwc_guard::collector::{merge_and_get_result, ExclusiveCollectorGroup};
//! use dwc_guard::model::{EvaluationType, RecordEvaluationResult, RowType, TabularDataFile};
//!
//! let file = TabularDataFile::new("occurrence.txt", RowType::occurrence(), vec!["id".into()])
//!     .with_num_of_lines(3);
//! let group = ExclusiveCollectorGroup::new(file.columns.clone(), 10);
//! group.collect_metrics(&["occ-1".to_string()]);
//! group.collect_result(
//!     &RecordEvaluationResult::builder()
//!         .with_line_number(Some(2))
//!         .add_base_detail(EvaluationType::ColumnMismatch, None, None)
//!         .build(),
//! );
//!
//! let element = merge_and_get_result(&file, "occurrence.txt", vec![group.into_snapshot()])
//!     .unwrap();
//! assert!(element.contains(&EvaluationType::ColumnMismatch));
//! ```

use std::collections::BTreeMap;

use crate::model::{EvaluationType, RecordEvaluationResult, ValidationResultDetails};

mod counter;
mod group;
mod interpreted;
mod metrics;
mod results;

pub use counter::{
    BoundedSamples, CollectorKey, CollectorMode, Exclusive, ExclusiveCounter, ExclusiveSamples,
    KeyedCounter, Shared, SharedCounter, SharedSamples,
};
pub use group::{
    merge_and_get_result, resample, CollectorGroup, ExclusiveCollectorGroup, GroupSnapshot,
    SharedCollectorGroup,
};
pub use interpreted::InterpretedTermsCountCollector;
pub use metrics::TermsFrequencyCollector;
pub use results::{RecordEvaluationResultCollector, DEFAULT_MAX_NUMBER_OF_SAMPLE};

/// Accumulates evaluation results of one shard.
pub trait ResultsCollector {
    fn collect(&self, result: &RecordEvaluationResult);

    /// Issue counts keyed by evaluation type.
    fn aggregated_counts(&self) -> BTreeMap<EvaluationType, u64>;

    /// Kept samples keyed by evaluation type.
    fn samples(&self) -> BTreeMap<EvaluationType, Vec<ValidationResultDetails>>;
}

/// Accumulates statistics over raw records of one shard.
pub trait MetricsCollector {
    fn collect(&self, record: &[String]);

    fn term_frequency(&self) -> BTreeMap<String, u64>;
}
