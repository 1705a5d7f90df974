use std::collections::BTreeMap;

use super::counter::{CollectorMode, KeyedCounter};
use super::MetricsCollector;

/// Counts, per declared column, the records holding a non-blank value.
///
/// Counting is done by column position; names are only attached when a
/// snapshot is taken, so a term mapped to two columns reports their sum.
/// Values beyond the declared columns are ignored.
pub struct TermsFrequencyCollector<M: CollectorMode> {
    columns: Vec<String>,
    counts: M::Counter<usize>,
}

impl<M: CollectorMode> TermsFrequencyCollector<M> {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            counts: Default::default(),
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }
}

impl<M: CollectorMode> MetricsCollector for TermsFrequencyCollector<M> {
    fn collect(&self, record: &[String]) {
        for (index, value) in record.iter().enumerate().take(self.columns.len()) {
            if !value.trim().is_empty() {
                self.counts.increment(index);
            }
        }
    }

    fn term_frequency(&self) -> BTreeMap<String, u64> {
        let mut frequency = BTreeMap::new();
        for (index, count) in self.counts.snapshot() {
            if let Some(column) = self.columns.get(index) {
                *frequency.entry(column.clone()).or_insert(0) += count;
            }
        }
        frequency
    }
}
