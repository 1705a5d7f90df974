use std::collections::BTreeMap;

use crate::model::RecordEvaluationResult;

use super::counter::{CollectorMode, KeyedCounter};

/// Counts, for a fixed set of terms, the records whose interpreted value is
/// present and not null.
pub struct InterpretedTermsCountCollector<M: CollectorMode> {
    terms: Vec<String>,
    counts: M::Counter<String>,
}

impl<M: CollectorMode> InterpretedTermsCountCollector<M> {
    pub fn new(terms: Vec<String>) -> Self {
        Self {
            terms,
            counts: Default::default(),
        }
    }

    pub fn collect(&self, result: &RecordEvaluationResult) {
        let data = result.interpreted_data();
        if data.is_empty() {
            return;
        }
        for term in &self.terms {
            if data.get(term).is_some_and(|value| !value.is_null()) {
                self.counts.increment(term.clone());
            }
        }
    }

    pub fn interpreted_term_counts(&self) -> BTreeMap<String, u64> {
        self.counts.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::Shared;
    use serde_json::json;

    #[test]
    fn test_counts_only_tracked_non_null_terms() {
        let collector = InterpretedTermsCountCollector::<Shared>::new(vec![
            "decimalLatitude".to_string(),
            "year".to_string(),
        ]);
        let result = RecordEvaluationResult::builder()
            .with_interpreted_value("decimalLatitude", json!(45.5))
            .with_interpreted_value("year", serde_json::Value::Null)
            .with_interpreted_value("country", json!("CA"))
            .build();
        collector.collect(&result);
        collector.collect(&result);

        let counts = collector.interpreted_term_counts();
        assert_eq!(counts.get("decimalLatitude"), Some(&2));
        assert_eq!(counts.get("year"), None);
        assert_eq!(counts.get("country"), None);
    }
}
