//! Evaluators producing [`RecordEvaluationResult`]s.
//!
//! Two contracts are defined here:
//!
//! - [`RecordEvaluator`] looks at one record at a time and is run on every
//!   shard of a file. [`InterpretationEvaluator`] also attaches interpreted
//!   values to the records it looks at.
//! - [`RecordCollectionEvaluator`] looks at whole files of a prepared dataset
//!   and reports relationships between records, such as duplicated
//!   identifiers or dangling references from an extension to the core.

use std::fmt::{self, Debug};

use crate::error::Result;
use crate::model::{DwcDataFile, RecordEvaluationResult, RowType};

mod chain;
mod diff;
mod interpretation;
mod metadata;
mod referential_integrity;
mod structure;
mod uniqueness;

pub use chain::EvaluatorChain;
pub use diff::{ColumnDiff, HashJoinColumnDiff};
pub use interpretation::{
    InterpretationEvaluator, OccurrenceIssue, BASIS_OF_RECORD_VOCABULARY, INTERPRETED_TERMS,
    MIN_LIKELY_YEAR,
};
pub use metadata::{MetadataEvaluator, KNOWN_LICENSES, MIN_TEXT_LENGTH};
pub use referential_integrity::ReferentialIntegrityEvaluator;
pub use structure::RecordStructureEvaluator;
pub use uniqueness::UniquenessEvaluator;

/// Evaluates a single record.
pub trait RecordEvaluator: Debug + Send + Sync {
    /// Returns a result when the record has at least one issue.
    fn evaluate(&self, line_number: Option<u64>, record: &[String])
        -> Option<RecordEvaluationResult>;

    /// Returns the name of this evaluator.
    fn name(&self) -> &str;
}

/// Outcome of a [`RecordCollectionEvaluator`].
pub enum CollectionEvaluation {
    /// The dataset lacks something the evaluator needs. Not an issue.
    NotApplicable(String),
    /// Lazily produced results.
    Applicable(Box<dyn Iterator<Item = RecordEvaluationResult> + Send>),
}

impl CollectionEvaluation {
    pub fn applicable<I>(results: I) -> Self
    where
        I: IntoIterator<Item = RecordEvaluationResult>,
        I::IntoIter: Send + 'static,
    {
        Self::Applicable(Box::new(results.into_iter()))
    }

    pub fn is_applicable(&self) -> bool {
        matches!(self, Self::Applicable(_))
    }

    /// Drains the results, yielding nothing when not applicable.
    pub fn into_results(self) -> Box<dyn Iterator<Item = RecordEvaluationResult> + Send> {
        match self {
            Self::Applicable(results) => results,
            Self::NotApplicable(_) => Box::new(std::iter::empty()),
        }
    }
}

impl Debug for CollectionEvaluation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotApplicable(reason) => f.debug_tuple("NotApplicable").field(reason).finish(),
            Self::Applicable(_) => f.write_str("Applicable(..)"),
        }
    }
}

/// Evaluates relationships between the records of a prepared dataset.
///
/// Implementations read files and may take a while; callers run them on a
/// blocking thread.
pub trait RecordCollectionEvaluator: Debug + Send + Sync {
    fn evaluate(&self, dataset: &DwcDataFile) -> Result<CollectionEvaluation>;

    /// Row type of the file the results belong to.
    fn row_type(&self) -> &RowType;

    /// Returns the name of this evaluator.
    fn name(&self) -> &str;
}
