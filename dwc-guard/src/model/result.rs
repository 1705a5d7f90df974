//! Report types produced by the merge stage.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{DwcFileType, EvaluationCategory, EvaluationType, FileFormat, RowType};

/// One sampled occurrence of an issue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResultDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_number: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub found: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub related_data: Option<BTreeMap<String, String>>,
}

/// Count and samples of one evaluation type, as shown to a reviewer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationIssue {
    pub issue: EvaluationType,
    pub issue_category: EvaluationCategory,
    pub count: u64,
    pub sample: Vec<ValidationResultDetails>,
}

/// The merged report of one logical file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResultElement {
    pub file_name: String,
    pub number_of_lines: u64,
    pub file_type: DwcFileType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_type: Option<RowType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_term: Option<String>,
    pub issue_counts: BTreeMap<EvaluationType, u64>,
    pub issue_samples: BTreeMap<EvaluationType, Vec<ValidationResultDetails>>,
    /// Non-blank value counts per field, in declared column order
    pub term_frequency: Vec<(String, u64)>,
    pub interpreted_term_counts: BTreeMap<String, u64>,
}

impl ValidationResultElement {
    /// Builds the element reporting issues found in the metadata document.
    pub fn for_metadata(file_name: impl Into<String>, issues: Vec<EvaluationType>) -> Self {
        let mut issue_counts = BTreeMap::new();
        for issue in issues {
            *issue_counts.entry(issue).or_insert(0) += 1;
        }
        Self {
            file_name: file_name.into(),
            number_of_lines: 0,
            file_type: DwcFileType::Metadata,
            row_type: None,
            id_term: None,
            issue_counts,
            issue_samples: BTreeMap::new(),
            term_frequency: Vec::new(),
            interpreted_term_counts: BTreeMap::new(),
        }
    }

    /// Returns true if at least one issue of `evaluation_type` was counted.
    pub fn contains(&self, evaluation_type: &EvaluationType) -> bool {
        self.issue_counts
            .get(evaluation_type)
            .is_some_and(|count| *count > 0)
    }

    /// Issues of this file, ordered by category then type.
    pub fn issues(&self) -> Vec<ValidationIssue> {
        let mut issues: Vec<ValidationIssue> = self
            .issue_counts
            .iter()
            .map(|(issue, count)| ValidationIssue {
                issue: issue.clone(),
                issue_category: issue.category(),
                count: *count,
                sample: self.issue_samples.get(issue).cloned().unwrap_or_default(),
            })
            .collect();
        issues.sort_by(|a, b| {
            a.issue_category
                .cmp(&b.issue_category)
                .then_with(|| a.issue.cmp(&b.issue))
        });
        issues
    }

    /// Frequency of one field, if it is a declared column.
    pub fn term_count(&self, term: &str) -> Option<u64> {
        self.term_frequency
            .iter()
            .find(|(name, _)| name == term)
            .map(|(_, count)| *count)
    }
}

/// Final result of a validation job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub source_file_name: String,
    pub file_format: FileFormat,
    /// True when nothing prevents the resource from being indexed
    pub indexeable: bool,
    pub results: Vec<ValidationResultElement>,
}

impl ValidationResult {
    pub fn new(
        source_file_name: impl Into<String>,
        file_format: FileFormat,
        results: Vec<ValidationResultElement>,
    ) -> Self {
        let indexeable = !results.iter().any(|element| {
            element
                .issue_counts
                .keys()
                .any(|issue| issue.category() == EvaluationCategory::ResourceStructure)
        });
        Self {
            source_file_name: source_file_name.into(),
            file_format,
            indexeable,
            results,
        }
    }

    /// Element reporting on the file holding `row_type`.
    pub fn element_for(&self, row_type: &RowType) -> Option<&ValidationResultElement> {
        self.results
            .iter()
            .find(|element| element.row_type.as_ref() == Some(row_type))
    }
}
