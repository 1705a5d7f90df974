//! Evaluation types and per-record evaluation results.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::RowType;

/// Broad grouping of evaluation types, used to organise reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EvaluationCategory {
    /// Problems with the packaging or layout of the resource itself
    ResourceStructure,
    /// Problems with the shape of individual records
    RecordStructure,
    /// Problems with the dataset metadata document
    MetadataContent,
    /// Problems spanning several records or files
    RecordIntegrity,
    /// Values that could not be interpreted against their term definition
    OccurrenceInterpretation,
}

/// Kind of issue an evaluator can report.
///
/// The catalog is open: evaluators outside this crate can report their own
/// kinds through [`EvaluationType::custom`]. Serialized as a
/// SCREAMING_SNAKE_CASE string so it can be used as a JSON map key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EvaluationType {
    /// A record does not have the number of columns declared by the file
    ColumnMismatch,
    /// An extension record points to a core identifier that does not exist
    RecordReferentialIntegrityViolation,
    /// An identifier value is shared by more than one record
    RecordNotUniquelyIdentified,
    /// The same term is mapped to more than one column
    DuplicatedTerm,
    /// Unreadable part of the resource
    UnreadableSectionError,
    LicenseMissingOrUnknown,
    TitleMissingOrTooShort,
    DescriptionMissingOrTooShort,
    ResourceContactsMissingOrIncomplete,
    BasisOfRecordInvalid,
    CountryCodeInvalid,
    /// A coordinate is not a number
    CoordinateInvalid,
    CoordinateOutOfRange,
    RecordedDateInvalid,
    IndividualCountInvalid,
    /// Issue kind contributed by an evaluator outside the built-in catalog
    Other(CustomEvaluationType),
}

/// Name of an evaluation type outside the built-in catalog. Never one of the
/// built-in names, so that names parse back to the same type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CustomEvaluationType(String);

impl CustomEvaluationType {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl EvaluationType {
    /// Returns the canonical name of this evaluation type.
    pub fn as_str(&self) -> &str {
        match self {
            Self::ColumnMismatch => "COLUMN_MISMATCH",
            Self::RecordReferentialIntegrityViolation => "RECORD_REFERENTIAL_INTEGRITY_VIOLATION",
            Self::RecordNotUniquelyIdentified => "RECORD_NOT_UNIQUELY_IDENTIFIED",
            Self::DuplicatedTerm => "DUPLICATED_TERM",
            Self::UnreadableSectionError => "UNREADABLE_SECTION_ERROR",
            Self::LicenseMissingOrUnknown => "LICENSE_MISSING_OR_UNKNOWN",
            Self::TitleMissingOrTooShort => "TITLE_MISSING_OR_TOO_SHORT",
            Self::DescriptionMissingOrTooShort => "DESCRIPTION_MISSING_OR_TOO_SHORT",
            Self::ResourceContactsMissingOrIncomplete => "RESOURCE_CONTACTS_MISSING_OR_INCOMPLETE",
            Self::BasisOfRecordInvalid => "BASIS_OF_RECORD_INVALID",
            Self::CountryCodeInvalid => "COUNTRY_CODE_INVALID",
            Self::CoordinateInvalid => "COORDINATE_INVALID",
            Self::CoordinateOutOfRange => "COORDINATE_OUT_OF_RANGE",
            Self::RecordedDateInvalid => "RECORDED_DATE_INVALID",
            Self::IndividualCountInvalid => "INDIVIDUAL_COUNT_INVALID",
            Self::Other(name) => name.as_str(),
        }
    }

    /// Evaluation type named `name`. Built-in names resolve to their variant.
    pub fn custom(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::builtin(&name).unwrap_or_else(|| Self::Other(CustomEvaluationType(name)))
    }

    fn builtin(name: &str) -> Option<Self> {
        Some(match name {
            "COLUMN_MISMATCH" => Self::ColumnMismatch,
            "RECORD_REFERENTIAL_INTEGRITY_VIOLATION" => Self::RecordReferentialIntegrityViolation,
            "RECORD_NOT_UNIQUELY_IDENTIFIED" => Self::RecordNotUniquelyIdentified,
            "DUPLICATED_TERM" => Self::DuplicatedTerm,
            "UNREADABLE_SECTION_ERROR" => Self::UnreadableSectionError,
            "LICENSE_MISSING_OR_UNKNOWN" => Self::LicenseMissingOrUnknown,
            "TITLE_MISSING_OR_TOO_SHORT" => Self::TitleMissingOrTooShort,
            "DESCRIPTION_MISSING_OR_TOO_SHORT" => Self::DescriptionMissingOrTooShort,
            "RESOURCE_CONTACTS_MISSING_OR_INCOMPLETE" => Self::ResourceContactsMissingOrIncomplete,
            "BASIS_OF_RECORD_INVALID" => Self::BasisOfRecordInvalid,
            "COUNTRY_CODE_INVALID" => Self::CountryCodeInvalid,
            "COORDINATE_INVALID" => Self::CoordinateInvalid,
            "COORDINATE_OUT_OF_RANGE" => Self::CoordinateOutOfRange,
            "RECORDED_DATE_INVALID" => Self::RecordedDateInvalid,
            "INDIVIDUAL_COUNT_INVALID" => Self::IndividualCountInvalid,
            _ => return None,
        })
    }

    /// Returns the category this evaluation type belongs to.
    pub fn category(&self) -> EvaluationCategory {
        match self {
            Self::DuplicatedTerm | Self::UnreadableSectionError => {
                EvaluationCategory::ResourceStructure
            }
            Self::ColumnMismatch | Self::Other(_) => EvaluationCategory::RecordStructure,
            Self::RecordReferentialIntegrityViolation | Self::RecordNotUniquelyIdentified => {
                EvaluationCategory::RecordIntegrity
            }
            Self::LicenseMissingOrUnknown
            | Self::TitleMissingOrTooShort
            | Self::DescriptionMissingOrTooShort
            | Self::ResourceContactsMissingOrIncomplete => EvaluationCategory::MetadataContent,
            Self::BasisOfRecordInvalid
            | Self::CountryCodeInvalid
            | Self::CoordinateInvalid
            | Self::CoordinateOutOfRange
            | Self::RecordedDateInvalid
            | Self::IndividualCountInvalid => EvaluationCategory::OccurrenceInterpretation,
        }
    }
}

impl fmt::Display for EvaluationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EvaluationType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::custom(s))
    }
}

impl Serialize for EvaluationType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EvaluationType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Ok(Self::custom(name))
    }
}

/// One issue found on one record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationDetail {
    pub evaluation_type: EvaluationType,
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

/// The result of evaluating a single record. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordEvaluationResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    record_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    line_number: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    row_type: Option<RowType>,
    details: Vec<EvaluationDetail>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    interpreted_data: BTreeMap<String, serde_json::Value>,
}

impl RecordEvaluationResult {
    /// Starts a new result accumulator.
    pub fn builder() -> RecordEvaluationResultBuilder {
        RecordEvaluationResultBuilder::default()
    }

    pub fn record_id(&self) -> Option<&str> {
        self.record_id.as_deref()
    }

    pub fn line_number(&self) -> Option<u64> {
        self.line_number
    }

    pub fn row_type(&self) -> Option<&RowType> {
        self.row_type.as_ref()
    }

    pub fn details(&self) -> &[EvaluationDetail] {
        &self.details
    }

    /// Interpreted values keyed by field name.
    pub fn interpreted_data(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.interpreted_data
    }

    /// Merges two results for the same record.
    ///
    /// The identifiers of `first` win; the details of `second` are appended
    /// after those of `first`. If one side is absent the other is returned.
    pub fn merge(first: Option<Self>, second: Option<Self>) -> Option<Self> {
        match (first, second) {
            (None, other) | (other, None) => other,
            (Some(first), Some(second)) => Some(
                RecordEvaluationResultBuilder::from_existing(first)
                    .add_details(second.details)
                    .extend_interpreted_data(second.interpreted_data)
                    .build(),
            ),
        }
    }
}

/// Accumulates the details of one record before freezing them into a
/// [`RecordEvaluationResult`].
///
/// Details added through the `add_*` methods inherit the line number and
/// record id set on the builder at the time they are added.
#[derive(Debug, Default)]
pub struct RecordEvaluationResultBuilder {
    line_number: Option<u64>,
    record_id: Option<String>,
    row_type: Option<RowType>,
    details: Vec<EvaluationDetail>,
    interpreted_data: BTreeMap<String, serde_json::Value>,
}

impl RecordEvaluationResultBuilder {
    /// Seeds a builder with the content of an existing result.
    pub fn from_existing(result: RecordEvaluationResult) -> Self {
        Self {
            line_number: result.line_number,
            record_id: result.record_id,
            row_type: result.row_type,
            details: result.details,
            interpreted_data: result.interpreted_data,
        }
    }

    pub fn with_line_number(mut self, line_number: Option<u64>) -> Self {
        self.line_number = line_number;
        self
    }

    pub fn with_record_id(mut self, record_id: Option<impl Into<String>>) -> Self {
        self.record_id = record_id.map(Into::into);
        self
    }

    pub fn with_row_type(mut self, row_type: RowType) -> Self {
        self.row_type = Some(row_type);
        self
    }

    pub fn with_interpreted_value(
        mut self,
        field: impl Into<String>,
        value: serde_json::Value,
    ) -> Self {
        self.interpreted_data.insert(field.into(), value);
        self
    }

    fn extend_interpreted_data(mut self, data: BTreeMap<String, serde_json::Value>) -> Self {
        for (field, value) in data {
            self.interpreted_data.entry(field).or_insert(value);
        }
        self
    }

    /// Adds a detail in the form expected/found.
    pub fn add_base_detail(
        mut self,
        evaluation_type: EvaluationType,
        expected: Option<String>,
        found: Option<String>,
    ) -> Self {
        self.details.push(EvaluationDetail {
            evaluation_type,
            line_number: self.line_number,
            record_id: self.record_id.clone(),
            expected,
            found,
            related_data: None,
        });
        self
    }

    /// Adds a detail describing an interpretation problem and the data involved.
    pub fn add_interpretation_detail(
        mut self,
        evaluation_type: EvaluationType,
        related_data: BTreeMap<String, String>,
    ) -> Self {
        self.details.push(EvaluationDetail {
            evaluation_type,
            line_number: self.line_number,
            record_id: self.record_id.clone(),
            expected: None,
            found: None,
            related_data: Some(related_data),
        });
        self
    }

    /// Appends already-built details as they are.
    pub fn add_details(mut self, details: impl IntoIterator<Item = EvaluationDetail>) -> Self {
        self.details.extend(details);
        self
    }

    pub fn has_details(&self) -> bool {
        !self.details.is_empty()
    }

    pub fn build(self) -> RecordEvaluationResult {
        RecordEvaluationResult {
            record_id: self.record_id,
            line_number: self.line_number,
            row_type: self.row_type,
            details: self.details,
            interpreted_data: self.interpreted_data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mismatch(line: u64) -> RecordEvaluationResult {
        RecordEvaluationResult::builder()
            .with_line_number(Some(line))
            .add_base_detail(
                EvaluationType::ColumnMismatch,
                Some("3".to_string()),
                Some("2".to_string()),
            )
            .build()
    }

    #[test]
    fn test_builder_details_inherit_identifiers() {
        let result = RecordEvaluationResult::builder()
            .with_line_number(Some(7))
            .with_record_id(Some("occ-1"))
            .add_base_detail(EvaluationType::ColumnMismatch, None, None)
            .build();

        let detail = &result.details()[0];
        assert_eq!(detail.line_number, Some(7));
        assert_eq!(detail.record_id.as_deref(), Some("occ-1"));
        assert_eq!(result.record_id(), Some("occ-1"));
    }

    #[test]
    fn test_merge_appends_second_details() {
        let first = mismatch(3);
        let second = RecordEvaluationResult::builder()
            .with_record_id(Some("other"))
            .add_base_detail(EvaluationType::RecordNotUniquelyIdentified, None, None)
            .build();

        let merged = RecordEvaluationResult::merge(Some(first), Some(second)).unwrap();
        assert_eq!(merged.details().len(), 2);
        assert_eq!(merged.details()[0].evaluation_type, EvaluationType::ColumnMismatch);
        assert_eq!(
            merged.details()[1].evaluation_type,
            EvaluationType::RecordNotUniquelyIdentified
        );
        assert_eq!(merged.line_number(), Some(3));
        assert_eq!(merged.record_id(), None);
    }

    #[test]
    fn test_merge_with_absent_side() {
        assert_eq!(RecordEvaluationResult::merge(None, None), None);
        assert_eq!(
            RecordEvaluationResult::merge(Some(mismatch(1)), None),
            Some(mismatch(1))
        );
        assert_eq!(
            RecordEvaluationResult::merge(None, Some(mismatch(2))),
            Some(mismatch(2))
        );
    }

    #[test]
    fn test_evaluation_type_names_round_trip() {
        for ty in [
            EvaluationType::ColumnMismatch,
            EvaluationType::RecordReferentialIntegrityViolation,
            EvaluationType::LicenseMissingOrUnknown,
            EvaluationType::CoordinateOutOfRange,
            EvaluationType::custom("GEODETIC_DATUM_INVALID"),
        ] {
            let parsed: EvaluationType = ty.as_str().parse().unwrap();
            assert_eq!(parsed, ty);
        }
    }

    #[test]
    fn test_custom_type_never_shadows_builtin_name() {
        let custom = EvaluationType::custom("COLUMN_MISMATCH");
        assert_eq!(custom, EvaluationType::ColumnMismatch);

        let custom = EvaluationType::custom("EMPTY_VALUE");
        assert!(matches!(custom, EvaluationType::Other(_)));
        assert_eq!(custom.to_string().parse::<EvaluationType>().unwrap(), custom);
    }

    #[test]
    fn test_evaluation_type_as_json_map_key() {
        let mut counts = BTreeMap::new();
        counts.insert(EvaluationType::ColumnMismatch, 4u64);
        let json = serde_json::to_string(&counts).unwrap();
        assert_eq!(json, r#"{"COLUMN_MISMATCH":4}"#);

        let back: BTreeMap<EvaluationType, u64> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, counts);
    }

    #[test]
    fn test_categories() {
        assert_eq!(
            EvaluationType::RecordNotUniquelyIdentified.category(),
            EvaluationCategory::RecordIntegrity
        );
        assert_eq!(
            EvaluationType::TitleMissingOrTooShort.category(),
            EvaluationCategory::MetadataContent
        );
        assert_eq!(
            EvaluationType::CountryCodeInvalid.category(),
            EvaluationCategory::OccurrenceInterpretation
        );
    }
}
