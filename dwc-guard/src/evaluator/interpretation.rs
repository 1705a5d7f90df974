use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde_json::{json, Value};

use crate::model::{
    simple_term, EvaluationType, RecordEvaluationResult, RowType, TabularDataFile,
};

use super::RecordEvaluator;

/// Terms interpreted by [`InterpretationEvaluator`], also the default
/// interpreted terms counted by the pipeline.
pub const INTERPRETED_TERMS: &[&str] = &[
    "basisOfRecord",
    "countryCode",
    "decimalLatitude",
    "decimalLongitude",
    "eventDate",
    "individualCount",
];

/// Accepted `basisOfRecord` values, compared without case or separators.
pub const BASIS_OF_RECORD_VOCABULARY: &[&str] = &[
    "PreservedSpecimen",
    "FossilSpecimen",
    "LivingSpecimen",
    "MaterialSample",
    "MaterialCitation",
    "Observation",
    "HumanObservation",
    "MachineObservation",
    "Occurrence",
];

/// Earliest year an event date is considered likely.
pub const MIN_LIKELY_YEAR: i32 = 1600;

/// Problems raised while interpreting occurrence values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OccurrenceIssue {
    BasisOfRecordInvalid,
    CountryInvalid,
    CoordinateInvalid,
    CoordinateOutOfRange,
    RecordedDateInvalid,
    /// Parsable date before [`MIN_LIKELY_YEAR`] or in the future
    RecordedDateUnlikely,
    IndividualCountInvalid,
}

impl OccurrenceIssue {
    pub const ALL: [OccurrenceIssue; 7] = [
        Self::BasisOfRecordInvalid,
        Self::CountryInvalid,
        Self::CoordinateInvalid,
        Self::CoordinateOutOfRange,
        Self::RecordedDateInvalid,
        Self::RecordedDateUnlikely,
        Self::IndividualCountInvalid,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BasisOfRecordInvalid => "BASIS_OF_RECORD_INVALID",
            Self::CountryInvalid => "COUNTRY_INVALID",
            Self::CoordinateInvalid => "COORDINATE_INVALID",
            Self::CoordinateOutOfRange => "COORDINATE_OUT_OF_RANGE",
            Self::RecordedDateInvalid => "RECORDED_DATE_INVALID",
            Self::RecordedDateUnlikely => "RECORDED_DATE_UNLIKELY",
            Self::IndividualCountInvalid => "INDIVIDUAL_COUNT_INVALID",
        }
    }

    /// The evaluation type an issue is reported under.
    pub fn evaluation_type(&self) -> EvaluationType {
        match self {
            Self::BasisOfRecordInvalid => EvaluationType::BasisOfRecordInvalid,
            Self::CountryInvalid => EvaluationType::CountryCodeInvalid,
            Self::CoordinateInvalid => EvaluationType::CoordinateInvalid,
            Self::CoordinateOutOfRange => EvaluationType::CoordinateOutOfRange,
            Self::RecordedDateInvalid | Self::RecordedDateUnlikely => {
                EvaluationType::RecordedDateInvalid
            }
            Self::IndividualCountInvalid => EvaluationType::IndividualCountInvalid,
        }
    }
}

impl fmt::Display for OccurrenceIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Interpreted value of a term, or the issue that prevented it.
type Interpretation = std::result::Result<Value, OccurrenceIssue>;

/// Interprets the occurrence terms of [`INTERPRETED_TERMS`] present in a file.
///
/// Interpreted values are attached to the record result; values that cannot
/// be interpreted raise an [`OccurrenceIssue`] reported under its mapped
/// [`EvaluationType`], with the offending term and raw value as related data.
/// Blank values are ignored.
#[derive(Debug, Clone)]
pub struct InterpretationEvaluator {
    row_type: RowType,
    /// (term, column index) for every interpreted term found in the file
    columns: Vec<(&'static str, usize)>,
    id_index: Option<usize>,
}

impl InterpretationEvaluator {
    /// Builds an evaluator for `file`. Returns `None` when the file holds no
    /// occurrences or none of the interpreted terms.
    pub fn for_file(file: &TabularDataFile) -> Option<Self> {
        if file.row_type != RowType::occurrence() {
            return None;
        }
        let columns: Vec<(&'static str, usize)> = INTERPRETED_TERMS
            .iter()
            .filter_map(|term| {
                file.columns
                    .iter()
                    .position(|column| simple_term(column).eq_ignore_ascii_case(term))
                    .map(|index| (*term, index))
            })
            .collect();
        if columns.is_empty() {
            return None;
        }
        Some(Self {
            row_type: file.row_type.clone(),
            columns,
            id_index: file.record_identifier.as_ref().map(|id| id.index),
        })
    }

    pub fn terms(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.columns.iter().map(|(term, _)| *term)
    }
}

impl RecordEvaluator for InterpretationEvaluator {
    fn evaluate(
        &self,
        line_number: Option<u64>,
        record: &[String],
    ) -> Option<RecordEvaluationResult> {
        let record_id = self
            .id_index
            .and_then(|index| record.get(index))
            .filter(|value| !value.trim().is_empty())
            .cloned();
        let mut builder = RecordEvaluationResult::builder()
            .with_line_number(line_number)
            .with_record_id(record_id)
            .with_row_type(self.row_type.clone());
        let mut interpreted = false;

        for (term, index) in &self.columns {
            let Some(raw) = record.get(*index).map(|value| value.trim()) else {
                continue;
            };
            if raw.is_empty() {
                continue;
            }
            match interpret(term, raw) {
                Ok(value) => {
                    builder = builder.with_interpreted_value(*term, value);
                    interpreted = true;
                }
                Err(issue) => {
                    let related_data = BTreeMap::from([(term.to_string(), raw.to_string())]);
                    builder = builder.add_interpretation_detail(issue.evaluation_type(), related_data);
                }
            }
        }

        (interpreted || builder.has_details()).then(|| builder.build())
    }

    fn name(&self) -> &str {
        "occurrence_interpretation"
    }
}

fn interpret(term: &str, raw: &str) -> Interpretation {
    match term {
        "basisOfRecord" => basis_of_record(raw),
        "countryCode" => country_code(raw),
        "decimalLatitude" => coordinate(raw, 90.0),
        "decimalLongitude" => coordinate(raw, 180.0),
        "eventDate" => event_date(raw),
        "individualCount" => raw
            .parse::<u32>()
            .map(|count| json!(count))
            .map_err(|_| OccurrenceIssue::IndividualCountInvalid),
        _ => Ok(Value::String(raw.to_string())),
    }
}

fn basis_of_record(raw: &str) -> Interpretation {
    let normalized: String = raw
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .collect();
    BASIS_OF_RECORD_VOCABULARY
        .iter()
        .find(|known| known.eq_ignore_ascii_case(&normalized))
        .map(|known| Value::String(known.to_string()))
        .ok_or(OccurrenceIssue::BasisOfRecordInvalid)
}

fn country_code(raw: &str) -> Interpretation {
    if raw.len() == 2 && raw.chars().all(|c| c.is_ascii_alphabetic()) {
        Ok(Value::String(raw.to_ascii_uppercase()))
    } else {
        Err(OccurrenceIssue::CountryInvalid)
    }
}

fn coordinate(raw: &str, bound: f64) -> Interpretation {
    let value: f64 = raw
        .parse()
        .map_err(|_| OccurrenceIssue::CoordinateInvalid)?;
    if !value.is_finite() {
        return Err(OccurrenceIssue::CoordinateInvalid);
    }
    if value.abs() > bound {
        return Err(OccurrenceIssue::CoordinateOutOfRange);
    }
    Ok(json!(value))
}

/// Accepts `YYYY-MM-DD`, `YYYY-MM`, `YYYY` and RFC 3339 timestamps.
fn event_date(raw: &str) -> Interpretation {
    let date = if let Ok(timestamp) = DateTime::parse_from_rfc3339(raw) {
        timestamp.date_naive()
    } else if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        date
    } else if let Ok(date) = NaiveDate::parse_from_str(&format!("{raw}-01"), "%Y-%m-%d") {
        date
    } else if raw.len() == 4 {
        raw.parse::<i32>()
            .ok()
            .and_then(|year| NaiveDate::from_ymd_opt(year, 1, 1))
            .ok_or(OccurrenceIssue::RecordedDateInvalid)?
    } else {
        return Err(OccurrenceIssue::RecordedDateInvalid);
    };

    if date.year() < MIN_LIKELY_YEAR || date > Utc::now().date_naive() {
        return Err(OccurrenceIssue::RecordedDateUnlikely);
    }
    Ok(Value::String(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EvaluationCategory;

    fn file(columns: &[&str]) -> TabularDataFile {
        TabularDataFile::new(
            "occurrence.txt",
            RowType::occurrence(),
            columns.iter().map(|c| c.to_string()).collect(),
        )
        .with_record_identifier(0)
    }

    fn record(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_every_issue_maps_to_an_interpretation_type() {
        for issue in OccurrenceIssue::ALL {
            assert_eq!(
                issue.evaluation_type().category(),
                EvaluationCategory::OccurrenceInterpretation,
                "{issue}"
            );
        }
        assert_eq!(
            OccurrenceIssue::RecordedDateUnlikely.evaluation_type(),
            EvaluationType::RecordedDateInvalid
        );
    }

    #[test]
    fn test_for_file_needs_occurrence_terms() {
        assert!(InterpretationEvaluator::for_file(&file(&["occurrenceID", "scientificName"])).is_none());

        let identification = TabularDataFile::new(
            "identification.txt",
            RowType::identification(),
            vec!["coreid".to_string(), "countryCode".to_string()],
        );
        assert!(InterpretationEvaluator::for_file(&identification).is_none());

        let evaluator = InterpretationEvaluator::for_file(&file(&[
            "occurrenceID",
            "dwc:countryCode",
            "http://rs.tdwg.org/dwc/terms/decimalLatitude",
        ]))
        .unwrap();
        assert_eq!(
            evaluator.terms().collect::<Vec<_>>(),
            vec!["countryCode", "decimalLatitude"]
        );
    }

    #[test]
    fn test_valid_values_are_interpreted() {
        let evaluator = InterpretationEvaluator::for_file(&file(&[
            "occurrenceID",
            "basisOfRecord",
            "countryCode",
            "decimalLatitude",
            "eventDate",
            "individualCount",
        ]))
        .unwrap();
        let result = evaluator
            .evaluate(
                Some(2),
                &record(&["occ-1", "human observation", "ca", "45.5", "2019-06", "3"]),
            )
            .unwrap();

        assert!(result.details().is_empty());
        let data = result.interpreted_data();
        assert_eq!(data["basisOfRecord"], json!("HumanObservation"));
        assert_eq!(data["countryCode"], json!("CA"));
        assert_eq!(data["decimalLatitude"], json!(45.5));
        assert_eq!(data["eventDate"], json!("2019-06"));
        assert_eq!(data["individualCount"], json!(3));
    }

    #[test]
    fn test_invalid_values_raise_mapped_issues() {
        let evaluator = InterpretationEvaluator::for_file(&file(&[
            "occurrenceID",
            "countryCode",
            "decimalLatitude",
            "decimalLongitude",
            "eventDate",
        ]))
        .unwrap();
        let result = evaluator
            .evaluate(Some(7), &record(&["occ-7", "Canada", "95", "east", "1066-10-14"]))
            .unwrap();

        let types: Vec<_> = result
            .details()
            .iter()
            .map(|detail| detail.evaluation_type.clone())
            .collect();
        assert_eq!(
            types,
            vec![
                EvaluationType::CountryCodeInvalid,
                EvaluationType::CoordinateOutOfRange,
                EvaluationType::CoordinateInvalid,
                EvaluationType::RecordedDateInvalid,
            ]
        );
        let detail = &result.details()[0];
        assert_eq!(detail.line_number, Some(7));
        assert_eq!(detail.record_id.as_deref(), Some("occ-7"));
        assert_eq!(
            detail.related_data.as_ref().and_then(|data| data.get("countryCode")).map(String::as_str),
            Some("Canada")
        );
        assert!(result.interpreted_data().is_empty());
    }

    #[test]
    fn test_blank_values_are_ignored() {
        let evaluator =
            InterpretationEvaluator::for_file(&file(&["occurrenceID", "countryCode"])).unwrap();
        assert!(evaluator.evaluate(Some(2), &record(&["occ-1", "  "])).is_none());
        assert!(evaluator.evaluate(Some(3), &record(&["occ-2"])).is_none());
    }

    #[test]
    fn test_event_date_forms() {
        assert!(event_date("2020-02-29").is_ok());
        assert!(event_date("1998").is_ok());
        assert!(event_date("2001-05-12T10:00:00Z").is_ok());
        assert_eq!(event_date("12/05/2001"), Err(OccurrenceIssue::RecordedDateInvalid));
        assert_eq!(event_date("2021-02-30"), Err(OccurrenceIssue::RecordedDateInvalid));
        assert_eq!(event_date("9999-01-01"), Err(OccurrenceIssue::RecordedDateUnlikely));
    }
}
