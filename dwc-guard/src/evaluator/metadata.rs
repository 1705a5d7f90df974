use crate::model::{DatasetMetadata, DwcDataFile, EvaluationType, ValidationResultElement};

/// Minimum length of the title and the description.
pub const MIN_TEXT_LENGTH: usize = 10;

/// Licenses accepted without an issue, matched as substrings of the declared
/// license so that both URLs and labels are recognised.
pub const KNOWN_LICENSES: &[&str] = &[
    "creativecommons.org/publicdomain/zero/1.0",
    "creativecommons.org/licenses/by/4.0",
    "creativecommons.org/licenses/by-nc/4.0",
    "CC0",
    "CC-BY-NC",
    "CC-BY",
];

/// Checks the content of the dataset metadata document.
#[derive(Debug, Clone)]
pub struct MetadataEvaluator {
    metadata_file_name: String,
}

impl Default for MetadataEvaluator {
    fn default() -> Self {
        Self::new("eml.xml")
    }
}

impl MetadataEvaluator {
    pub fn new(metadata_file_name: impl Into<String>) -> Self {
        Self {
            metadata_file_name: metadata_file_name.into(),
        }
    }

    /// Returns the metadata report of `dataset`, or `None` when it carries no
    /// metadata document.
    pub fn evaluate(&self, dataset: &DwcDataFile) -> Option<ValidationResultElement> {
        let metadata = dataset.metadata.as_ref()?;
        Some(ValidationResultElement::for_metadata(
            self.metadata_file_name.clone(),
            self.issues(metadata),
        ))
    }

    /// Metadata issues, in a fixed order.
    pub fn issues(&self, metadata: &DatasetMetadata) -> Vec<EvaluationType> {
        let mut issues = Vec::new();

        if !has_known_license(metadata.license.as_deref()) {
            issues.push(EvaluationType::LicenseMissingOrUnknown);
        }
        if !is_long_enough(metadata.title.as_deref()) {
            issues.push(EvaluationType::TitleMissingOrTooShort);
        }
        if !is_long_enough(metadata.description.as_deref()) {
            issues.push(EvaluationType::DescriptionMissingOrTooShort);
        }
        let has_complete_contact = metadata.contacts.iter().any(|contact| {
            is_present(contact.name.as_deref()) && is_present(contact.email.as_deref())
        });
        if !has_complete_contact {
            issues.push(EvaluationType::ResourceContactsMissingOrIncomplete);
        }
        issues
    }
}

fn is_present(value: Option<&str>) -> bool {
    value.is_some_and(|v| !v.trim().is_empty())
}

fn is_long_enough(value: Option<&str>) -> bool {
    value.is_some_and(|v| v.trim().chars().count() >= MIN_TEXT_LENGTH)
}

fn has_known_license(license: Option<&str>) -> bool {
    let Some(license) = license.map(str::trim).filter(|l| !l.is_empty()) else {
        return false;
    };
    let license = license.to_ascii_lowercase();
    KNOWN_LICENSES
        .iter()
        .any(|known| license.contains(&known.to_ascii_lowercase()))
}
