//! Descriptions of the files handed to the validation pipeline.
//!
//! These types form the input boundary of the crate: decoding an archive
//! (reading `meta.xml`, extracting headers and identifier columns) is done by a
//! [`DatasetPreparer`](crate::pipeline::DatasetPreparer) which produces a
//! [`DwcDataFile`].

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidatorError;

/// Semantic record type of a file (a Darwin Core term URI).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowType(String);

impl RowType {
    pub const OCCURRENCE: &'static str = "http://rs.tdwg.org/dwc/terms/Occurrence";
    pub const TAXON: &'static str = "http://rs.tdwg.org/dwc/terms/Taxon";
    pub const EVENT: &'static str = "http://rs.tdwg.org/dwc/terms/Event";
    pub const IDENTIFICATION: &'static str = "http://rs.tdwg.org/dwc/terms/Identification";
    pub const MEASUREMENT_OR_FACT: &'static str = "http://rs.tdwg.org/dwc/terms/MeasurementOrFact";

    pub fn new(uri: impl Into<String>) -> Self {
        Self(uri.into())
    }

    pub fn occurrence() -> Self {
        Self::new(Self::OCCURRENCE)
    }

    pub fn identification() -> Self {
        Self::new(Self::IDENTIFICATION)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Term name without its namespace: `http://rs.tdwg.org/dwc/terms/taxonID`
/// and `dwc:taxonID` are both `taxonID`.
pub fn simple_term(term: &str) -> &str {
    term.rsplit(['/', '#', ':']).next().unwrap_or(term)
}

impl fmt::Display for RowType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Format of a submitted file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FileFormat {
    /// Darwin Core Archive
    Dwca,
    /// A single delimited text file
    Tabular,
}

impl FromStr for FileFormat {
    type Err = ValidatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "DWCA" => Ok(Self::Dwca),
            "TABULAR" => Ok(Self::Tabular),
            other => Err(ValidatorError::InvalidArgument(format!(
                "unsupported file format: {other}"
            ))),
        }
    }
}

/// Role of a file inside an archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DwcFileType {
    Core,
    Extension,
    Metadata,
}

/// A column position together with the term it holds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TermIndex {
    pub index: usize,
    pub term: String,
}

impl TermIndex {
    pub fn new(index: usize, term: impl Into<String>) -> Self {
        Self {
            index,
            term: term.into(),
        }
    }
}

/// A file as it was received, before preparation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataFile {
    /// Path of the stored upload. Safe to open.
    pub file_path: PathBuf,
    /// Name as provided by the submitter. Display only.
    pub source_file_name: String,
    pub file_format: FileFormat,
}

impl DataFile {
    pub fn new(
        file_path: impl AsRef<Path>,
        source_file_name: impl Into<String>,
        file_format: FileFormat,
    ) -> Self {
        Self {
            file_path: file_path.as_ref().to_path_buf(),
            source_file_name: source_file_name.into(),
            file_format,
        }
    }
}

/// One delimited file of a prepared dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TabularDataFile {
    pub file_path: PathBuf,
    pub source_file_name: String,
    /// Declared column terms, in file order
    pub columns: Vec<String>,
    pub row_type: RowType,
    pub file_type: DwcFileType,
    pub delimiter: u8,
    pub has_headers: bool,
    /// Number of lines in the file, header included
    pub num_of_lines: u64,
    pub record_identifier: Option<TermIndex>,
}

impl TabularDataFile {
    /// Creates a core file description with tab delimiter and a header line.
    pub fn new(file_path: impl AsRef<Path>, row_type: RowType, columns: Vec<String>) -> Self {
        let file_path = file_path.as_ref().to_path_buf();
        let source_file_name = file_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            file_path,
            source_file_name,
            columns,
            row_type,
            file_type: DwcFileType::Core,
            delimiter: b'\t',
            has_headers: true,
            num_of_lines: 0,
            record_identifier: None,
        }
    }

    pub fn with_file_type(mut self, file_type: DwcFileType) -> Self {
        self.file_type = file_type;
        self
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn with_headers(mut self, has_headers: bool) -> Self {
        self.has_headers = has_headers;
        self
    }

    pub fn with_num_of_lines(mut self, num_of_lines: u64) -> Self {
        self.num_of_lines = num_of_lines;
        self
    }

    /// Marks the column at `index` as the record identifier.
    pub fn with_record_identifier(mut self, index: usize) -> Self {
        let term = self
            .columns
            .get(index)
            .cloned()
            .unwrap_or_else(|| format!("column_{index}"));
        self.record_identifier = Some(TermIndex::new(index, term));
        self
    }

    /// Number of data records, header excluded.
    pub fn num_of_records(&self) -> u64 {
        if self.has_headers {
            self.num_of_lines.saturating_sub(1)
        } else {
            self.num_of_lines
        }
    }
}

/// A contact listed in the dataset metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub name: Option<String>,
    pub email: Option<String>,
}

/// The subset of the dataset metadata document the validator inspects.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetMetadata {
    pub title: Option<String>,
    pub description: Option<String>,
    pub license: Option<String>,
    #[serde(default)]
    pub contacts: Vec<Contact>,
}

/// A fully prepared dataset: one core file, its extensions and its metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DwcDataFile {
    pub data_file: DataFile,
    pub core: TabularDataFile,
    #[serde(default)]
    pub extensions: Vec<TabularDataFile>,
    #[serde(default)]
    pub metadata: Option<DatasetMetadata>,
}

impl DwcDataFile {
    pub fn new(data_file: DataFile, core: TabularDataFile) -> Self {
        Self {
            data_file,
            core,
            extensions: Vec::new(),
            metadata: None,
        }
    }

    pub fn with_extension(mut self, extension: TabularDataFile) -> Self {
        self.extensions
            .push(extension.with_file_type(DwcFileType::Extension));
        self
    }

    pub fn with_metadata(mut self, metadata: DatasetMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn core(&self) -> &TabularDataFile {
        &self.core
    }

    /// Finds the file holding `row_type`, core first.
    pub fn by_row_type(&self, row_type: &RowType) -> Option<&TabularDataFile> {
        self.tabular_files().find(|file| &file.row_type == row_type)
    }

    /// Core file followed by every extension.
    pub fn tabular_files(&self) -> impl Iterator<Item = &TabularDataFile> {
        std::iter::once(&self.core).chain(self.extensions.iter())
    }
}
