use std::fmt::Debug;
use std::path::Path;

use tracing::{debug, instrument};

use crate::error::{Result, ValidatorError};
use crate::model::{simple_term, DataFile, DwcDataFile, FileFormat, RowType, TabularDataFile};
use crate::reader;

/// Turns an uploaded file into a dataset the pipeline can evaluate.
///
/// Decoding archives (reading `meta.xml`, locating extensions and metadata) is
/// the job of dedicated implementations; [`DelimitedFilePreparer`] handles
/// single delimited files.
pub trait DatasetPreparer: Debug + Send + Sync {
    fn prepare(&self, data_file: &DataFile) -> Result<DwcDataFile>;
}

/// Identifier terms looked up, in order, when none is configured.
pub const DEFAULT_IDENTIFIER_TERMS: &[&str] = &["occurrenceID", "taxonID", "eventID", "id"];

/// Prepares a single delimited file with a header line as the core of a
/// dataset.
#[derive(Debug, Clone)]
pub struct DelimitedFilePreparer {
    row_type: RowType,
    delimiter: Option<u8>,
    identifier_terms: Vec<String>,
}

impl Default for DelimitedFilePreparer {
    fn default() -> Self {
        Self::new(RowType::occurrence())
    }
}

impl DelimitedFilePreparer {
    pub fn new(row_type: RowType) -> Self {
        Self {
            row_type,
            delimiter: None,
            identifier_terms: DEFAULT_IDENTIFIER_TERMS
                .iter()
                .map(|term| term.to_string())
                .collect(),
        }
    }

    /// Uses `delimiter` instead of guessing it from the file extension.
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = Some(delimiter);
        self
    }

    pub fn with_identifier_terms(mut self, terms: Vec<String>) -> Self {
        self.identifier_terms = terms;
        self
    }

    fn delimiter_for(&self, path: &Path) -> u8 {
        self.delimiter.unwrap_or_else(|| {
            match path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(str::to_ascii_lowercase)
                .as_deref()
            {
                Some("csv") => b',',
                _ => b'\t',
            }
        })
    }

    fn identifier_index(&self, columns: &[String]) -> Option<usize> {
        self.identifier_terms.iter().find_map(|term| {
            columns
                .iter()
                .position(|column| simple_term(column).eq_ignore_ascii_case(term))
        })
    }
}

impl DatasetPreparer for DelimitedFilePreparer {
    #[instrument(skip(self, data_file), fields(file = %data_file.source_file_name))]
    fn prepare(&self, data_file: &DataFile) -> Result<DwcDataFile> {
        if data_file.file_format != FileFormat::Tabular {
            return Err(ValidatorError::data_file(
                &data_file.source_file_name,
                format!("{:?} files need a dedicated preparer", data_file.file_format),
            ));
        }

        let mut core = TabularDataFile::new(&data_file.file_path, self.row_type.clone(), vec![])
            .with_delimiter(self.delimiter_for(&data_file.file_path));
        core.source_file_name = data_file.source_file_name.clone();

        let columns = reader::headers(&core)?.unwrap_or_default();
        if columns.is_empty() {
            return Err(ValidatorError::data_file(
                &data_file.source_file_name,
                "file has no header line",
            ));
        }

        let mut num_of_records = 0u64;
        for record in reader::records(&core)? {
            record?;
            num_of_records += 1;
        }

        let identifier = self.identifier_index(&columns);
        core.columns = columns;
        core.num_of_lines = num_of_records + 1;
        if let Some(index) = identifier {
            core = core.with_record_identifier(index);
        }
        debug!(
            columns = core.columns.len(),
            records = num_of_records,
            identifier = ?core.record_identifier,
            "Prepared delimited file"
        );

        Ok(DwcDataFile::new(data_file.clone(), core))
    }
}
