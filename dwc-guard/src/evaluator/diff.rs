use std::collections::HashSet;
use std::fmt::Debug;
use std::path::Path;

use csv::ReaderBuilder;
use tracing::debug;

use crate::error::{Result, ValidatorError};

/// Finds the values of one column of a file that do not appear in a column of
/// another file.
pub trait ColumnDiff: Debug + Send + Sync {
    /// Returns every value of `ext_col` in `ext_path` with no match in
    /// `core_col` of `core_path`. Columns are 0-based. Each value is
    /// reported once, in the order it first appears in the extension.
    fn diff_on_columns(
        &self,
        core_path: &Path,
        ext_path: &Path,
        core_col: usize,
        ext_col: usize,
        delimiter: u8,
        has_header: bool,
    ) -> Result<Vec<String>>;
}

/// Diff loading the core column into a hash set, then streaming the
/// extension. Memory is proportional to the number of distinct core ids.
///
/// Blank extension values are not reported.
#[derive(Debug, Clone, Copy, Default)]
pub struct HashJoinColumnDiff;

impl HashJoinColumnDiff {
    fn column_values(
        path: &Path,
        column: usize,
        delimiter: u8,
        has_header: bool,
    ) -> Result<impl Iterator<Item = Result<String>>> {
        let reader = ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(has_header)
            .flexible(true)
            .quoting(delimiter != b'\t')
            .from_path(path)
            .map_err(|e| ValidatorError::data_file(path.display().to_string(), e.to_string()))?;

        Ok(reader.into_records().map(move |record| {
            let record = record?;
            Ok(record.get(column).unwrap_or_default().trim().to_string())
        }))
    }
}

impl ColumnDiff for HashJoinColumnDiff {
    fn diff_on_columns(
        &self,
        core_path: &Path,
        ext_path: &Path,
        core_col: usize,
        ext_col: usize,
        delimiter: u8,
        has_header: bool,
    ) -> Result<Vec<String>> {
        let core_ids = Self::column_values(core_path, core_col, delimiter, has_header)?
            .collect::<Result<HashSet<String>>>()?;
        debug!(
            core_ids = core_ids.len(),
            core = %core_path.display(),
            "Loaded core identifiers"
        );

        let mut reported = HashSet::new();
        let mut unmatched = Vec::new();
        for value in Self::column_values(ext_path, ext_col, delimiter, has_header)? {
            let value = value?;
            if value.is_empty() || core_ids.contains(&value) {
                continue;
            }
            if reported.insert(value.clone()) {
                unmatched.push(value);
            }
        }
        Ok(unmatched)
    }
}
