//! Record-level access to delimited data files.

use std::fs::File;

use csv::{ByteRecord, Position, Reader, ReaderBuilder, StringRecord};

use crate::error::{Result, ValidatorError};
use crate::model::TabularDataFile;

/// One record read from a data file.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRecord {
    /// 0-based position among the data records of the file
    pub index: u64,
    /// 1-based line number in the file
    pub line_number: u64,
    pub values: Vec<String>,
}

/// Opens `file` with its delimiter and header settings.
///
/// Records are read flexibly so that rows with a wrong number of columns are
/// returned rather than rejected. Quoting is disabled for tab-delimited files,
/// which do not use it.
pub fn open(file: &TabularDataFile) -> Result<Reader<File>> {
    ReaderBuilder::new()
        .delimiter(file.delimiter)
        .has_headers(file.has_headers)
        .flexible(true)
        .quoting(file.delimiter != b'\t')
        .from_path(&file.file_path)
        .map_err(|e| ValidatorError::data_file(&file.source_file_name, e.to_string()))
}

/// Iterates over every record of `file`.
pub fn records(file: &TabularDataFile) -> Result<impl Iterator<Item = Result<SourceRecord>>> {
    records_from(file, None)
}

/// Iterates over the records of `file` starting at `start`, or at the first
/// record when `start` is `None`.
///
/// Seeking goes straight to the byte offset of the start record, so reading a
/// late shard does not parse the records before it.
pub fn records_from(
    file: &TabularDataFile,
    start: Option<&RecordStart>,
) -> Result<impl Iterator<Item = Result<SourceRecord>>> {
    let mut reader = open(file)?;
    let first_index = match start {
        Some(start) => {
            reader
                .seek(start.position.clone())
                .map_err(|e| ValidatorError::data_file(&file.source_file_name, e.to_string()))?;
            start.index
        }
        None => 0,
    };
    let header_offset = if file.has_headers { 1 } else { 0 };
    let source_file_name = file.source_file_name.clone();

    Ok(reader
        .into_records()
        .enumerate()
        .map(move |(offset, record)| {
            let record = record.map_err(|e| {
                ValidatorError::data_file(source_file_name.clone(), e.to_string())
            })?;
            let index = first_index + offset as u64;
            let line_number = record
                .position()
                .map(|position| position.line())
                .unwrap_or(index + 1 + header_offset);
            Ok(SourceRecord {
                index,
                line_number,
                values: to_values(&record),
            })
        }))
}

/// Position of a data record inside its file.
#[derive(Debug, Clone)]
pub struct RecordStart {
    /// 0-based position among the data records of the file
    pub index: u64,
    position: Position,
}

/// Scans `file` once and returns its number of records along with the start
/// of every `every`-th record after the first.
pub fn record_starts(file: &TabularDataFile, every: u64) -> Result<(u64, Vec<RecordStart>)> {
    let every = every.max(1);
    let mut reader = open(file)?;
    let mut record = ByteRecord::new();
    let mut starts = Vec::new();
    let mut count = 0u64;
    while reader
        .read_byte_record(&mut record)
        .map_err(|e| ValidatorError::data_file(&file.source_file_name, e.to_string()))?
    {
        if count > 0 && count % every == 0 {
            if let Some(position) = record.position() {
                starts.push(RecordStart {
                    index: count,
                    position: position.clone(),
                });
            }
        }
        count += 1;
    }
    Ok((count, starts))
}

/// Reads the header line of `file`, if it declares one.
pub fn headers(file: &TabularDataFile) -> Result<Option<Vec<String>>> {
    if !file.has_headers {
        return Ok(None);
    }
    let mut reader = open(file)?;
    let headers = reader
        .headers()
        .map_err(|e| ValidatorError::data_file(&file.source_file_name, e.to_string()))?;
    Ok(Some(
        headers
            .iter()
            .map(|value| value.trim_matches('\u{feff}').trim().to_string())
            .collect(),
    ))
}

fn to_values(record: &StringRecord) -> Vec<String> {
    record.iter().map(str::to_string).collect()
}
