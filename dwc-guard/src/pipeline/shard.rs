use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::collector::{CollectorGroup, CollectorMode};
use crate::error::{Result, ValidatorError};
use crate::evaluator::RecordEvaluator;
use crate::model::TabularDataFile;
use crate::reader::{self, RecordStart};

/// A contiguous run of records of one file.
#[derive(Debug, Clone)]
pub struct Shard {
    /// 0-based record indices covered by the shard
    pub records: Range<u64>,
    start: Option<RecordStart>,
}

impl Shard {
    fn len(&self) -> u64 {
        self.records.end.saturating_sub(self.records.start)
    }
}

/// Splits `file` into shards of at most `split_size` records. Always returns
/// at least one shard.
///
/// A file that fits in a single shard is not read. Otherwise one pass records
/// where each shard starts so that shards can seek to their first record.
pub fn plan_shards(file: &TabularDataFile, split_size: u64) -> Result<Vec<Shard>> {
    let split_size = split_size.max(1);
    let num_records = file.num_of_records();
    if num_records <= split_size {
        return Ok(vec![Shard {
            records: 0..num_records,
            start: None,
        }]);
    }

    let (count, starts) = reader::record_starts(file, split_size)?;
    let mut shards = Vec::with_capacity(starts.len() + 1);
    let mut current = Shard {
        records: 0..count,
        start: None,
    };
    for start in starts {
        current.records.end = start.index;
        let next = Shard {
            records: start.index..count,
            start: Some(start),
        };
        shards.push(std::mem::replace(&mut current, next));
    }
    shards.push(current);
    Ok(shards)
}

/// Reads the records of `shard` and feeds them to `group`.
///
/// `cancelled` is checked between records.
pub fn run_shard<M: CollectorMode>(
    file: &TabularDataFile,
    shard: &Shard,
    evaluator: &dyn RecordEvaluator,
    group: &CollectorGroup<M>,
    cancelled: &AtomicBool,
) -> Result<u64> {
    let mut processed = 0u64;
    for record in reader::records_from(file, shard.start.as_ref())?.take(shard.len() as usize) {
        if cancelled.load(Ordering::Acquire) {
            return Err(ValidatorError::Internal(format!(
                "validation of {} was cancelled",
                file.source_file_name
            )));
        }
        let record = record?;
        group.collect_metrics(&record.values);
        if let Some(result) = evaluator.evaluate(Some(record.line_number), &record.values) {
            group.collect_result(&result);
        }
        processed += 1;
    }
    Ok(processed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::ExclusiveCollectorGroup;
    use crate::evaluator::RecordStructureEvaluator;
    use crate::model::{EvaluationType, RowType};
    use std::fs;
    use tempfile::TempDir;

    fn write_file(dir: &TempDir, records: u64) -> TabularDataFile {
        let path = dir.path().join("occurrence.txt");
        let mut content = String::from("occurrenceID\tcountry\n");
        for i in 0..records {
            // every record is one column short so each one is reported
            content.push_str(&format!("occ-{i}\n"));
        }
        fs::write(&path, content).unwrap();
        TabularDataFile::new(
            &path,
            RowType::occurrence(),
            vec!["occurrenceID".to_string(), "country".to_string()],
        )
        .with_num_of_lines(records + 1)
    }

    #[test]
    fn test_plan_shards() {
        let dir = TempDir::new().unwrap();

        let shards = plan_shards(&write_file(&dir, 25), 10).unwrap();
        let ranges: Vec<_> = shards.iter().map(|s| s.records.clone()).collect();
        assert_eq!(ranges, vec![0..10, 10..20, 20..25]);
        assert!(shards[0].start.is_none());
        assert!(shards[1..].iter().all(|s| s.start.is_some()));

        let shards = plan_shards(&write_file(&dir, 0), 10).unwrap();
        assert_eq!(shards.len(), 1);
        assert_eq!(shards[0].records, 0..0);

        let shards = plan_shards(&write_file(&dir, 3), 0).unwrap();
        assert_eq!(shards.len(), 3);
    }

    #[test]
    fn test_shards_cover_every_record_once() {
        let dir = TempDir::new().unwrap();
        let file = write_file(&dir, 25);
        let evaluator = RecordStructureEvaluator::for_file(&file);
        let cancelled = AtomicBool::new(false);

        let mut lines = Vec::new();
        let mut processed = 0;
        for shard in plan_shards(&file, 10).unwrap() {
            let group: ExclusiveCollectorGroup = CollectorGroup::new(file.columns.clone(), 100);
            processed += run_shard(&file, &shard, &evaluator, &group, &cancelled).unwrap();
            let snapshot = group.into_snapshot();
            assert_eq!(snapshot.issue_counts[&EvaluationType::ColumnMismatch], shard.len());
            lines.extend(
                snapshot.issue_samples[&EvaluationType::ColumnMismatch]
                    .iter()
                    .filter_map(|sample| sample.line_number),
            );
        }

        assert_eq!(processed, 25);
        assert_eq!(lines, (2..=26).collect::<Vec<u64>>());
    }
}
