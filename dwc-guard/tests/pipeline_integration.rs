//! End-to-end validation of a multi-file dataset.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use dwc_guard::error::Result;
use dwc_guard::jobserver::JobContext;
use dwc_guard::model::{
    Contact, DataFile, DatasetMetadata, DwcDataFile, EvaluationType, FileFormat, RowType,
    TabularDataFile,
};
use dwc_guard::pipeline::{DatasetPreparer, PipelineConfig, ValidationPipeline};
use tempfile::TempDir;

/// Prepares a fixed archive layout: `occurrence.txt` as core and
/// `identification.txt` as extension, both keyed on their first column.
#[derive(Debug)]
struct FixedArchivePreparer {
    metadata: Option<DatasetMetadata>,
}

fn lines_of(path: &Path) -> u64 {
    fs::read_to_string(path).unwrap().lines().count() as u64
}

impl DatasetPreparer for FixedArchivePreparer {
    fn prepare(&self, data_file: &DataFile) -> Result<DwcDataFile> {
        let dir = &data_file.file_path;
        let core_path = dir.join("occurrence.txt");
        let extension_path = dir.join("identification.txt");

        let core = TabularDataFile::new(
            &core_path,
            RowType::occurrence(),
            vec!["occurrenceID".into(), "scientificName".into()],
        )
        .with_num_of_lines(lines_of(&core_path))
        .with_record_identifier(0);
        let extension = TabularDataFile::new(
            &extension_path,
            RowType::identification(),
            vec!["coreid".into(), "identifiedBy".into()],
        )
        .with_num_of_lines(lines_of(&extension_path))
        .with_record_identifier(0);

        let mut dataset = DwcDataFile::new(data_file.clone(), core).with_extension(extension);
        if let Some(metadata) = &self.metadata {
            dataset = dataset.with_metadata(metadata.clone());
        }
        Ok(dataset)
    }
}

fn write_archive(dir: &TempDir) -> DataFile {
    fs::write(
        dir.path().join("occurrence.txt"),
        "occurrenceID\tscientificName\n1\tPuma concolor\n2\tLynx lynx\n3\tLynx lynx\n",
    )
    .unwrap();
    fs::write(
        dir.path().join("identification.txt"),
        "coreid\tidentifiedBy\n2\tA. Smith\n3\tB. Jones\nZZ\tC. Brown\n",
    )
    .unwrap();
    DataFile::new(dir.path(), "dataset.zip", FileFormat::Dwca)
}

fn pipeline(metadata: Option<DatasetMetadata>, split: u64) -> ValidationPipeline {
    ValidationPipeline::new(
        Arc::new(FixedArchivePreparer { metadata }),
        PipelineConfig {
            file_split_size: split,
            ..PipelineConfig::default()
        },
    )
}

#[tokio::test]
async fn test_archive_reports_unlinked_extension_records() {
    let dir = TempDir::new().unwrap();
    let outcome = pipeline(None, 1_000)
        .validate(&JobContext::detached(1), write_archive(&dir))
        .await
        .unwrap();
    let result = outcome.result;

    assert_eq!(result.source_file_name, "dataset.zip");
    assert!(result.indexeable);
    // No metadata document, so no metadata element
    assert_eq!(result.results.len(), 2);

    let core = result.element_for(&RowType::occurrence()).unwrap();
    assert!(core.issue_counts.is_empty());
    assert_eq!(core.number_of_lines, 4);
    assert_eq!(core.term_count("scientificName"), Some(3));

    let extension = result.element_for(&RowType::identification()).unwrap();
    assert_eq!(
        extension.issue_counts[&EvaluationType::RecordReferentialIntegrityViolation],
        1
    );
    let samples = &extension.issue_samples[&EvaluationType::RecordReferentialIntegrityViolation];
    assert_eq!(samples.len(), 1);
    assert_eq!(samples[0].record_id.as_deref(), Some("ZZ"));
    assert_eq!(samples[0].line_number, None);
}

#[tokio::test]
async fn test_archive_with_incomplete_metadata() {
    let dir = TempDir::new().unwrap();
    let metadata = DatasetMetadata {
        title: Some("Mammals of the boreal forest".into()),
        description: None,
        license: Some("http://creativecommons.org/licenses/by/4.0/legalcode".into()),
        contacts: vec![Contact {
            name: Some("A. Smith".into()),
            email: Some("smith@example.org".into()),
        }],
    };
    let outcome = pipeline(Some(metadata), 2)
        .validate(&JobContext::detached(2), write_archive(&dir))
        .await
        .unwrap();

    let metadata_element = outcome.result.results.last().unwrap();
    assert_eq!(metadata_element.row_type, None);
    assert!(metadata_element.contains(&EvaluationType::DescriptionMissingOrTooShort));
    assert!(!metadata_element.contains(&EvaluationType::LicenseMissingOrUnknown));
    assert!(!metadata_element.contains(&EvaluationType::TitleMissingOrTooShort));
}

#[tokio::test]
async fn test_duplicate_core_ids_are_reported_across_shards() {
    let dir = TempDir::new().unwrap();
    write_archive(&dir);
    fs::write(
        dir.path().join("occurrence.txt"),
        "occurrenceID\tscientificName\n19\tA\n20\tB\n19\tC\n21\tD\n2\tE\n3\tF\n",
    )
    .unwrap();
    let data_file = DataFile::new(dir.path(), "dataset.zip", FileFormat::Dwca);

    let outcome = pipeline(None, 2)
        .validate(&JobContext::detached(3), data_file)
        .await
        .unwrap();
    let core = outcome.result.element_for(&RowType::occurrence()).unwrap();

    assert_eq!(core.issue_counts[&EvaluationType::RecordNotUniquelyIdentified], 2);
    let samples = &core.issue_samples[&EvaluationType::RecordNotUniquelyIdentified];
    let lines: Vec<_> = samples.iter().map(|s| s.line_number).collect();
    assert_eq!(lines, vec![Some(2), Some(4)]);
    assert!(samples.iter().all(|s| s.record_id.as_deref() == Some("19")));
}

/// Core file with interpretable occurrence terms, one bad value in four
/// records of every ten.
fn write_interpretable_core(dir: &TempDir) -> DataFile {
    write_archive(dir);
    let mut content = String::from("occurrenceID\tcountryCode\tdecimalLatitude\teventDate\n");
    for i in 0..30 {
        let country = if i % 10 == 0 { "Canada" } else { "CA" };
        let latitude = if i % 10 == 1 { "91.5" } else { "45.1" };
        let date = if i % 10 == 2 { "" } else { "2019-06-01" };
        content.push_str(&format!("{i}\t{country}\t{latitude}\t{date}\n"));
    }
    fs::write(dir.path().join("occurrence.txt"), content).unwrap();
    DataFile::new(dir.path(), "dataset.zip", FileFormat::Dwca)
}

/// Same layout as [`FixedArchivePreparer`] with the interpretable core.
#[derive(Debug)]
struct InterpretableArchivePreparer;

impl DatasetPreparer for InterpretableArchivePreparer {
    fn prepare(&self, data_file: &DataFile) -> Result<DwcDataFile> {
        let mut dataset = FixedArchivePreparer { metadata: None }.prepare(data_file)?;
        dataset.core.columns = vec![
            "occurrenceID".into(),
            "countryCode".into(),
            "decimalLatitude".into(),
            "eventDate".into(),
        ];
        Ok(dataset)
    }
}

#[tokio::test]
async fn test_interpreted_terms_are_counted() {
    let dir = TempDir::new().unwrap();
    let data_file = write_interpretable_core(&dir);
    let config = PipelineConfig {
        file_split_size: 1_000,
        ..PipelineConfig::default()
    };

    let outcome = ValidationPipeline::new(Arc::new(InterpretableArchivePreparer), config)
        .validate(&JobContext::detached(4), data_file)
        .await
        .unwrap();
    let core = outcome.result.element_for(&RowType::occurrence()).unwrap();

    assert_eq!(core.interpreted_term_counts["countryCode"], 27);
    assert_eq!(core.interpreted_term_counts["decimalLatitude"], 27);
    assert_eq!(core.interpreted_term_counts["eventDate"], 27);
    assert!(!core.interpreted_term_counts.contains_key("basisOfRecord"));
    assert_eq!(core.issue_counts[&EvaluationType::CountryCodeInvalid], 3);
    assert_eq!(core.issue_counts[&EvaluationType::CoordinateOutOfRange], 3);

    let sample = &core.issue_samples[&EvaluationType::CountryCodeInvalid][0];
    assert_eq!(sample.line_number, Some(2));
    assert_eq!(
        sample.related_data.as_ref().and_then(|data| data.get("countryCode")).map(String::as_str),
        Some("Canada")
    );
}

#[tokio::test]
async fn test_many_shards_merge_to_single_shard_result() {
    let dir = TempDir::new().unwrap();
    let data_file = write_interpretable_core(&dir);
    let run = |split: u64| {
        let data_file = data_file.clone();
        async move {
            let config = PipelineConfig {
                file_split_size: split,
                max_number_of_sample: 4,
                ..PipelineConfig::default()
            };
            ValidationPipeline::new(Arc::new(InterpretableArchivePreparer), config)
                .validate(&JobContext::detached(5), data_file)
                .await
                .unwrap()
                .result
        }
    };

    let single = run(1_000).await;
    for split in [1, 4, 7] {
        let sharded = run(split).await;
        assert_eq!(sharded, single, "split size {split}");
    }

    let core = single.element_for(&RowType::occurrence()).unwrap();
    assert_eq!(core.term_count("eventDate"), Some(27));
    let lines: Vec<_> = core.issue_samples[&EvaluationType::CoordinateOutOfRange]
        .iter()
        .map(|s| s.line_number)
        .collect();
    assert_eq!(lines, vec![Some(3), Some(13), Some(23)]);
}
