//! Behavior-driven tests for streaming validation and the error stream.

use ferroingest_core::{
    read_error_file, Dataset, DatasetRule, ErrorRecord, ErrorStream, RequiredFields, Row,
    RowRule, RuleSet, Severity, StreamingValidator, ValidationSettings, Violation,
};
use serde_json::{json, Value};

fn dataset(values: Vec<Value>) -> Dataset {
    values
        .into_iter()
        .filter_map(|value| value.as_object().cloned())
        .collect()
}

fn price_band(row: &Row) -> Option<String> {
    let open = row.get("open")?.as_f64()?;
    let close = row.get("close")?.as_f64()?;
    let pct = (close - open).abs() / open * 100.0;
    (pct > 20.0).then(|| format!("close moved {pct:.0}% from open"))
}

// =============================================================================
// Error Stream: Sampling and Persistence
// =============================================================================

#[test]
fn stream_keeps_bounded_samples_but_persists_every_record() {
    // Given: A stream keeping 10 samples
    let dir = tempfile::tempdir().expect("tempdir");
    let mut stream = ErrorStream::in_dir(dir.path(), 10);

    // When: 50 records are written
    for index in 0..50 {
        stream
            .write_error(
                ErrorRecord::new("rule", Severity::Warning, format!("violation {index}"))
                    .with_row(index),
            )
            .expect("writable");
    }

    // Then: Only the first 10 are sampled, all 50 are on disk in order
    assert_eq!(stream.total_errors(), 50);
    let samples = stream.get_samples();
    assert_eq!(samples.len(), 10);
    assert_eq!(samples[0].message, "violation 0");
    assert_eq!(samples[9].message, "violation 9");

    let on_disk = stream
        .iter_all_errors()
        .expect("readable")
        .collect::<Result<Vec<_>, _>>()
        .expect("decodable");
    assert_eq!(on_disk.len(), 50);
    assert!(on_disk
        .iter()
        .enumerate()
        .all(|(index, record)| record.row == Some(index as u64)));
}

#[test]
fn read_back_is_restartable() {
    // Given: A stream with three records
    let dir = tempfile::tempdir().expect("tempdir");
    let mut stream = ErrorStream::in_dir(dir.path(), 1);
    stream
        .write_errors((0..3).map(|i| ErrorRecord::new("rule", Severity::Critical, format!("e{i}"))))
        .expect("writable");

    // When: The file is read back twice
    let first = stream.iter_all_errors().expect("readable").count();
    let second = stream.iter_all_errors().expect("readable").count();

    // Then: Each pass sees every record
    assert_eq!(first, 3);
    assert_eq!(second, 3);
}

#[test]
fn cleanup_removes_the_file_and_read_back_is_empty() {
    // Given: A stream with records on disk
    let dir = tempfile::tempdir().expect("tempdir");
    let mut stream = ErrorStream::in_dir(dir.path(), 5);
    stream
        .write_error(ErrorRecord::new("rule", Severity::Warning, "m"))
        .expect("writable");
    stream.flush().expect("flushable");
    let path = stream.output_file().to_path_buf();
    assert!(path.exists());

    // When: The stream is cleaned up
    stream.cleanup().expect("removable");

    // Then: The file is gone and read-back yields nothing
    assert!(!path.exists());
    assert_eq!(stream.iter_all_errors().expect("readable").count(), 0);
    assert_eq!(read_error_file(&path).expect("readable").count(), 0);

    // And: A second cleanup is harmless
    stream.cleanup().expect("idempotent");
}

// =============================================================================
// Streaming Validator: Counting
// =============================================================================

#[test]
fn validator_counts_critical_rows_and_warnings_separately() {
    // Given: 10 rows; rows 1, 4 and 7 miss "close"; rows 2 and 5 move more than 20%
    let mut values = Vec::new();
    for index in 0..10 {
        let close = match index {
            2 | 5 => json!(130.0),
            _ => json!(101.0),
        };
        let mut row = json!({ "symbol": format!("S{index}"), "open": 100.0, "close": close });
        if matches!(index, 1 | 4 | 7) {
            row.as_object_mut().expect("object").remove("close");
        }
        values.push(row);
    }
    let dataset = dataset(values);
    let rules = RuleSet::new()
        .with_rule(RequiredFields::new(["symbol", "close"], Severity::Critical))
        .with_rule(RowRule::new("price_band", Severity::Warning, price_band));

    // When: The dataset is validated
    let dir = tempfile::tempdir().expect("tempdir");
    let mut report = StreamingValidator::new(dir.path(), 100)
        .validate(&dataset, &rules)
        .expect("validation completes");

    // Then: Counts split critical rows from warnings
    let result = &report.result;
    assert_eq!(result.total_rows, 10);
    assert_eq!(result.critical_failures, 3);
    assert_eq!(result.valid_rows, 7);
    assert_eq!(result.warnings, 2);
    assert_eq!(result.dataset_failures, 0);
    assert!(!result.is_valid());
    assert_eq!(result.error_samples.len(), 5);
    assert_eq!(result.error_file, report.errors.output_file());

    // And: The error file holds exactly five records
    let records = report
        .errors
        .iter_all_errors()
        .expect("readable")
        .collect::<Result<Vec<_>, _>>()
        .expect("decodable");
    assert_eq!(records.len(), 5);
    assert_eq!(
        records
            .iter()
            .filter(|r| r.severity == Severity::Critical)
            .filter_map(|r| r.row)
            .collect::<Vec<_>>(),
        vec![1, 4, 7]
    );
    assert!(records
        .iter()
        .filter(|r| r.rule == "price_band")
        .all(|r| r.severity == Severity::Warning));
}

#[test]
fn row_with_several_critical_violations_counts_once() {
    // Given: One row missing two required fields
    let dataset = dataset(vec![json!({ "open": 1.0 }), json!({ "symbol": "A", "close": 1.0 })]);
    let rules = RuleSet::new().with_rule(RequiredFields::new(["symbol", "close"], Severity::Critical));

    // When: The dataset is validated
    let dir = tempfile::tempdir().expect("tempdir");
    let report = StreamingValidator::new(dir.path(), 10)
        .validate(&dataset, &rules)
        .expect("validation completes");

    // Then: Two records were written but only one row failed
    assert_eq!(report.errors.total_errors(), 2);
    assert_eq!(report.result.critical_failures, 1);
    assert_eq!(report.result.valid_rows, 1);
}

#[test]
fn dataset_level_critical_does_not_reduce_valid_rows() {
    // Given: A dataset-level rule requiring at least five rows
    let dataset = dataset(vec![json!({ "symbol": "A" }), json!({ "symbol": "B" })]);
    let rules = RuleSet::new().with_rule(DatasetRule::new("min_rows", |dataset: &Dataset| {
        (dataset.len() < 5).then(|| {
            Violation::critical(format!("expected at least 5 rows, got {}", dataset.len()))
                .with_context(json!({ "rows": dataset.len() }))
        })
    }));

    // When: The dataset is validated
    let dir = tempfile::tempdir().expect("tempdir");
    let report = StreamingValidator::new(dir.path(), 10)
        .validate(&dataset, &rules)
        .expect("validation completes");

    // Then: The failure is reported at dataset level
    assert_eq!(report.result.critical_failures, 0);
    assert_eq!(report.result.dataset_failures, 1);
    assert_eq!(report.result.valid_rows, 2);
    assert!(!report.result.is_valid());
    assert_eq!(report.result.error_samples[0].context, json!({ "rows": 2 }));
}

#[test]
fn empty_dataset_produces_empty_result() {
    // Given: No rows and a row-level rule
    let rules = RuleSet::new().with_rule(RequiredFields::new(["symbol"], Severity::Critical));

    // When: An empty dataset is validated
    let dir = tempfile::tempdir().expect("tempdir");
    let report = StreamingValidator::new(dir.path(), 10)
        .validate(&Dataset::default(), &rules)
        .expect("validation completes");

    // Then: Nothing failed and no records were written
    assert_eq!(report.result.total_rows, 0);
    assert_eq!(report.result.valid_rows, 0);
    assert!(report.result.is_valid());
    assert_eq!(report.errors.total_errors(), 0);
}

#[test]
fn validator_from_settings_writes_into_configured_directory() {
    // Given: Settings pointing at a temp directory
    let dir = tempfile::tempdir().expect("tempdir");
    let settings = ValidationSettings {
        keep_samples: 1,
        output_dir: dir.path().join("errors"),
    };
    let dataset = dataset(vec![json!({}), json!({})]);
    let rules = RuleSet::new().with_rule(RequiredFields::new(["symbol"], Severity::Warning));

    // When: Validation runs with the configured validator
    let report = StreamingValidator::from_settings(&settings)
        .validate(&dataset, &rules)
        .expect("validation completes");

    // Then: Samples are capped and the file lives under the configured directory
    assert_eq!(report.result.error_samples.len(), 1);
    assert_eq!(report.result.warnings, 2);
    assert!(report.result.error_file.starts_with(dir.path().join("errors")));
    assert!(report.result.error_file.exists());
}
