//! Read-back of NDJSON error files written by validation runs.

use std::collections::BTreeMap;
use std::path::Path;

use ferroingest_core::{read_error_file, ErrorRecord, ErrorRecords, Severity};
use serde::Serialize;
use serde_json::Value;

use crate::cli::{ErrorFileArgs, ErrorsHeadArgs};
use crate::error::CliError;

#[derive(Debug, Default, Serialize)]
struct SeverityCounts {
    critical: u64,
    warning: u64,
}

impl SeverityCounts {
    fn record(&mut self, severity: Severity) {
        match severity {
            Severity::Critical => self.critical += 1,
            Severity::Warning => self.warning += 1,
        }
    }
}

#[derive(Debug, Serialize)]
struct SummaryResponse {
    file: String,
    total: u64,
    by_severity: SeverityCounts,
    by_rule: BTreeMap<String, SeverityCounts>,
}

pub fn summary(args: &ErrorFileArgs) -> Result<Value, CliError> {
    let mut total = 0;
    let mut by_severity = SeverityCounts::default();
    let mut by_rule = BTreeMap::<String, SeverityCounts>::new();

    for record in open(&args.file)? {
        let record = record?;
        total += 1;
        by_severity.record(record.severity);
        by_rule.entry(record.rule).or_default().record(record.severity);
    }

    Ok(serde_json::to_value(SummaryResponse {
        file: args.file.display().to_string(),
        total,
        by_severity,
        by_rule,
    })?)
}

pub fn head(args: &ErrorsHeadArgs) -> Result<Value, CliError> {
    let records = open(&args.file)?
        .take(args.count)
        .collect::<Result<Vec<ErrorRecord>, _>>()?;
    Ok(serde_json::to_value(records)?)
}

fn open(path: &Path) -> Result<ErrorRecords, CliError> {
    if !path.exists() {
        return Err(CliError::NotFound(path.to_path_buf()));
    }
    Ok(read_error_file(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferroingest_core::ErrorStream;
    use std::path::PathBuf;

    fn write_fixture(dir: &Path) -> PathBuf {
        let path = dir.join("errors.ndjson");
        let mut stream = ErrorStream::new(&path, 2);
        stream
            .write_errors([
                ErrorRecord::new("required_fields", Severity::Critical, "missing 'close'").with_row(0),
                ErrorRecord::new("required_fields", Severity::Critical, "missing 'close'").with_row(3),
                ErrorRecord::new("price_band", Severity::Warning, "close moved 21%").with_row(3),
            ])
            .expect("writable");
        stream.flush().expect("flushable");
        path
    }

    #[test]
    fn summary_counts_by_rule_and_severity() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = write_fixture(dir.path());

        let output = summary(&ErrorFileArgs { file }).expect("readable");

        assert_eq!(output["total"], 3);
        assert_eq!(output["by_severity"]["critical"], 2);
        assert_eq!(output["by_severity"]["warning"], 1);
        assert_eq!(output["by_rule"]["required_fields"]["critical"], 2);
        assert_eq!(output["by_rule"]["price_band"]["warning"], 1);
    }

    #[test]
    fn head_limits_records_in_write_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = write_fixture(dir.path());

        let output = head(&ErrorsHeadArgs { file, count: 2 }).expect("readable");

        let rows = output.as_array().expect("array output");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["row"], 0);
        assert_eq!(rows[1]["row"], 3);
    }

    #[test]
    fn missing_file_is_reported() {
        let dir = tempfile::tempdir().expect("tempdir");

        let error = summary(&ErrorFileArgs {
            file: dir.path().join("absent.ndjson"),
        })
        .expect_err("missing file");

        assert!(matches!(error, CliError::NotFound(_)));
        assert_eq!(error.exit_code(), 2);
    }
}
