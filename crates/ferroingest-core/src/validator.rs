//! Streaming validation of parsed datasets.
//!
//! Rules are applied in order and their violations are pulled lazily, one at
//! a time, straight into an [`ErrorStream`]. The validator itself only keeps
//! running counters and one flag per row, so violation memory is bounded by
//! the stream's `keep_samples` no matter how many rows fail.
//!
//! ## Example
//!
//! ```rust,no_run
//! use ferroingest_core::{Dataset, RequiredFields, RuleSet, Severity, StreamingValidator};
//!
//! let rules = RuleSet::new().with_rule(RequiredFields::new(["symbol", "close"], Severity::Critical));
//! let validator = StreamingValidator::new("/var/lib/ferroingest/errors", 100);
//! let report = validator.validate(&Dataset::default(), &rules)?;
//!
//! println!("{} valid rows, errors in {}", report.result.valid_rows, report.result.error_file.display());
//! # Ok::<(), ferroingest_core::StreamError>(())
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::config::ValidationSettings;
use crate::dataset::{Dataset, Row};
use crate::error::StreamError;
use crate::error_stream::{ErrorRecord, ErrorStream, Severity};
use crate::metrics::{InternalEvent, ValidationCompleted};

/// A single rule finding, before it is attributed to its rule.
#[derive(Debug, Clone, PartialEq)]
pub struct Violation {
    pub severity: Severity,
    pub message: String,
    /// Zero-based row index; `None` for dataset-level findings.
    pub row: Option<usize>,
    pub context: Value,
}

impl Violation {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            row: None,
            context: Value::Null,
        }
    }

    pub fn critical(message: impl Into<String>) -> Self {
        Self::new(Severity::Critical, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, message)
    }

    pub fn at_row(mut self, row: usize) -> Self {
        self.row = Some(row);
        self
    }

    pub fn with_context(mut self, context: Value) -> Self {
        self.context = context;
        self
    }

    fn into_record(self, rule: &str) -> ErrorRecord {
        let record = ErrorRecord::new(rule, self.severity, self.message).with_context(self.context);
        match self.row {
            Some(row) => record.with_row(row as u64),
            None => record,
        }
    }
}

/// Business rule supplied by the caller.
pub trait ValidationRule: Send + Sync {
    /// Identifier written into every error record.
    fn name(&self) -> &str;

    /// Lazily yield the violations found in `dataset`.
    fn violations<'a>(&'a self, dataset: &'a Dataset) -> Box<dyn Iterator<Item = Violation> + 'a>;
}

/// Per-row rule backed by a closure returning a message on violation.
pub struct RowRule<F> {
    name: String,
    severity: Severity,
    check: F,
}

impl<F> RowRule<F>
where
    F: Fn(&Row) -> Option<String> + Send + Sync,
{
    pub fn new(name: impl Into<String>, severity: Severity, check: F) -> Self {
        Self {
            name: name.into(),
            severity,
            check,
        }
    }
}

impl<F> ValidationRule for RowRule<F>
where
    F: Fn(&Row) -> Option<String> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn violations<'a>(&'a self, dataset: &'a Dataset) -> Box<dyn Iterator<Item = Violation> + 'a> {
        Box::new(dataset.iter().enumerate().filter_map(move |(index, row)| {
            (self.check)(row).map(|message| Violation::new(self.severity, message).at_row(index))
        }))
    }
}

/// Dataset-level rule backed by a closure.
pub struct DatasetRule<F> {
    name: String,
    check: F,
}

impl<F> DatasetRule<F>
where
    F: Fn(&Dataset) -> Option<Violation> + Send + Sync,
{
    pub fn new(name: impl Into<String>, check: F) -> Self {
        Self {
            name: name.into(),
            check,
        }
    }
}

impl<F> ValidationRule for DatasetRule<F>
where
    F: Fn(&Dataset) -> Option<Violation> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn violations<'a>(&'a self, dataset: &'a Dataset) -> Box<dyn Iterator<Item = Violation> + 'a> {
        Box::new((self.check)(dataset).into_iter())
    }
}

/// Flags rows where any listed field is absent or null.
#[derive(Debug, Clone)]
pub struct RequiredFields {
    fields: Vec<String>,
    severity: Severity,
}

impl RequiredFields {
    pub fn new<I, S>(fields: I, severity: Severity) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
            severity,
        }
    }
}

impl ValidationRule for RequiredFields {
    fn name(&self) -> &str {
        "required_fields"
    }

    fn violations<'a>(&'a self, dataset: &'a Dataset) -> Box<dyn Iterator<Item = Violation> + 'a> {
        Box::new(dataset.iter().enumerate().flat_map(move |(index, row)| {
            self.fields
                .iter()
                .filter(move |field| row.get(field.as_str()).map_or(true, Value::is_null))
                .map(move |field| {
                    Violation::new(self.severity, format!("missing required field '{field}'"))
                        .at_row(index)
                        .with_context(json!({ "field": field }))
                })
        }))
    }
}

/// Ordered collection of rules.
#[derive(Default)]
pub struct RuleSet {
    rules: Vec<Box<dyn ValidationRule>>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rule(mut self, rule: impl ValidationRule + 'static) -> Self {
        self.push(rule);
        self
    }

    pub fn push(&mut self, rule: impl ValidationRule + 'static) {
        self.rules.push(Box::new(rule));
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Box<dyn ValidationRule>> {
        self.rules.iter()
    }
}

impl std::fmt::Debug for RuleSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.rules.iter().map(|rule| rule.name()))
            .finish()
    }
}

/// Summary of one validation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub total_rows: u64,
    /// Rows without any critical violation.
    pub valid_rows: u64,
    /// Distinct rows with at least one critical violation.
    pub critical_failures: u64,
    /// Critical violations not attributable to a row.
    pub dataset_failures: u64,
    /// Warning records written.
    pub warnings: u64,
    pub error_samples: Vec<ErrorRecord>,
    pub error_file: PathBuf,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.critical_failures == 0 && self.dataset_failures == 0
    }
}

/// Result plus the stream holding the full violation set.
#[derive(Debug)]
pub struct ValidationReport {
    pub result: ValidationResult,
    pub errors: ErrorStream,
}

/// Applies rule sets to datasets, streaming violations to disk.
#[derive(Debug, Clone)]
pub struct StreamingValidator {
    output_dir: PathBuf,
    keep_samples: usize,
}

impl StreamingValidator {
    pub fn new(output_dir: impl Into<PathBuf>, keep_samples: usize) -> Self {
        Self {
            output_dir: output_dir.into(),
            keep_samples: keep_samples.max(1),
        }
    }

    pub fn from_settings(settings: &ValidationSettings) -> Self {
        Self::new(settings.output_dir.clone(), settings.keep_samples)
    }

    pub fn output_dir(&self) -> &std::path::Path {
        &self.output_dir
    }

    pub fn keep_samples(&self) -> usize {
        self.keep_samples
    }

    /// Validate into a fresh, uniquely named error file.
    pub fn validate(&self, dataset: &Dataset, rules: &RuleSet) -> Result<ValidationReport, StreamError> {
        let mut errors = ErrorStream::in_dir(&self.output_dir, self.keep_samples);
        let result = validate_into(dataset, rules, &mut errors)?;
        Ok(ValidationReport { result, errors })
    }
}

/// Validate `dataset` against `rules`, writing violations into `stream`.
///
/// Row violations never abort the run; only error-file I/O failures do.
pub fn validate_into(
    dataset: &Dataset,
    rules: &RuleSet,
    stream: &mut ErrorStream,
) -> Result<ValidationResult, StreamError> {
    let total_rows = dataset.len();
    let mut failed_rows = vec![false; total_rows];
    let mut critical_failures = 0_u64;
    let mut dataset_failures = 0_u64;
    let mut warnings = 0_u64;

    for rule in rules.iter() {
        let written_before = stream.total_errors();
        for violation in rule.violations(dataset) {
            match (violation.severity, violation.row) {
                (Severity::Warning, _) => warnings += 1,
                (Severity::Critical, Some(row)) if row < total_rows => {
                    if !failed_rows[row] {
                        failed_rows[row] = true;
                        critical_failures += 1;
                    }
                }
                (Severity::Critical, _) => dataset_failures += 1,
            }
            stream.write_error(violation.into_record(rule.name()))?;
        }
        debug!(
            rule = rule.name(),
            violations = stream.total_errors() - written_before,
            "rule applied"
        );
    }
    stream.flush()?;

    let total_rows = total_rows as u64;
    let valid_rows = total_rows - critical_failures;
    info!(
        total_rows,
        valid_rows,
        critical_failures,
        dataset_failures,
        warnings,
        error_file = %stream.output_file().display(),
        "validation finished"
    );
    ValidationCompleted {
        total_rows,
        valid_rows,
        critical_failures,
        warnings,
    }
    .emit();

    Ok(ValidationResult {
        total_rows,
        valid_rows,
        critical_failures,
        dataset_failures,
        warnings,
        error_samples: stream.get_samples().to_vec(),
        error_file: stream.output_file().to_path_buf(),
    })
}
