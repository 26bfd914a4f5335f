//! Append-only, disk-backed sink for validation violations.
//!
//! Every record is written as one NDJSON line to the stream's output file;
//! only the first `keep_samples` records are retained in memory. The file
//! outlives the stream value and is removed only by [`ErrorStream::cleanup`].
//!
//! ## File format
//!
//! ```text
//! {"rule":"required_fields","severity":"critical","message":"missing 'close'","row":17}
//! {"rule":"price_band","severity":"warning","message":"close moved 21%","row":42,"context":{"pct":21.3}}
//! ```

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Lines, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::error::StreamError;

pub const DEFAULT_KEEP_SAMPLES: usize = 100;

/// Violation severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// The row is unusable; it does not count towards `valid_rows`.
    Critical,
    /// Recorded for audit, non-blocking.
    Warning,
}

impl Severity {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::Warning => "warning",
        }
    }
}

/// One persisted violation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub rule: String,
    pub severity: Severity,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row: Option<u64>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub context: Value,
}

impl ErrorRecord {
    pub fn new(rule: impl Into<String>, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            rule: rule.into(),
            severity,
            message: message.into(),
            row: None,
            context: Value::Null,
        }
    }

    pub fn with_row(mut self, row: u64) -> Self {
        self.row = Some(row);
        self
    }

    pub fn with_context(mut self, context: Value) -> Self {
        self.context = context;
        self
    }
}

/// Disk-backed violation stream with a bounded in-memory sample.
#[derive(Debug)]
pub struct ErrorStream {
    output_file: PathBuf,
    keep_samples: usize,
    samples: Vec<ErrorRecord>,
    total_errors: u64,
    writer: Option<BufWriter<File>>,
}

impl ErrorStream {
    /// Stream writing to `output_file`. `keep_samples` is raised to at least 1.
    pub fn new(output_file: impl Into<PathBuf>, keep_samples: usize) -> Self {
        Self {
            output_file: output_file.into(),
            keep_samples: keep_samples.max(1),
            samples: Vec::new(),
            total_errors: 0,
            writer: None,
        }
    }

    /// Stream writing to a fresh, uniquely named file inside `dir`.
    pub fn in_dir(dir: impl AsRef<Path>, keep_samples: usize) -> Self {
        let file_name = format!("validation-errors-{}.ndjson", Uuid::new_v4().simple());
        Self::new(dir.as_ref().join(file_name), keep_samples)
    }

    pub fn output_file(&self) -> &Path {
        &self.output_file
    }

    pub fn keep_samples(&self) -> usize {
        self.keep_samples
    }

    pub fn total_errors(&self) -> u64 {
        self.total_errors
    }

    /// The first `keep_samples` records written, in write order.
    pub fn get_samples(&self) -> &[ErrorRecord] {
        &self.samples
    }

    /// Append `record` to the output file.
    pub fn write_error(&mut self, record: ErrorRecord) -> Result<(), StreamError> {
        let line = serde_json::to_string(&record)?;
        let writer = self.writer()?;
        writeln!(writer, "{line}").map_err(|source| StreamError::Write {
            path: self.output_file.clone(),
            source,
        })?;

        self.total_errors += 1;
        if self.samples.len() < self.keep_samples {
            self.samples.push(record);
        }
        Ok(())
    }

    pub fn write_errors<I>(&mut self, records: I) -> Result<(), StreamError>
    where
        I: IntoIterator<Item = ErrorRecord>,
    {
        records
            .into_iter()
            .try_for_each(|record| self.write_error(record))
    }

    pub fn flush(&mut self) -> Result<(), StreamError> {
        if let Some(writer) = self.writer.as_mut() {
            writer.flush().map_err(|source| StreamError::Write {
                path: self.output_file.clone(),
                source,
            })?;
        }
        Ok(())
    }

    /// Lazily read back every record written so far, in write order.
    ///
    /// Each call starts a fresh pass over the file.
    pub fn iter_all_errors(&mut self) -> Result<ErrorRecords, StreamError> {
        self.flush()?;
        read_error_file(&self.output_file)
    }

    /// Delete the output file. Later read-backs yield nothing.
    pub fn cleanup(&mut self) -> Result<(), StreamError> {
        self.flush()?;
        self.writer = None;
        match fs::remove_file(&self.output_file) {
            Ok(()) => {
                debug!(path = %self.output_file.display(), "removed error file");
                Ok(())
            }
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StreamError::Remove {
                path: self.output_file.clone(),
                source,
            }),
        }
    }

    fn writer(&mut self) -> Result<&mut BufWriter<File>, StreamError> {
        if self.writer.is_none() {
            if let Some(parent) = self.output_file.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent).map_err(|source| StreamError::CreateDir {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.output_file)
                .map_err(|source| StreamError::Write {
                    path: self.output_file.clone(),
                    source,
                })?;
            self.writer = Some(BufWriter::new(file));
        }

        self.writer
            .as_mut()
            .ok_or_else(|| StreamError::Write {
                path: self.output_file.clone(),
                source: io::Error::other("error file writer unavailable"),
            })
    }
}

/// Lazily read an NDJSON error file. A missing file reads as empty.
pub fn read_error_file(path: impl AsRef<Path>) -> Result<ErrorRecords, StreamError> {
    let path = path.as_ref().to_path_buf();
    let lines = match File::open(&path) {
        Ok(file) => Some(BufReader::new(file).lines()),
        Err(error) if error.kind() == io::ErrorKind::NotFound => None,
        Err(source) => return Err(StreamError::Read { path, source }),
    };

    Ok(ErrorRecords {
        path,
        lines,
        line: 0,
    })
}

/// Iterator over the records of an error file.
#[derive(Debug)]
pub struct ErrorRecords {
    path: PathBuf,
    lines: Option<Lines<BufReader<File>>>,
    line: u64,
}

impl Iterator for ErrorRecords {
    type Item = Result<ErrorRecord, StreamError>;

    fn next(&mut self) -> Option<Self::Item> {
        let lines = self.lines.as_mut()?;
        loop {
            let line = match lines.next()? {
                Ok(line) => line,
                Err(source) => {
                    return Some(Err(StreamError::Read {
                        path: self.path.clone(),
                        source,
                    }))
                }
            };
            self.line += 1;
            if line.trim().is_empty() {
                continue;
            }

            return Some(serde_json::from_str(&line).map_err(|source| StreamError::Decode {
                path: self.path.clone(),
                line: self.line,
                source,
            }));
        }
    }
}
