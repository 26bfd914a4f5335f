//! Handoff of validated data to persistence.
//!
//! The core never persists datasets itself. A [`ValidatedBatch`] bundles what
//! an orchestrator needs to decide whether and where to write a run, and
//! [`Sink`] is the seam persistence implementations plug into.

use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::info;

use crate::dataset::Dataset;
use crate::envelope::EventEnvelope;
use crate::error::StreamError;
use crate::validator::ValidationResult;

/// One validated run ready for persistence.
#[derive(Debug, Clone, Copy)]
pub struct ValidatedBatch<'a> {
    pub source: &'a str,
    pub dataset: &'a Dataset,
    /// Envelopes stamped from `dataset`, when the caller stamped them.
    pub events: &'a [EventEnvelope],
    pub result: &'a ValidationResult,
}

impl<'a> ValidatedBatch<'a> {
    pub fn new(source: &'a str, dataset: &'a Dataset, result: &'a ValidationResult) -> Self {
        Self {
            source,
            dataset,
            events: &[],
            result,
        }
    }

    pub fn with_events(mut self, events: &'a [EventEnvelope]) -> Self {
        self.events = events;
        self
    }

    pub fn error_file(&self) -> &'a Path {
        &self.result.error_file
    }

    /// No critical failures at row or dataset level.
    pub fn is_valid(&self) -> bool {
        self.result.is_valid()
    }
}

/// Persistence target for validated batches.
pub trait Sink {
    type Error: std::error::Error + Send + Sync + 'static;

    fn write_batch(&mut self, batch: &ValidatedBatch<'_>) -> Result<(), Self::Error>;
}

/// Appends a batch's envelopes to an NDJSON file, one envelope per line.
///
/// Batches with critical failures are skipped.
#[derive(Debug)]
pub struct JsonLinesSink {
    path: PathBuf,
    written: u64,
}

impl JsonLinesSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            written: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Envelopes written so far.
    pub fn written(&self) -> u64 {
        self.written
    }
}

impl Sink for JsonLinesSink {
    type Error = StreamError;

    fn write_batch(&mut self, batch: &ValidatedBatch<'_>) -> Result<(), StreamError> {
        if !batch.is_valid() {
            info!(
                source = batch.source,
                critical_failures = batch.result.critical_failures,
                error_file = %batch.error_file().display(),
                "skipping batch with critical failures"
            );
            return Ok(());
        }

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| StreamError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|source| StreamError::Write {
                path: self.path.clone(),
                source,
            })?;

        let mut writer = BufWriter::new(file);
        for event in batch.events {
            let line = serde_json::to_string(event)?;
            writeln!(writer, "{line}").map_err(|source| StreamError::Write {
                path: self.path.clone(),
                source,
            })?;
        }
        writer.flush().map_err(|source| StreamError::Write {
            path: self.path.clone(),
            source,
        })?;

        self.written += batch.events.len() as u64;
        info!(
            source = batch.source,
            events = batch.events.len(),
            path = %self.path.display(),
            "batch written"
        );
        Ok(())
    }
}
