//! Internal events emitted through the `metrics` facade.
//!
//! The core only records observations; installing a recorder/exporter is left
//! to the embedding process. Every breaker metric carries a `source` label so
//! per-provider dashboards can be built without extra plumbing.

use metrics::{counter, gauge, histogram};
use tracing::trace;

use crate::circuit_breaker::CircuitState;

/// Trait for internal events that can be emitted as metrics.
pub trait InternalEvent {
    /// Emit this event as a metric.
    fn emit(self);
}

/// Emitted on every breaker state transition.
pub struct BreakerTransitioned<'a> {
    pub source: &'a str,
    pub from: CircuitState,
    pub to: CircuitState,
}

impl InternalEvent for BreakerTransitioned<'_> {
    fn emit(self) {
        trace!(source = self.source, from = %self.from, to = %self.to, "Breaker transitioned");
        counter!(
            "ferroingest_breaker_transitions_total",
            "source" => self.source.to_owned(),
            "from" => self.from.as_str(),
            "to" => self.to.as_str()
        )
        .increment(1);
        gauge!("ferroingest_breaker_state", "source" => self.source.to_owned())
            .set(self.to.gauge_value());
    }
}

/// Emitted when a wrapped operation fails behind a breaker.
pub struct BreakerFailureRecorded<'a> {
    pub source: &'a str,
    pub failure_count: u32,
}

impl InternalEvent for BreakerFailureRecorded<'_> {
    fn emit(self) {
        trace!(source = self.source, failure_count = self.failure_count, "Breaker failure recorded");
        counter!("ferroingest_breaker_failures_total", "source" => self.source.to_owned())
            .increment(1);
    }
}

/// Emitted when an open breaker rejects a call.
pub struct BreakerCallRejected<'a> {
    pub source: &'a str,
}

impl InternalEvent for BreakerCallRejected<'_> {
    fn emit(self) {
        trace!(source = self.source, "Breaker rejected call");
        counter!("ferroingest_breaker_rejected_total", "source" => self.source.to_owned())
            .increment(1);
    }
}

/// Emitted once per fallback resolution.
pub struct SourceResolved<'a> {
    pub selected: Option<&'a str>,
    pub attempts: usize,
    pub latency_ms: u64,
}

impl InternalEvent for SourceResolved<'_> {
    fn emit(self) {
        let selected = self.selected.unwrap_or("none").to_owned();
        trace!(selected = %selected, attempts = self.attempts, "Source resolved");
        counter!("ferroingest_resolutions_total", "selected" => selected).increment(1);
        histogram!("ferroingest_resolution_attempts").record(self.attempts as f64);
        histogram!("ferroingest_resolution_latency_ms").record(self.latency_ms as f64);
    }
}

/// Emitted when a validation run completes.
pub struct ValidationCompleted {
    pub total_rows: u64,
    pub valid_rows: u64,
    pub critical_failures: u64,
    pub warnings: u64,
}

impl InternalEvent for ValidationCompleted {
    fn emit(self) {
        trace!(
            total_rows = self.total_rows,
            valid_rows = self.valid_rows,
            "Validation completed"
        );
        counter!("ferroingest_validation_rows_total").increment(self.total_rows);
        counter!("ferroingest_validation_valid_rows_total").increment(self.valid_rows);
        counter!("ferroingest_validation_critical_failures_total")
            .increment(self.critical_failures);
        counter!("ferroingest_validation_warnings_total").increment(self.warnings);
    }
}
