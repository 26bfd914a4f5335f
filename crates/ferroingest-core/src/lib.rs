//! # Ferroingest Core
//!
//! Resilience and data-quality layer for market-data ingestion pipelines.
//!
//! ## Overview
//!
//! This crate sits between caller-supplied fetchers (scrapers, HTTP clients)
//! and a persistence sink:
//!
//! - **Circuit breakers** per upstream source, shared through a registry
//! - **Retry policies** with exponential backoff for transient failures
//! - **Source fallback** across a priority list of sources
//! - **Idempotent identities** for replay-safe event envelopes
//! - **Streaming validation** with a bounded in-memory error sample and a
//!   disk-backed NDJSON error file
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`circuit_breaker`] | Closed/Open/HalfOpen breaker |
//! | [`config`] | YAML configuration with env overrides |
//! | [`dataset`] | Parsed rows and the `Payload` trait |
//! | [`envelope`] | Event envelopes and row stamping |
//! | [`error`] | Error types |
//! | [`error_stream`] | NDJSON error file with sample buffer |
//! | [`identity`] | UUIDv5 event ids |
//! | [`metrics`] | Metric events emitted through the `metrics` facade |
//! | [`registry`] | Per-source breaker registry |
//! | [`resolver`] | Priority-ordered source fallback |
//! | [`retry`] | Retry policy and backoff |
//! | [`sink`] | Validated batch handoff |
//! | [`validator`] | Rules and the streaming validator |
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  Orchestrator   │
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ Fallback        │────▶│ Circuit Breaker  │
//! │ Resolver        │     │ (per source)     │
//! └────────┬────────┘     └────────┬─────────┘
//!          │                       ▼
//!          │              ┌──────────────────┐
//!          │              │ Retry → fetch()  │
//!          │              └──────────────────┘
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ Streaming       │────▶│ Error Stream     │
//! │ Validator       │     │ (NDJSON file)    │
//! └────────┬────────┘     └──────────────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ Sink            │
//! └─────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use ferroingest_core::{
//!     CircuitBreakerRegistry, Dataset, FetchError, RequiredFields, RetryPolicy, RuleSet,
//!     Severity, SourceFallbackResolver, StreamingValidator,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = CircuitBreakerRegistry::builder()
//!         .source("nse")
//!         .source("bse")
//!         .build()?;
//!     let resolver = SourceFallbackResolver::new(Arc::new(registry), RetryPolicy::default());
//!
//!     let resolution = resolver
//!         .resolve(&["nse", "bse"], |source| scrape(source.to_owned()))
//!         .await?;
//!
//!     let rules = RuleSet::new().with_rule(RequiredFields::new(["symbol"], Severity::Critical));
//!     let report = StreamingValidator::new("/tmp/errors", 100).validate(&resolution.data, &rules)?;
//!     println!("{} valid rows", report.result.valid_rows);
//!     Ok(())
//! }
//!
//! async fn scrape(source: String) -> Result<Dataset, FetchError> {
//!     todo!("fetch from {source}")
//! }
//! ```

pub mod circuit_breaker;
pub mod config;
pub mod dataset;
pub mod envelope;
pub mod error;
pub mod error_stream;
pub mod identity;
pub mod metrics;
pub mod registry;
pub mod resolver;
pub mod retry;
pub mod sink;
pub mod validator;

pub use circuit_breaker::{
    BreakerSnapshot, CircuitBreaker, CircuitBreakerConfig, CircuitState, TransitionCounts,
};
pub use config::{IngestConfig, RetrySettings, SourceSettings, ValidationSettings};
pub use dataset::{Dataset, Payload, Row};
pub use envelope::{stamp_rows, EventEnvelope, EventEnvelopeBuilder, StampLayout};
pub use error::{
    BreakerError, ConfigError, CoreError, EnvelopeError, FetchError, FetchErrorKind,
    ResolveError, StreamError,
};
pub use error_stream::{read_error_file, ErrorRecord, ErrorRecords, ErrorStream, Severity};
pub use identity::{event_id, EventId, EVENT_NAMESPACE};
pub use registry::{CircuitBreakerRegistry, CircuitBreakerRegistryBuilder};
pub use resolver::{AttemptStatus, FetchOutcome, Resolution, SourceAttempt, SourceFallbackResolver};
pub use retry::{Backoff, RetryPolicy, Retryable};
pub use sink::{JsonLinesSink, Sink, ValidatedBatch};
pub use validator::{
    validate_into, DatasetRule, RequiredFields, RowRule, RuleSet, StreamingValidator,
    ValidationReport, ValidationResult, ValidationRule, Violation,
};
