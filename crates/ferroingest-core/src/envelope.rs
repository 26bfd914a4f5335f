//! Event envelopes stamped with idempotent identities.
//!
//! ## Example
//!
//! ```rust
//! use ferroingest_core::EventEnvelope;
//! use serde_json::json;
//!
//! let first = EventEnvelope::builder("nse", "RELIANCE")
//!     .with_keys(["2024-01-02", "RELIANCE"])
//!     .with_field("close", json!(2584.95))
//!     .build()?;
//! let replay = EventEnvelope::builder("nse", "RELIANCE")
//!     .with_keys(["2024-01-02", "RELIANCE"])
//!     .build()?;
//!
//! assert_eq!(first.event_id(), replay.event_id());
//! # Ok::<(), ferroingest_core::EnvelopeError>(())
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::dataset::{Dataset, Row};
use crate::error::EnvelopeError;
use crate::identity::EventId;

pub const DEFAULT_SCHEMA_VERSION: &str = "v1";

/// Immutable event handed from parsing to the producer/sink boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    event_id: EventId,
    event_time: i64,
    ingest_time: i64,
    source: String,
    schema_version: String,
    entity_id: String,
    payload: BTreeMap<String, Value>,
}

impl EventEnvelope {
    pub fn builder(source: impl Into<String>, entity_id: impl Into<String>) -> EventEnvelopeBuilder {
        EventEnvelopeBuilder::new(source, entity_id)
    }

    pub fn event_id(&self) -> EventId {
        self.event_id
    }

    /// Event time in milliseconds since the Unix epoch (UTC).
    pub fn event_time(&self) -> i64 {
        self.event_time
    }

    /// Creation time in milliseconds since the Unix epoch (UTC).
    pub fn ingest_time(&self) -> i64 {
        self.ingest_time
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn schema_version(&self) -> &str {
        &self.schema_version
    }

    /// Partition/grouping key.
    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    pub fn payload(&self) -> &BTreeMap<String, Value> {
        &self.payload
    }
}

/// Builder for [`EventEnvelope`].
#[derive(Debug, Clone)]
pub struct EventEnvelopeBuilder {
    source: String,
    entity_id: String,
    schema_version: String,
    event_time: Option<OffsetDateTime>,
    keys: Vec<String>,
    payload: BTreeMap<String, Value>,
}

impl EventEnvelopeBuilder {
    pub fn new(source: impl Into<String>, entity_id: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            entity_id: entity_id.into(),
            schema_version: String::from(DEFAULT_SCHEMA_VERSION),
            event_time: None,
            keys: Vec::new(),
            payload: BTreeMap::new(),
        }
    }

    pub fn with_schema_version(mut self, schema_version: impl Into<String>) -> Self {
        self.schema_version = schema_version.into();
        self
    }

    /// Event time in any offset; stored normalized to UTC epoch millis.
    /// Defaults to the ingest time.
    pub fn with_event_time(mut self, event_time: OffsetDateTime) -> Self {
        self.event_time = Some(event_time);
        self
    }

    /// Idempotency keys. Without keys the event id is random.
    pub fn with_keys<I, K>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        self.keys.extend(keys.into_iter().map(Into::into));
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.payload.insert(name.into(), value);
        self
    }

    pub fn with_payload(mut self, payload: BTreeMap<String, Value>) -> Self {
        self.payload.extend(payload);
        self
    }

    pub fn build(self) -> Result<EventEnvelope, EnvelopeError> {
        if self.source.trim().is_empty() {
            return Err(EnvelopeError::EmptySource);
        }
        if self.entity_id.trim().is_empty() {
            return Err(EnvelopeError::EmptyEntityId);
        }
        if self.schema_version.trim().is_empty() {
            return Err(EnvelopeError::EmptySchemaVersion);
        }

        let ingest_time = OffsetDateTime::now_utc();
        let event_id = if self.keys.is_empty() {
            EventId::random()
        } else {
            EventId::derive(&self.source, &self.keys)
        };

        Ok(EventEnvelope {
            event_id,
            event_time: epoch_millis(self.event_time.unwrap_or(ingest_time)),
            ingest_time: epoch_millis(ingest_time),
            source: self.source,
            schema_version: self.schema_version,
            entity_id: self.entity_id,
            payload: self.payload,
        })
    }
}

/// How rows of a dataset map onto envelopes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StampLayout {
    pub source: String,
    pub schema_version: String,
    /// Columns whose values, in order, form the idempotency keys.
    pub key_fields: Vec<String>,
    /// Column used as the partition key.
    pub entity_field: String,
    /// Column holding the event time (epoch millis, RFC3339 or `YYYY-MM-DD`).
    pub event_time_field: Option<String>,
}

/// Stamp every row of `dataset` with an idempotent envelope.
pub fn stamp_rows(dataset: &Dataset, layout: &StampLayout) -> Result<Vec<EventEnvelope>, EnvelopeError> {
    dataset
        .iter()
        .enumerate()
        .map(|(index, row)| stamp_row(index, row, layout))
        .collect()
}

fn stamp_row(index: usize, row: &Row, layout: &StampLayout) -> Result<EventEnvelope, EnvelopeError> {
    let keys = layout
        .key_fields
        .iter()
        .map(|field| required_text(index, row, field))
        .collect::<Result<Vec<_>, _>>()?;
    let entity_id = required_text(index, row, &layout.entity_field)?;

    let mut builder = EventEnvelope::builder(layout.source.as_str(), entity_id)
        .with_schema_version(layout.schema_version.as_str())
        .with_keys(keys)
        .with_payload(row.iter().map(|(k, v)| (k.clone(), v.clone())).collect());

    if let Some(field) = &layout.event_time_field {
        let value = row.get(field).filter(|value| !value.is_null()).ok_or_else(|| {
            EnvelopeError::MissingField {
                row: index,
                field: field.clone(),
            }
        })?;
        builder = builder.with_event_time(parse_event_time(value).ok_or_else(|| {
            EnvelopeError::InvalidEventTime {
                row: index,
                field: field.clone(),
                value: value.to_string(),
            }
        })?);
    }

    builder.build()
}

fn required_text(index: usize, row: &Row, field: &str) -> Result<String, EnvelopeError> {
    match row.get(field) {
        None | Some(Value::Null) => Err(EnvelopeError::MissingField {
            row: index,
            field: field.to_owned(),
        }),
        Some(Value::String(text)) => Ok(text.clone()),
        Some(other) => Ok(other.to_string()),
    }
}

fn parse_event_time(value: &Value) -> Option<OffsetDateTime> {
    match value {
        Value::Number(number) => {
            let millis = i128::from(number.as_i64()?);
            OffsetDateTime::from_unix_timestamp_nanos(millis * 1_000_000).ok()
        }
        Value::String(text) => OffsetDateTime::parse(text, &Rfc3339)
            .or_else(|_| OffsetDateTime::parse(&format!("{text}T00:00:00Z"), &Rfc3339))
            .ok(),
        _ => None,
    }
}

fn epoch_millis(at: OffsetDateTime) -> i64 {
    (at.unix_timestamp_nanos() / 1_000_000) as i64
}
