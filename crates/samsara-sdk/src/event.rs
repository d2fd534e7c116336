// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Events for the ingestion API and the enrichment/validation pipeline they
//! go through before being buffered or sent.
//!
//! An event is a free-form JSON object. Only three fields are required:
//!
//! - `sourceId`: non-blank string
//! - `timestamp`: integer milliseconds since epoch, `>= 0`
//! - `eventName`: non-blank string
//!
//! [`enrich`] fills in a missing `sourceId` and `timestamp`, then [`validate`]
//! checks the result without touching it.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::ValidationError;

pub const SOURCE_ID: &str = "sourceId";
pub const TIMESTAMP: &str = "timestamp";
pub const EVENT_NAME: &str = "eventName";

/// A single event record: field names mapped to dynamically-typed values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Event(Map<String, Value>);

impl Event {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, handy for constructing events inline.
    ///
    /// ```rust
    /// use samsara_sdk::event::Event;
    ///
    /// let event = Event::new()
    ///     .with("eventName", "app.started")
    ///     .with("attempt", 3);
    /// assert_eq!(event.get("attempt"), Some(&3.into()));
    /// ```
    #[must_use]
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(field.into(), value.into());
        self
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(field.into(), value.into())
    }

    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// A field explicitly set to `null` counts as absent.
    #[must_use]
    pub fn contains(&self, field: &str) -> bool {
        self.0.get(field).is_some_and(|value| !value.is_null())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for Event {
    fn from(fields: Map<String, Value>) -> Self {
        Event(fields)
    }
}

impl TryFrom<Value> for Event {
    type Error = Value;

    /// Only JSON objects are events; any other value is handed back.
    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(fields) => Ok(Event(fields)),
            other => Err(other),
        }
    }
}

/// Values used to fill fields an event was created without.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnrichmentDefaults {
    pub source_id: String,
}

/// Current time in milliseconds since the Unix epoch.
#[must_use]
pub fn timestamp_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
}

/// Fills an absent `sourceId` from `defaults` and an absent `timestamp` with
/// the current time. Fields that are present are left alone, valid or not.
pub fn enrich(event: &mut Event, defaults: &EnrichmentDefaults) {
    if !event.contains(SOURCE_ID) {
        event.insert(SOURCE_ID, defaults.source_id.clone());
    }
    if !event.contains(TIMESTAMP) {
        event.insert(TIMESTAMP, timestamp_millis());
    }
}

/// Checks that `event` carries the fields required by the ingestion API.
pub fn validate(event: &Event) -> Result<(), ValidationError> {
    require_non_blank(event, SOURCE_ID)?;

    let timestamp = event
        .get(TIMESTAMP)
        .and_then(Value::as_i64)
        .ok_or(ValidationError::MissingField {
            field: TIMESTAMP,
            expected: "integer",
        })?;
    if timestamp < 0 {
        return Err(ValidationError::NegativeTimestamp(timestamp));
    }

    require_non_blank(event, EVENT_NAME)?;
    Ok(())
}

/// Validates every event, stopping at the first invalid one.
pub fn validate_batch(events: &[Event]) -> Result<(), ValidationError> {
    events.iter().try_for_each(validate)
}

fn require_non_blank(event: &Event, field: &'static str) -> Result<(), ValidationError> {
    let value = event
        .get(field)
        .and_then(Value::as_str)
        .ok_or(ValidationError::MissingField {
            field,
            expected: "string",
        })?;
    if value.trim().is_empty() {
        return Err(ValidationError::BlankField { field });
    }
    Ok(())
}
