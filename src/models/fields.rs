//! Typed access to stored hash fields
//!
//! Hashes come back from the store as `String -> String`. A field that is
//! missing reads as its default; a field that is present but does not parse is
//! logged and also read as its default, so one bad write never poisons a read.

use crate::error::{QueueMetricsError, QueueMetricsResult};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::str::FromStr;
use tracing::warn;

/// Reads typed values out of one stored hash
pub struct FieldReader<'a> {
    key: &'a str,
    fields: &'a HashMap<String, String>,
}

impl<'a> FieldReader<'a> {
    pub fn new(key: &'a str, fields: &'a HashMap<String, String>) -> Self {
        Self { key, fields }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn string(&self, field: &str) -> Option<String> {
        self.fields
            .get(field)
            .filter(|value| !value.is_empty())
            .cloned()
    }

    pub fn string_or(&self, field: &str, default: &str) -> String {
        self.string(field).unwrap_or_else(|| default.to_string())
    }

    pub fn u64(&self, field: &str) -> u64 {
        self.parsed(field).unwrap_or(0)
    }

    pub fn f64(&self, field: &str) -> f64 {
        self.parsed::<f64>(field)
            .filter(|value| value.is_finite())
            .unwrap_or(0.0)
    }

    pub fn bool(&self, field: &str) -> bool {
        match self.fields.get(field).map(String::as_str) {
            Some("1") | Some("true") => true,
            Some("0") | Some("false") | Some("") | None => false,
            Some(other) => {
                self.malformed(field, other);
                false
            }
        }
    }

    /// Unix-seconds timestamp field
    pub fn timestamp(&self, field: &str) -> Option<DateTime<Utc>> {
        let seconds: i64 = self.parsed(field)?;
        let parsed = DateTime::from_timestamp(seconds, 0);
        if parsed.is_none() {
            self.malformed(field, &seconds.to_string());
        }
        parsed
    }

    /// Parse a field with `FromStr`, logging values that fail to parse.
    pub fn parsed<T: FromStr>(&self, field: &str) -> Option<T> {
        self.try_parsed(field).unwrap_or_else(|error| {
            warn!(error = %error, "Malformed stored field, using default");
            None
        })
    }

    /// Strict variant of [`parsed`](Self::parsed): a present value that does
    /// not parse is a [`QueueMetricsError::MalformedSample`].
    ///
    /// Integer fields written by float increments (e.g. `"3.0"`) are accepted.
    pub fn try_parsed<T: FromStr>(&self, field: &str) -> QueueMetricsResult<Option<T>> {
        let Some(raw) = self.fields.get(field).filter(|raw| !raw.is_empty()) else {
            return Ok(None);
        };
        if let Ok(value) = raw.parse::<T>() {
            return Ok(Some(value));
        }
        raw.parse::<f64>()
            .ok()
            .filter(|value| value.is_finite() && value.fract() == 0.0)
            .and_then(|value| format!("{value:.0}").parse::<T>().ok())
            .map(Some)
            .ok_or_else(|| self.malformed_error(field, raw))
    }

    fn malformed_error(&self, field: &str, raw: &str) -> QueueMetricsError {
        QueueMetricsError::malformed_sample(self.key, format!("field '{field}' has unparseable value '{raw}'"))
    }

    fn malformed(&self, field: &str, raw: &str) {
        warn!(error = %self.malformed_error(field, raw), "Malformed stored field, using default");
    }
}

/// Builds the `(field, value)` list for a hash write
#[derive(Debug, Default)]
pub struct FieldWriter {
    fields: Vec<(String, String)>,
}

impl FieldWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(mut self, field: &str, value: impl ToString) -> Self {
        self.fields.push((field.to_string(), value.to_string()));
        self
    }

    /// Skip the field entirely when absent
    pub fn put_opt(self, field: &str, value: Option<impl ToString>) -> Self {
        match value {
            Some(value) => self.put(field, value),
            None => self,
        }
    }

    pub fn put_timestamp(self, field: &str, value: DateTime<Utc>) -> Self {
        self.put(field, value.timestamp())
    }

    pub fn put_opt_timestamp(self, field: &str, value: Option<DateTime<Utc>>) -> Self {
        self.put_opt(field, value.map(|v| v.timestamp()))
    }

    pub fn build(self) -> Vec<(String, String)> {
        self.fields
    }
}

/// Drop sub-second precision so a value survives a unix-seconds round trip
pub fn truncate_to_seconds(value: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp(value.timestamp(), 0).unwrap_or(value)
}
