use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{PipelineError, Result};

/// The most recent detection hit, decoded from one search result row.
///
/// `timestamp` is the deduplication key: two records describe the same alert
/// iff their timestamps are equal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertRecord {
    /// Windows event id, never zero.
    pub event_code: u32,
    /// Reporting host; empty when the row has none.
    pub host: String,
    /// Event provider, e.g. `Microsoft-Windows-Security-Auditing`.
    pub source_name: String,
    /// Raw `_time` value as returned by the search.
    pub timestamp: String,
}

impl AlertRecord {
    /// Decode a Splunk JSON result row (`EventCode`, `host`, `SourceName`,
    /// `_time`).
    ///
    /// Splunk renders every field as a string, but numbers are accepted too.
    /// Multi-value fields arrive as arrays; the first value wins.
    pub fn from_search_row(row: &Value) -> Result<Self> {
        let Some(fields) = row.as_object() else {
            return Err(PipelineError::MalformedData(
                "result row is not an object".to_string(),
            ));
        };

        let raw_code = fields
            .get("EventCode")
            .and_then(scalar)
            .ok_or_else(|| PipelineError::MalformedData("row has no EventCode".to_string()))?;
        let event_code = match raw_code.trim().parse::<u32>() {
            Ok(0) => {
                return Err(PipelineError::MalformedData(
                    "EventCode 0 is not a valid event".to_string(),
                ));
            }
            Ok(code) => code,
            Err(_) => {
                return Err(PipelineError::MalformedData(format!(
                    "EventCode `{raw_code}` is not numeric"
                )));
            }
        };

        let timestamp = fields
            .get("_time")
            .and_then(scalar)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| PipelineError::MalformedData("row has no _time".to_string()))?;

        Ok(Self {
            event_code,
            host: fields.get("host").and_then(scalar).unwrap_or_default(),
            source_name: fields.get("SourceName").and_then(scalar).unwrap_or_default(),
            timestamp,
        })
    }

    /// Dedup key for this record.
    pub fn dedup_key(&self) -> &str {
        &self.timestamp
    }
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(values) => values.first().and_then(scalar),
        _ => None,
    }
}
