//! Changefeed row classification.
//!
//! A changefeed opened with `include_states` and `include_initial` mixes four
//! row shapes in its batches: lifecycle states, initial values, changes and
//! per-record errors.

use serde_json::Value;

/// One row delivered by a changefeed.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedRow {
    /// `{"state": "initializing" | "ready"}`
    State(String),
    /// An existing row delivered during backfill.
    Initial(Value),
    /// A change; `None` stands for a missing or null side.
    Change {
        old: Option<Value>,
        new: Option<Value>,
    },
    /// A non-fatal error reported in place of a row (the feed continues).
    Error(String),
}

impl FeedRow {
    /// Classify a raw row.
    pub fn classify(row: Value) -> FeedRow {
        let mut map = match row {
            Value::Object(map) => map,
            other => return FeedRow::Error(format!("unexpected changefeed row: {other}")),
        };

        if let Some(state) = map.remove("state") {
            return FeedRow::State(match state {
                Value::String(s) => s,
                other => other.to_string(),
            });
        }

        if let Some(error) = map.remove("error") {
            return FeedRow::Error(match error {
                Value::String(s) => s,
                other => other.to_string(),
            });
        }

        let new = map.remove("new_val").and_then(non_null);
        match map.remove("old_val") {
            Some(old) => FeedRow::Change {
                old: non_null(old),
                new,
            },
            None => match new {
                Some(value) => FeedRow::Initial(value),
                None => FeedRow::Error(format!(
                    "changefeed row without values: {}",
                    Value::Object(map)
                )),
            },
        }
    }
}

fn non_null(value: Value) -> Option<Value> {
    if value.is_null() {
        None
    } else {
        Some(value)
    }
}
