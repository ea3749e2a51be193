//! Normalized change events and the downstream sink.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::mpsc;

use crate::error::Error;

/// Field names owned by the event itself; decoration may not overwrite them.
pub const RESERVED_FIELDS: &[&str] = &["db", "table", "old_val", "new_val", "@timestamp", "tags"];

/// One row change, reshaped for the downstream consumer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeEvent {
    /// Database of the changed table.
    pub db: String,
    /// Changed table.
    pub table: String,
    /// Row before the change; null for inserts and backfill.
    pub old_val: Option<Value>,
    /// Row after the change; null for deletes.
    pub new_val: Option<Value>,
    /// When the event was received.
    #[serde(rename = "@timestamp")]
    pub timestamp: DateTime<Utc>,
    /// Tags added by decoration.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Extra fields added by decoration.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl ChangeEvent {
    /// Create an undecorated event stamped with the current time.
    pub fn new(
        db: impl Into<String>,
        table: impl Into<String>,
        old_val: Option<Value>,
        new_val: Option<Value>,
    ) -> Self {
        Self {
            db: db.into(),
            table: table.into(),
            old_val,
            new_val,
            timestamp: Utc::now(),
            tags: Vec::new(),
            fields: Map::new(),
        }
    }
}

/// Decoration applied to every event before it reaches the sink.
#[derive(Debug, Clone, Default)]
pub struct Decorator {
    tags: Vec<String>,
    fields: Map<String, Value>,
}

impl Decorator {
    /// Create a decorator. Fields may not use a reserved name.
    pub fn new(tags: Vec<String>, fields: Vec<(String, Value)>) -> Result<Self, Error> {
        let mut map = Map::new();
        for (name, value) in fields {
            if RESERVED_FIELDS.contains(&name.as_str()) {
                return Err(Error::Config(format!("field '{}' is reserved", name)));
            }
            map.insert(name, value);
        }

        let mut unique = Vec::with_capacity(tags.len());
        for tag in tags {
            if !unique.contains(&tag) {
                unique.push(tag);
            }
        }

        Ok(Self {
            tags: unique,
            fields: map,
        })
    }

    /// Whether decoration changes anything.
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty() && self.fields.is_empty()
    }

    /// Add the configured tags and fields to an event.
    pub fn decorate(&self, event: &mut ChangeEvent) {
        for tag in &self.tags {
            if !event.tags.contains(tag) {
                event.tags.push(tag.clone());
            }
        }
        for (name, value) in &self.fields {
            event.fields.insert(name.clone(), value.clone());
        }
    }
}

/// Downstream consumer of change events.
pub trait EventSink {
    /// Hand one event to the consumer.
    fn send(&mut self, event: ChangeEvent) -> Result<(), Error>;
}

impl EventSink for mpsc::UnboundedSender<ChangeEvent> {
    fn send(&mut self, event: ChangeEvent) -> Result<(), Error> {
        mpsc::UnboundedSender::send(self, event).map_err(|_| Error::SinkClosed)
    }
}

impl EventSink for Vec<ChangeEvent> {
    fn send(&mut self, event: ChangeEvent) -> Result<(), Error> {
        self.push(event);
        Ok(())
    }
}
