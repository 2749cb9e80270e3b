//! Document records and stream events

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::StoreError;

/// One document as returned by a store for a read action.
///
/// `exists: false` marks a document the store knows to be deleted; the merger
/// removes it from the module's data map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocRecord {
    pub id: String,
    pub data: Value,
    pub exists: bool,
}

impl DocRecord {
    pub fn existing<S: Into<String>>(id: S, data: Value) -> Self {
        Self {
            id: id.into(),
            data,
            exists: true,
        }
    }

    pub fn missing<S: Into<String>>(id: S) -> Self {
        Self {
            id: id.into(),
            data: Value::Null,
            exists: false,
        }
    }
}

/// Lifecycle of a document inside an open stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamEventKind {
    Added,
    Modified,
    Removed,
}

impl StreamEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamEventKind::Added => "added",
            StreamEventKind::Modified => "modified",
            StreamEventKind::Removed => "removed",
        }
    }
}

/// One incremental change delivered by a store's open stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamEvent {
    pub kind: StreamEventKind,
    pub record: DocRecord,
}

impl StreamEvent {
    pub fn added(record: DocRecord) -> Self {
        Self {
            kind: StreamEventKind::Added,
            record,
        }
    }

    pub fn modified(record: DocRecord) -> Self {
        Self {
            kind: StreamEventKind::Modified,
            record,
        }
    }

    pub fn removed<S: Into<String>>(id: S) -> Self {
        Self {
            kind: StreamEventKind::Removed,
            record: DocRecord::missing(id),
        }
    }
}

/// What a store driver sends over its stream channel.
///
/// Dropping the sender signals clean stream completion; `Error` signals a
/// driver-side failure after the stream was opened.
#[derive(Debug)]
pub enum StreamMessage {
    Event(StreamEvent),
    Error(StoreError),
}
