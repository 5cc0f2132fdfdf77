//! # Catalog Events
//!
//! Outcomes the screen broadcasts to observers (the server's SSE stream).

use crate::model::CatalogEntry;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of catalog event
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CatalogEventKind {
    /// A snapshot replaced the entry list
    SnapshotApplied,
    /// A new entry was written
    EntryCreated,
    /// An existing entry was overwritten
    EntryUpdated,
    /// An entry was removed
    EntryDeleted,
    /// The user cancelled a delete
    DeleteCancelled,
    /// A store operation or the live listener failed
    OperationFailed,
}

/// An event on the catalog screen
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogEvent {
    pub timestamp: DateTime<Utc>,
    pub kind: CatalogEventKind,
    /// Entry the event concerns
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_id: Option<String>,
    /// Full list after a snapshot
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entries: Option<Vec<CatalogEntry>>,
    /// Failure description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CatalogEvent {
    pub fn new(kind: CatalogEventKind) -> Self {
        Self {
            timestamp: Utc::now(),
            kind,
            entry_id: None,
            entries: None,
            error: None,
        }
    }

    pub fn with_entry(mut self, id: &str) -> Self {
        self.entry_id = Some(id.to_string());
        self
    }

    pub fn with_entries(mut self, entries: Vec<CatalogEntry>) -> Self {
        self.entries = Some(entries);
        self
    }

    pub fn with_error(mut self, error: impl ToString) -> Self {
        self.error = Some(error.to_string());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = CatalogEvent::new(CatalogEventKind::EntryDeleted).with_entry("42");
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["kind"], "entry_deleted");
        assert_eq!(json["entry_id"], "42");
        assert!(json.get("entries").is_none());
    }
}
