//! Checkpoint document: an immutable snapshot of the session log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event::Event;

/// Labeled point-in-time copy of the session log.
///
/// `messages` holds the raw log records so that a checkpoint taken from a
/// log with hand-edited or partially malformed entries still round-trips.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub checkpoint_id: String,
    pub timestamp: DateTime<Utc>,
    pub label: String,
    pub message_count: usize,
    /// Size of the session log at snapshot time
    pub size_bytes: u64,
    pub messages: Vec<serde_json::Value>,
}

impl Checkpoint {
    /// Messages that decode as events; the rest are skipped.
    pub fn events(&self) -> Vec<Event> {
        self.messages
            .iter()
            .filter_map(|value| serde_json::from_value(value.clone()).ok())
            .collect()
    }
}
