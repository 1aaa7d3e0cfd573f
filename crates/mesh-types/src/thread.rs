//! Reconstructed conversation threads and topic clusters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event::{Event, Tier};

/// Where a thread stands, read from the highlight tags of its latest events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ThreadStatus {
    Blocked,
    Ready,
    #[default]
    Completed,
}

/// A stable change of domain tag inside a thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextShift {
    pub from_topic: String,
    pub to_topic: String,
    /// Position of the first event carrying the new tag
    pub index: usize,
}

/// A time-ordered group of events judged to be one conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thread {
    pub thread_id: String,

    pub start_time: DateTime<Utc>,

    pub end_time: DateTime<Utc>,

    /// `end_time - start_time` in seconds
    pub duration_secs: f64,

    pub message_count: usize,

    /// Distinct senders, sorted
    pub participants: Vec<String>,

    pub dominant_tier: Tier,

    pub dominant_domain_tag: String,

    #[serde(default)]
    pub final_status: ThreadStatus,

    #[serde(default)]
    pub context_shifts: Vec<ContextShift>,

    /// Member events in original order
    pub messages: Vec<Event>,
}

impl Thread {
    /// Serialize to a single JSON line (no trailing newline)
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json_line(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }

    /// Concatenated payload text of all member events.
    pub fn text(&self) -> String {
        self.messages
            .iter()
            .map(|m| m.payload.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// A named cluster of threads sharing a discovered topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Superthread {
    pub name: String,
    pub member_threads: Vec<Thread>,
}
