//! Lenient loading of session logs and checkpoints.
//!
//! A bad record never aborts a load. Lines that are not JSON objects are
//! counted and skipped; records with missing fields get defaults, and an
//! unreadable timestamp becomes the Unix epoch (counted as an anomaly).

use std::fs;
use std::path::Path;

use chrono::{DateTime, NaiveDateTime, Utc};
use mesh_types::{Event, EventMetadata, DEFAULT_TOPIC, UNKNOWN};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::ReconstructError;

/// Timestamp given to records whose own timestamp is missing or unreadable.
pub const SENTINEL_TIMESTAMP: DateTime<Utc> = DateTime::<Utc>::UNIX_EPOCH;

/// What kind of file was loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputKind {
    #[default]
    SessionLog,
    Checkpoint,
}

/// Events read from one input file, in file order.
#[derive(Debug, Clone, Default)]
pub struct LoadedLog {
    pub kind: InputKind,
    pub events: Vec<Event>,
    /// Records seen, malformed ones included
    pub input_records: usize,
    pub malformed_lines: usize,
    pub timestamp_anomalies: usize,
}

/// Load a JSONL session log or a checkpoint document.
pub fn load_events(path: &Path) -> Result<LoadedLog, ReconstructError> {
    if !path.exists() {
        return Err(ReconstructError::NotFound(path.display().to_string()));
    }
    let content = fs::read(path)?;

    let mut loaded = LoadedLog::default();
    let records: Vec<Option<Value>> = match checkpoint_messages(&content) {
        Some(messages) => {
            loaded.kind = InputKind::Checkpoint;
            messages.into_iter().map(Some).collect()
        }
        // Lines are decoded one by one so bad bytes only cost their own line
        None => non_blank_lines(&content)
            .map(|line| serde_json::from_slice::<Value>(line).ok())
            .collect(),
    };

    for (index, record) in records.into_iter().enumerate() {
        loaded.input_records += 1;
        match record {
            Some(Value::Object(obj)) => {
                let (event, anomaly) = lenient_event(&obj, index + 1);
                if anomaly {
                    loaded.timestamp_anomalies += 1;
                }
                loaded.events.push(event);
            }
            _ => loaded.malformed_lines += 1,
        }
    }

    debug!(
        path = %path.display(),
        kind = ?loaded.kind,
        records = loaded.input_records,
        malformed = loaded.malformed_lines,
        "Loaded input"
    );
    Ok(loaded)
}

/// Non-empty lines of raw file content, without their terminators.
pub(crate) fn non_blank_lines(content: &[u8]) -> impl Iterator<Item = &[u8]> {
    content
        .split(|b| *b == b'\n')
        .filter(|line| !line.iter().all(u8::is_ascii_whitespace))
}

/// The `messages` array when `content` is a single checkpoint document.
fn checkpoint_messages(content: &[u8]) -> Option<Vec<Value>> {
    if content.iter().find(|b| !b.is_ascii_whitespace()) != Some(&b'{') {
        return None;
    }
    match serde_json::from_slice::<Value>(content).ok()? {
        Value::Object(mut obj) if obj.contains_key("checkpoint_id") => match obj.remove("messages")
        {
            Some(Value::Array(messages)) => Some(messages),
            _ => None,
        },
        _ => None,
    }
}

fn text_field<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|key| obj.get(*key).and_then(Value::as_str))
        .find(|value| !value.is_empty())
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    // Naive ISO timestamps are taken as UTC
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Build an event from a loosely shaped record. Returns whether the
/// timestamp had to be replaced by the sentinel.
fn lenient_event(obj: &Map<String, Value>, position: usize) -> (Event, bool) {
    let timestamp = text_field(obj, &["timestamp", "Timestamp"]).and_then(parse_timestamp);
    let anomaly = timestamp.is_none();

    let payload = ["payload", "content", "Message", "message"]
        .iter()
        .find_map(|key| obj.get(*key))
        .map(|value| match value {
            Value::String(text) => text.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        })
        .unwrap_or_default();

    let metadata = ["metadata", "Metadata"]
        .iter()
        .find_map(|key| obj.get(*key))
        .and_then(|value| serde_json::from_value::<EventMetadata>(value.clone()).ok())
        .unwrap_or_default();

    let event = Event {
        id: text_field(obj, &["id", "message_id", "Id"])
            .map(String::from)
            .unwrap_or_else(|| format!("record_{position}")),
        timestamp: timestamp.unwrap_or(SENTINEL_TIMESTAMP),
        sender: text_field(obj, &["sender", "sender_id", "SpeakerName"])
            .unwrap_or(UNKNOWN)
            .to_string(),
        sender_role: text_field(obj, &["sender_role", "SpeakerRole"]).map(String::from),
        topic: text_field(obj, &["topic"])
            .unwrap_or(DEFAULT_TOPIC)
            .to_string(),
        correlation_id: text_field(obj, &["correlation_id", "context_id", "ContextId"])
            .map(String::from),
        payload,
        metadata,
    };
    (event, anomaly)
}
