//! Offline readers over a session log file.
//!
//! These never touch a recorder's open handles; they read whatever is on
//! disk and skip lines that do not decode as events.

use mesh_types::Event;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use tracing::debug;

use crate::error::StorageError;

/// Events decoded from a log file.
#[derive(Debug, Clone, Default)]
pub struct LogRead {
    pub events: Vec<Event>,
    /// Non-empty lines that did not decode
    pub malformed: usize,
}

/// Decode every line of a session log.
///
/// A missing file reads as empty.
pub fn read_session_events(path: &Path) -> Result<LogRead, StorageError> {
    if !path.exists() {
        return Ok(LogRead::default());
    }

    let content = fs::read(path)?;
    let text = String::from_utf8_lossy(&content);

    let mut read = LogRead::default();
    for line in text.lines().filter(|l| !l.trim().is_empty()) {
        match serde_json::from_str::<Event>(line) {
            Ok(event) => read.events.push(event),
            Err(e) => {
                debug!(error = %e, "Skipping malformed log line");
                read.malformed += 1;
            }
        }
    }
    Ok(read)
}

/// The last `n` events of the log, oldest first.
pub fn recent(path: &Path, n: usize) -> Result<Vec<Event>, StorageError> {
    let mut events = read_session_events(path)?.events;
    let skip = events.len().saturating_sub(n);
    Ok(events.split_off(skip))
}

/// Case-insensitive substring search over payload and sender.
///
/// Returns at most `limit` matches, newest first.
pub fn search(path: &Path, query: &str, limit: usize) -> Result<Vec<Event>, StorageError> {
    let needle = query.to_lowercase();
    let events = read_session_events(path)?.events;
    Ok(events
        .into_iter()
        .rev()
        .filter(|e| {
            e.payload.to_lowercase().contains(&needle) || e.sender.to_lowercase().contains(&needle)
        })
        .take(limit)
        .collect())
}

/// Summary of a session log.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionStats {
    pub message_count: usize,
    pub malformed_lines: usize,
    pub size_bytes: u64,
    pub senders: BTreeSet<String>,
    pub by_domain: BTreeMap<String, usize>,
    pub by_tier: BTreeMap<String, usize>,
    pub duplicates: usize,
}

impl SessionStats {
    pub fn compute(path: &Path) -> Result<Self, StorageError> {
        let read = read_session_events(path)?;
        let size_bytes = fs::metadata(path).map(|m| m.len()).unwrap_or(0);

        let mut stats = SessionStats {
            message_count: read.events.len(),
            malformed_lines: read.malformed,
            size_bytes,
            ..Default::default()
        };

        for event in &read.events {
            stats.senders.insert(event.sender.clone());
            *stats
                .by_domain
                .entry(event.metadata.domain_tag.clone())
                .or_default() += 1;
            *stats
                .by_tier
                .entry(event.metadata.tier.to_string())
                .or_default() += 1;
            if event.metadata.duplicate_of.is_some() {
                stats.duplicates += 1;
            }
        }

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_log(dir: &TempDir, events: &[Event], extra: &[&str]) -> std::path::PathBuf {
        let path = dir.path().join("current_session.jsonl");
        let mut file = fs::File::create(&path).unwrap();
        for event in events {
            writeln!(file, "{}", serde_json::to_string(event).unwrap()).unwrap();
        }
        for line in extra {
            writeln!(file, "{line}").unwrap();
        }
        path
    }

    fn event(sender: &str, payload: &str, domain: &str) -> Event {
        let mut event = Event::new(sender, "general", payload);
        event.metadata.domain_tag = domain.to_string();
        event
    }

    #[test]
    fn test_read_counts_malformed() {
        let temp = TempDir::new().unwrap();
        let path = write_log(&temp, &[event("a", "hi", "ui_ux")], &["{broken", ""]);

        let read = read_session_events(&path).unwrap();
        assert_eq!(read.events.len(), 1);
        assert_eq!(read.malformed, 1);
    }

    #[test]
    fn test_read_missing_file() {
        let temp = TempDir::new().unwrap();
        let read = read_session_events(&temp.path().join("none.jsonl")).unwrap();
        assert!(read.events.is_empty());
    }

    #[test]
    fn test_recent_returns_tail_in_order() {
        let temp = TempDir::new().unwrap();
        let events: Vec<_> = (0..5).map(|i| event("a", &format!("m{i}"), "ui_ux")).collect();
        let path = write_log(&temp, &events, &[]);

        let tail = recent(&path, 2).unwrap();
        let payloads: Vec<_> = tail.iter().map(|e| e.payload.as_str()).collect();
        assert_eq!(payloads, vec!["m3", "m4"]);

        assert_eq!(recent(&path, 50).unwrap().len(), 5);
    }

    #[test]
    fn test_search_matches_payload_and_sender() {
        let temp = TempDir::new().unwrap();
        let path = write_log(
            &temp,
            &[
                event("pm_alpha", "Cache layer design", "data_management"),
                event("gemini_cli", "unrelated", "ui_ux"),
                event("claude", "the CACHE is warm", "data_management"),
            ],
            &[],
        );

        let hits = search(&path, "cache", 10).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].sender, "claude");

        assert_eq!(search(&path, "GEMINI", 10).unwrap().len(), 1);
        assert_eq!(search(&path, "cache", 1).unwrap().len(), 1);
    }

    #[test]
    fn test_stats() {
        let temp = TempDir::new().unwrap();
        let mut dup = event("b", "same", "ui_ux");
        dup.metadata.duplicate_of = Some("x".to_string());
        let path = write_log(
            &temp,
            &[event("a", "one", "ui_ux"), dup, event("a", "two", "data_management")],
            &["nope"],
        );

        let stats = SessionStats::compute(&path).unwrap();
        assert_eq!(stats.message_count, 3);
        assert_eq!(stats.malformed_lines, 1);
        assert_eq!(stats.senders.len(), 2);
        assert_eq!(stats.by_domain.get("ui_ux"), Some(&2));
        assert_eq!(stats.by_tier.get("execution"), Some(&3));
        assert_eq!(stats.duplicates, 1);
        assert!(stats.size_bytes > 0);
    }
}
