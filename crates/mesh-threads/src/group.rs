//! Two-phase grouping: explicit correlation ids first, then time gaps.

use std::collections::HashMap;

use chrono::Duration;
use mesh_types::Event;
use tracing::trace;

/// A candidate thread before summarizing.
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    pub thread_id: String,
    pub events: Vec<Event>,
}

/// Partition time-ordered `events` into groups.
///
/// Events with a correlation id form one group per id (`ctx:<id>`). The
/// rest are split wherever two consecutive events are more than `max_gap`
/// apart (`session_<n>`, numbered from 1 in time order). Relative order is
/// preserved inside every group.
pub fn group_events(events: Vec<Event>, max_gap: Duration) -> Vec<Group> {
    let mut explicit: Vec<Group> = Vec::new();
    let mut by_key: HashMap<String, usize> = HashMap::new();
    let mut ungrouped: Vec<Event> = Vec::new();

    for event in events {
        match event.grouping_key().map(String::from) {
            Some(key) => {
                let index = *by_key.entry(key.clone()).or_insert_with(|| {
                    explicit.push(Group {
                        thread_id: format!("ctx:{key}"),
                        events: Vec::new(),
                    });
                    explicit.len() - 1
                });
                explicit[index].events.push(event);
            }
            None => ungrouped.push(event),
        }
    }

    let mut groups = explicit;
    groups.extend(split_on_gaps(ungrouped, max_gap));
    groups
}

fn split_on_gaps(events: Vec<Event>, max_gap: Duration) -> Vec<Group> {
    let mut groups: Vec<Group> = Vec::new();
    let mut current: Vec<Event> = Vec::new();

    for event in events {
        if let Some(last) = current.last() {
            let gap = event.timestamp - last.timestamp;
            if gap > max_gap {
                trace!(gap_secs = gap.num_seconds(), "Time gap boundary");
                groups.push(session_group(groups.len() + 1, std::mem::take(&mut current)));
            }
        }
        current.push(event);
    }
    if !current.is_empty() {
        groups.push(session_group(groups.len() + 1, current));
    }
    groups
}

fn session_group(n: usize, events: Vec<Event>) -> Group {
    Group {
        thread_id: format!("session_{n}"),
        events,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn at(secs: i64, payload: &str) -> Event {
        Event::new("a", "X", payload)
            .with_id(payload)
            .with_timestamp(Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap())
    }

    fn ids(group: &Group) -> Vec<&str> {
        group.events.iter().map(|e| e.id.as_str()).collect()
    }

    #[test]
    fn test_time_gap_boundaries() {
        let events = vec![at(0, "a"), at(30, "b"), at(1200, "c"), at(1300, "d")];
        let groups = group_events(events, Duration::seconds(300));

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].thread_id, "session_1");
        assert_eq!(ids(&groups[0]), vec!["a", "b"]);
        assert_eq!(groups[1].thread_id, "session_2");
        assert_eq!(ids(&groups[1]), vec!["c", "d"]);
    }

    #[test]
    fn test_gap_equal_to_threshold_stays_together() {
        let groups = group_events(vec![at(0, "a"), at(300, "b")], Duration::seconds(300));
        assert_eq!(groups.len(), 1);
    }

    #[test]
    fn test_correlation_ids_group_across_gaps() {
        let events = vec![
            at(0, "a").with_correlation_id("plan"),
            at(10, "b"),
            at(5000, "c").with_correlation_id("plan"),
            at(5010, "d").with_correlation_id("unknown"),
            at(5020, "e").with_correlation_id(""),
        ];
        let groups = group_events(events, Duration::seconds(300));

        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0].thread_id, "ctx:plan");
        assert_eq!(ids(&groups[0]), vec!["a", "c"]);
        // Sentinel and empty ids fall through to time-gap grouping
        assert_eq!(ids(&groups[1]), vec!["b"]);
        assert_eq!(ids(&groups[2]), vec!["d", "e"]);
    }

    #[test]
    fn test_empty_input() {
        assert!(group_events(Vec::new(), Duration::seconds(300)).is_empty());
    }
}
