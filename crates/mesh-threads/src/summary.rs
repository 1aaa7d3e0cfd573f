//! Thread summaries.

use std::collections::{BTreeSet, HashMap};
use std::hash::Hash;

use mesh_types::{ContextShift, Event, Thread, ThreadStatus, Tier, UNKNOWN};

use crate::group::Group;

const BLOCKED_TAG: &str = "@Status-Blocked";
const READY_TAG: &str = "@Status-Ready";

/// Summarize a non-empty group into a [`Thread`]. Returns `None` for an
/// empty group.
pub fn summarize(group: Group, stability_window: usize) -> Option<Thread> {
    let first = group.events.first()?;
    let last = group.events.last()?;
    let start_time = first.timestamp;
    let end_time = last.timestamp;

    let participants: BTreeSet<&str> = group.events.iter().map(|e| e.sender.as_str()).collect();
    let tiers: Vec<Tier> = group.events.iter().map(|e| e.metadata.tier).collect();
    let domains: Vec<&str> = group
        .events
        .iter()
        .map(|e| e.metadata.domain_tag.as_str())
        .collect();

    Some(Thread {
        thread_id: group.thread_id,
        start_time,
        end_time,
        duration_secs: (end_time - start_time).num_milliseconds() as f64 / 1000.0,
        message_count: group.events.len(),
        participants: participants.into_iter().map(String::from).collect(),
        dominant_tier: dominant(&tiers).unwrap_or_default(),
        dominant_domain_tag: dominant(&domains).unwrap_or(UNKNOWN).to_string(),
        final_status: final_status(&group.events),
        context_shifts: context_shifts(&domains, stability_window),
        messages: group.events,
    })
}

/// Most frequent value; ties go to the value seen first.
pub fn dominant<T: Copy + Eq + Hash>(values: &[T]) -> Option<T> {
    let mut counts: HashMap<T, usize> = HashMap::new();
    for value in values {
        *counts.entry(*value).or_default() += 1;
    }

    let mut best: Option<(T, usize)> = None;
    for value in values {
        let count = counts[value];
        if best.map_or(true, |(_, top)| count > top) {
            best = Some((*value, count));
        }
    }
    best.map(|(value, _)| value)
}

/// Domain changes that hold for at least `window` consecutive events.
///
/// A tag that appears for fewer than `window` events in a row is treated
/// as noise and does not become the current tag.
pub fn context_shifts(tags: &[&str], window: usize) -> Vec<ContextShift> {
    let window = window.max(1);
    let Some(mut current) = tags.first().copied() else {
        return Vec::new();
    };

    let mut shifts = Vec::new();
    let mut index = 1;
    while index + window <= tags.len() {
        let candidate = tags[index];
        if candidate != current && tags[index..index + window].iter().all(|t| *t == candidate) {
            shifts.push(ContextShift {
                from_topic: current.to_string(),
                to_topic: candidate.to_string(),
                index,
            });
            current = candidate;
        }
        index += 1;
    }
    shifts
}

/// Status from the latest event carrying a status highlight.
pub fn final_status(events: &[Event]) -> ThreadStatus {
    for event in events.iter().rev() {
        let tags = &event.metadata.highlight_tags;
        if tags.iter().any(|t| t == BLOCKED_TAG) {
            return ThreadStatus::Blocked;
        }
        if tags.iter().any(|t| t == READY_TAG) {
            return ThreadStatus::Ready;
        }
    }
    ThreadStatus::Completed
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn event(secs: i64, sender: &str, domain: &str, tier: Tier, tags: &[&str]) -> Event {
        let mut event = Event::new(sender, "X", "text")
            .with_timestamp(Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap());
        event.metadata.domain_tag = domain.to_string();
        event.metadata.tier = tier;
        event.metadata.highlight_tags = tags.iter().map(|t| t.to_string()).collect();
        event
    }

    #[test]
    fn test_summary_fields() {
        let group = Group {
            thread_id: "session_1".to_string(),
            events: vec![
                event(0, "gpt", "ui_ux", Tier::Execution, &[]),
                event(10, "claude", "ui_ux", Tier::Architectural, &["@Status-Blocked"]),
                event(25, "gpt", "data_management", Tier::Architectural, &["@Status-Ready"]),
            ],
        };

        let thread = summarize(group, 2).unwrap();
        assert_eq!(thread.message_count, 3);
        assert_eq!(thread.duration_secs, 25.0);
        assert_eq!(thread.participants, vec!["claude", "gpt"]);
        assert_eq!(thread.dominant_tier, Tier::Architectural);
        assert_eq!(thread.dominant_domain_tag, "ui_ux");
        assert_eq!(thread.final_status, ThreadStatus::Ready);
        assert!(thread.context_shifts.is_empty());
    }

    #[test]
    fn test_dominant_tie_goes_to_first_seen() {
        assert_eq!(dominant(&["b", "a", "a", "b"]), Some("b"));
        assert_eq!(dominant(&["a", "b", "b"]), Some("b"));
        assert_eq!(dominant::<&str>(&[]), None);
    }

    #[test]
    fn test_single_off_topic_event_is_not_a_shift() {
        let shifts = context_shifts(&["ui", "db", "ui", "ui"], 2);
        assert!(shifts.is_empty());
    }

    #[test]
    fn test_stable_shift_reported_once() {
        let shifts = context_shifts(&["ui", "ui", "db", "db", "db", "ui", "ui"], 2);
        assert_eq!(
            shifts,
            vec![
                ContextShift {
                    from_topic: "ui".to_string(),
                    to_topic: "db".to_string(),
                    index: 2,
                },
                ContextShift {
                    from_topic: "db".to_string(),
                    to_topic: "ui".to_string(),
                    index: 5,
                },
            ]
        );
    }

    #[test]
    fn test_shift_needs_full_window_before_end() {
        // The trailing "db" only lasts one event
        assert!(context_shifts(&["ui", "ui", "db"], 2).is_empty());
        assert_eq!(context_shifts(&["ui", "db"], 1).len(), 1);
    }

    #[test]
    fn test_final_status_scans_backwards() {
        let events = vec![
            event(0, "a", "x", Tier::Execution, &["@Status-Ready"]),
            event(1, "a", "x", Tier::Execution, &["@Status-Blocked"]),
            event(2, "a", "x", Tier::Execution, &["@Question-Open"]),
        ];
        assert_eq!(final_status(&events), ThreadStatus::Blocked);
        assert_eq!(final_status(&events[2..]), ThreadStatus::Completed);
    }
}
