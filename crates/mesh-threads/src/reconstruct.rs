//! End-to-end reconstruction pass.

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use chrono::Duration;
use mesh_types::{Event, ReconstructSettings, Thread};
use tracing::{debug, info};

use crate::error::ReconstructError;
use crate::group::group_events;
use crate::load::{load_events, non_blank_lines};
use crate::summary::summarize;

/// Counters for one reconstruction run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconstructionReport {
    pub input_records: usize,
    pub malformed_lines: usize,
    pub timestamp_anomalies: usize,
    /// Records dropped as repeats: same id, same content hash, or flagged by the recorder
    pub duplicates_dropped: usize,
    pub threads_built: usize,
    /// Threads below the minimum size or duration
    pub threads_filtered: usize,
    pub threads_emitted: usize,
}

/// Groups events into threads and filters out insignificant ones.
#[derive(Debug, Clone)]
pub struct Reconstructor {
    settings: ReconstructSettings,
}

impl Reconstructor {
    pub fn new(settings: ReconstructSettings) -> Result<Self, ReconstructError> {
        settings
            .validate()
            .map_err(ReconstructError::InvalidSettings)?;
        Ok(Self { settings })
    }

    /// Reconstruct threads from events in log order.
    ///
    /// Output is sorted by start time and depends only on the input, so
    /// running twice over the same events gives identical threads.
    pub fn reconstruct(&self, events: Vec<Event>) -> (Vec<Thread>, ReconstructionReport) {
        let mut report = ReconstructionReport::default();

        // First occurrence in log order wins
        let mut seen_ids = HashSet::new();
        let mut seen_hashes = HashSet::new();
        let mut unique: Vec<Event> = Vec::with_capacity(events.len());
        for event in events {
            let hash = event.metadata.content_hash.as_str();
            let repeat = event.metadata.duplicate_of.is_some()
                || seen_ids.contains(&event.id)
                || (!hash.is_empty() && seen_hashes.contains(hash));
            if repeat {
                report.duplicates_dropped += 1;
                continue;
            }
            seen_ids.insert(event.id.clone());
            if !hash.is_empty() {
                seen_hashes.insert(hash.to_string());
            }
            unique.push(event);
        }

        // Stable: equal timestamps keep log order
        unique.sort_by_key(|e| e.timestamp);

        let max_gap = Duration::seconds(i64::try_from(self.settings.max_gap_secs).unwrap_or(i64::MAX));
        let min_duration = self.settings.min_duration_secs as f64;

        let mut threads = Vec::new();
        for group in group_events(unique, max_gap) {
            let Some(thread) = summarize(group, self.settings.stability_window) else {
                continue;
            };
            report.threads_built += 1;

            if thread.message_count < self.settings.min_messages
                || thread.duration_secs < min_duration
            {
                debug!(
                    thread_id = %thread.thread_id,
                    messages = thread.message_count,
                    duration_secs = thread.duration_secs,
                    "Thread below significance threshold"
                );
                report.threads_filtered += 1;
                continue;
            }
            threads.push(thread);
        }

        threads.sort_by(|a, b| {
            a.start_time
                .cmp(&b.start_time)
                .then_with(|| a.thread_id.cmp(&b.thread_id))
        });
        report.threads_emitted = threads.len();
        (threads, report)
    }

    /// Load `input` (session log or checkpoint), reconstruct, and write one
    /// thread per line to `output`.
    pub fn run(&self, input: &Path, output: &Path) -> Result<ReconstructionReport, ReconstructError> {
        let loaded = load_events(input)?;
        let (threads, mut report) = self.reconstruct(loaded.events);
        report.input_records = loaded.input_records;
        report.malformed_lines = loaded.malformed_lines;
        report.timestamp_anomalies = loaded.timestamp_anomalies;

        write_threads(output, &threads)?;

        info!(
            input = %input.display(),
            output = %output.display(),
            records = report.input_records,
            malformed = report.malformed_lines,
            anomalies = report.timestamp_anomalies,
            duplicates = report.duplicates_dropped,
            built = report.threads_built,
            emitted = report.threads_emitted,
            "Reconstruction complete"
        );
        Ok(report)
    }
}

/// Write threads as JSON lines through a temp file and rename.
pub fn write_threads(path: &Path, threads: &[Thread]) -> Result<(), ReconstructError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| ReconstructError::NotFound(path.display().to_string()))?;
    let temp_path = path.with_file_name(format!(".{file_name}.tmp"));

    {
        let mut writer = BufWriter::new(File::create(&temp_path)?);
        for thread in threads {
            writer.write_all(thread.to_json_line()?.as_bytes())?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        writer.get_ref().sync_all()?;
    }
    fs::rename(&temp_path, path)?;
    Ok(())
}

/// Read threads written by [`write_threads`]. Unreadable lines are skipped.
pub fn read_threads(path: &Path) -> Result<(Vec<Thread>, usize), ReconstructError> {
    if !path.exists() {
        return Err(ReconstructError::NotFound(path.display().to_string()));
    }
    let content = fs::read(path)?;

    let mut threads = Vec::new();
    let mut malformed = 0;
    for line in non_blank_lines(&content) {
        let parsed = std::str::from_utf8(line)
            .map_err(|e| e.to_string())
            .and_then(|text| Thread::from_json_line(text).map_err(|e| e.to_string()));
        match parsed {
            Ok(thread) => threads.push(thread),
            Err(e) => {
                malformed += 1;
                debug!(error = %e, "Skipping unreadable thread line");
            }
        }
    }
    Ok((threads, malformed))
}
