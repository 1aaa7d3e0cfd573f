//! Crash recovery for the session/recovery log pair.
//!
//! Every append writes the recovery log first and the session log second,
//! syncing each. A crash can therefore leave:
//! - a torn trailing line in either file (no final newline), or
//! - entries in the recovery log that never reached the session log.
//!
//! Recovery truncates torn tails and re-appends the missing entries so the
//! two files are line-for-line mirrors again.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use tracing::{info, warn};

use crate::error::StorageError;
use crate::layout::LogLayout;

/// What crash recovery had to repair.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Complete lines in the session log after recovery
    pub session_lines: u64,
    /// Bytes of the session log after recovery
    pub session_bytes: u64,
    /// Entries copied from the recovery log into the session log
    pub recovered_entries: u64,
    /// Entries copied from the session log into the recovery log
    pub remirrored_entries: u64,
    /// Bytes dropped from torn trailing lines across both files
    pub truncated_bytes: u64,
}

/// Bring the session and recovery logs back into agreement.
pub fn recover(layout: &LogLayout) -> Result<RecoveryReport, StorageError> {
    let session_path = layout.session_path();
    let recovery_path = layout.recovery_path();

    let (session, torn_session) = load_complete_lines(&session_path)?;
    let (recovery, torn_recovery) = load_complete_lines(&recovery_path)?;

    let mut report = RecoveryReport {
        truncated_bytes: torn_session + torn_recovery,
        ..Default::default()
    };

    if torn_session > 0 {
        warn!(bytes = torn_session, path = %session_path.display(), "Truncated torn line");
    }
    if torn_recovery > 0 {
        warn!(bytes = torn_recovery, path = %recovery_path.display(), "Truncated torn line");
    }

    let session_count = session.len();
    let recovery_count = recovery.len();

    if recovery_count > session_count {
        append_lines(&session_path, &recovery[session_count..])?;
        report.recovered_entries = (recovery_count - session_count) as u64;
        info!(
            count = report.recovered_entries,
            "Recovered entries from crash recovery log"
        );
    } else if session_count > recovery_count {
        append_lines(&recovery_path, &session[recovery_count..])?;
        report.remirrored_entries = (session_count - recovery_count) as u64;
        warn!(
            count = report.remirrored_entries,
            "Recovery log was behind the session log, re-mirrored entries"
        );
    }

    report.session_lines = session_count.max(recovery_count) as u64;
    report.session_bytes = fs::metadata(&session_path).map(|m| m.len()).unwrap_or(0);

    Ok(report)
}

/// Read complete lines of a file, truncating any torn tail in place.
///
/// Returns the lines (without newlines) and the number of bytes truncated.
fn load_complete_lines(path: &Path) -> Result<(Vec<String>, u64), StorageError> {
    if !path.exists() {
        return Ok((Vec::new(), 0));
    }

    let bytes = fs::read(path)?;
    let complete_len = bytes
        .iter()
        .rposition(|b| *b == b'\n')
        .map(|pos| pos + 1)
        .unwrap_or(0);
    let torn = (bytes.len() - complete_len) as u64;

    if torn > 0 {
        let file = OpenOptions::new().write(true).open(path)?;
        file.set_len(complete_len as u64)?;
        file.sync_all()?;
    }

    let lines = String::from_utf8_lossy(&bytes[..complete_len])
        .lines()
        .map(String::from)
        .collect();

    Ok((lines, torn))
}

fn append_lines(path: &Path, lines: &[String]) -> Result<(), StorageError> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    for line in lines {
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;
    }
    file.sync_data()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup(session: &str, recovery: &str) -> (LogLayout, TempDir) {
        let temp = TempDir::new().unwrap();
        let layout = LogLayout::new(temp.path());
        layout.ensure_dirs().unwrap();
        fs::write(layout.session_path(), session).unwrap();
        fs::write(layout.recovery_path(), recovery).unwrap();
        (layout, temp)
    }

    #[test]
    fn test_clean_logs_untouched() {
        let (layout, _temp) = setup("{\"a\":1}\n{\"a\":2}\n", "{\"a\":1}\n{\"a\":2}\n");

        let report = recover(&layout).unwrap();

        assert_eq!(report.session_lines, 2);
        assert_eq!(report.recovered_entries, 0);
        assert_eq!(report.truncated_bytes, 0);
    }

    #[test]
    fn test_torn_session_line_is_truncated_and_recovered() {
        // Crash after the recovery write, mid-way through the session write
        let (layout, _temp) = setup("{\"a\":1}\n{\"a\"", "{\"a\":1}\n{\"a\":2}\n");

        let report = recover(&layout).unwrap();

        assert_eq!(report.truncated_bytes, 4);
        assert_eq!(report.recovered_entries, 1);
        assert_eq!(report.session_lines, 2);
        assert_eq!(
            fs::read_to_string(layout.session_path()).unwrap(),
            "{\"a\":1}\n{\"a\":2}\n"
        );
    }

    #[test]
    fn test_session_ahead_of_recovery_is_remirrored() {
        let (layout, _temp) = setup("{\"a\":1}\n{\"a\":2}\n", "{\"a\":1}\n");

        let report = recover(&layout).unwrap();

        assert_eq!(report.remirrored_entries, 1);
        assert_eq!(
            fs::read_to_string(layout.recovery_path()).unwrap(),
            "{\"a\":1}\n{\"a\":2}\n"
        );
    }

    #[test]
    fn test_missing_files() {
        let temp = TempDir::new().unwrap();
        let layout = LogLayout::new(temp.path());

        let report = recover(&layout).unwrap();
        assert_eq!(report, RecoveryReport::default());
    }
}
