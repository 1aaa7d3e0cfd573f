//! Append-only session log mirrored to the crash recovery log.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use tracing::{debug, info};

use crate::error::StorageError;
use crate::layout::LogLayout;
use crate::recovery::{recover, RecoveryReport};

/// Consistent copy of the session log taken between two appends.
#[derive(Debug, Clone, Default)]
pub struct SessionSnapshot {
    pub bytes: Vec<u8>,
    /// Complete lines in `bytes`
    pub line_count: u64,
}

impl SessionSnapshot {
    pub fn size_bytes(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Iterate over the snapshot's lines.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        std::str::from_utf8(&self.bytes)
            .unwrap_or_default()
            .lines()
            .filter(|line| !line.trim().is_empty())
    }
}

/// Destination of serialized events.
///
/// The recorder's writer owns exactly one sink. An `append` that returns
/// `Ok` must already be durable.
pub trait LogSink: Send {
    /// Append one line and return its 1-based position in the log.
    fn append(&mut self, line: &str) -> Result<u64, StorageError>;

    /// Copy of everything appended so far.
    fn snapshot(&self) -> Result<SessionSnapshot, StorageError>;

    /// Number of lines in the log.
    fn line_count(&self) -> u64;
}

/// The session log and its recovery mirror.
pub struct SessionLog {
    layout: LogLayout,
    session: File,
    recovery: File,
    line_count: u64,
    size_bytes: u64,
}

impl SessionLog {
    /// Open the logs under `layout`, running crash recovery first.
    pub fn open(layout: LogLayout) -> Result<(Self, RecoveryReport), StorageError> {
        info!(path = %layout.root().display(), "Opening session log");
        layout.ensure_dirs()?;

        let report = recover(&layout)?;

        let session = OpenOptions::new()
            .create(true)
            .append(true)
            .open(layout.session_path())?;
        let recovery = OpenOptions::new()
            .create(true)
            .append(true)
            .open(layout.recovery_path())?;

        Ok((
            Self {
                layout,
                session,
                recovery,
                line_count: report.session_lines,
                size_bytes: report.session_bytes,
            },
            report,
        ))
    }

    pub fn layout(&self) -> &LogLayout {
        &self.layout
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    /// Write one line to both files and sync both.
    ///
    /// The recovery log is written first so that a crash between the two
    /// writes leaves the entry recoverable.
    pub fn append_line(&mut self, line: &str) -> Result<u64, StorageError> {
        if line.contains('\n') {
            return Err(StorageError::InvalidInput(
                "log lines must not contain newlines".to_string(),
            ));
        }

        let mut record = Vec::with_capacity(line.len() + 1);
        record.extend_from_slice(line.as_bytes());
        record.push(b'\n');

        self.recovery.write_all(&record)?;
        self.recovery.sync_data()?;

        self.session.write_all(&record)?;
        self.session.sync_data()?;

        self.line_count += 1;
        self.size_bytes += record.len() as u64;
        debug!(line = self.line_count, "Appended to session log");

        Ok(self.line_count)
    }
}

impl LogSink for SessionLog {
    fn append(&mut self, line: &str) -> Result<u64, StorageError> {
        self.append_line(line)
    }

    fn snapshot(&self) -> Result<SessionSnapshot, StorageError> {
        // Only the writer appends, so the file is quiescent while we read it
        let bytes = fs::read(self.layout.session_path())?;
        Ok(SessionSnapshot {
            bytes,
            line_count: self.line_count,
        })
    }

    fn line_count(&self) -> u64 {
        self.line_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_log() -> (SessionLog, TempDir) {
        let temp = TempDir::new().unwrap();
        let (log, _) = SessionLog::open(LogLayout::new(temp.path())).unwrap();
        (log, temp)
    }

    #[test]
    fn test_append_writes_both_files() {
        let (mut log, _temp) = open_log();

        assert_eq!(log.append_line(r#"{"id":"1"}"#).unwrap(), 1);
        assert_eq!(log.append_line(r#"{"id":"2"}"#).unwrap(), 2);

        let session = fs::read_to_string(log.layout().session_path()).unwrap();
        let recovery = fs::read_to_string(log.layout().recovery_path()).unwrap();
        assert_eq!(session, "{\"id\":\"1\"}\n{\"id\":\"2\"}\n");
        assert_eq!(session, recovery);
        assert_eq!(log.size_bytes(), session.len() as u64);
    }

    #[test]
    fn test_rejects_embedded_newline() {
        let (mut log, _temp) = open_log();
        assert!(matches!(
            log.append_line("a\nb"),
            Err(StorageError::InvalidInput(_))
        ));
        assert_eq!(log.line_count(), 0);
    }

    #[test]
    fn test_reopen_continues_numbering() {
        let temp = TempDir::new().unwrap();
        {
            let (mut log, _) = SessionLog::open(LogLayout::new(temp.path())).unwrap();
            log.append_line("{}").unwrap();
            log.append_line("{}").unwrap();
        }

        let (mut log, report) = SessionLog::open(LogLayout::new(temp.path())).unwrap();
        assert_eq!(report.session_lines, 2);
        assert_eq!(log.append_line("{}").unwrap(), 3);
    }

    #[test]
    fn test_snapshot_matches_log() {
        let (mut log, _temp) = open_log();
        log.append_line(r#"{"id":"1"}"#).unwrap();

        let snapshot = log.snapshot().unwrap();
        assert_eq!(snapshot.line_count, 1);
        assert_eq!(snapshot.lines().collect::<Vec<_>>(), vec![r#"{"id":"1"}"#]);
    }
}
