//! Paths under the log directory and operator archival.

use chrono::Utc;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::StorageError;

pub const SESSION_FILE: &str = "current_session.jsonl";
pub const RECOVERY_DIR: &str = "recovery";
pub const RECOVERY_FILE: &str = "crash_recovery.jsonl";
pub const CHECKPOINT_DIR: &str = "checkpoints";
pub const ARCHIVE_DIR: &str = "archive";

/// File layout rooted at the recorder's log directory.
#[derive(Debug, Clone)]
pub struct LogLayout {
    root: PathBuf,
}

impl LogLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn session_path(&self) -> PathBuf {
        self.root.join(SESSION_FILE)
    }

    pub fn recovery_path(&self) -> PathBuf {
        self.root.join(RECOVERY_DIR).join(RECOVERY_FILE)
    }

    pub fn checkpoint_dir(&self) -> PathBuf {
        self.root.join(CHECKPOINT_DIR)
    }

    pub fn archive_dir(&self) -> PathBuf {
        self.root.join(ARCHIVE_DIR)
    }

    /// Create every directory in the layout.
    pub fn ensure_dirs(&self) -> Result<(), StorageError> {
        fs::create_dir_all(&self.root)?;
        fs::create_dir_all(self.root.join(RECOVERY_DIR))?;
        fs::create_dir_all(self.checkpoint_dir())?;
        fs::create_dir_all(self.archive_dir())?;
        Ok(())
    }

    /// Move the current session and recovery logs into `archive/<timestamp>/`.
    ///
    /// Operator action only; the recorder never rolls its own log over.
    /// Must not run while a recorder has the log open. Returns `None` when
    /// there was no session to archive.
    pub fn archive_session(&self) -> Result<Option<PathBuf>, StorageError> {
        let session = self.session_path();
        let recovery = self.recovery_path();
        if !session.exists() && !recovery.exists() {
            return Ok(None);
        }

        let target = self
            .archive_dir()
            .join(Utc::now().format("%Y%m%d_%H%M%S_%3f").to_string());
        fs::create_dir_all(&target)?;

        if session.exists() {
            fs::rename(&session, target.join(SESSION_FILE))?;
        }
        if recovery.exists() {
            fs::rename(&recovery, target.join(RECOVERY_FILE))?;
        }

        info!(target = %target.display(), "Archived session logs");
        Ok(Some(target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_paths() {
        let layout = LogLayout::new("/logs");
        assert_eq!(layout.session_path(), PathBuf::from("/logs/current_session.jsonl"));
        assert_eq!(
            layout.recovery_path(),
            PathBuf::from("/logs/recovery/crash_recovery.jsonl")
        );
        assert_eq!(layout.checkpoint_dir(), PathBuf::from("/logs/checkpoints"));
    }

    #[test]
    fn test_archive_moves_both_logs() {
        let temp = TempDir::new().unwrap();
        let layout = LogLayout::new(temp.path());
        layout.ensure_dirs().unwrap();
        fs::write(layout.session_path(), "{}\n").unwrap();
        fs::write(layout.recovery_path(), "{}\n").unwrap();

        let target = layout.archive_session().unwrap().unwrap();

        assert!(!layout.session_path().exists());
        assert!(!layout.recovery_path().exists());
        assert!(target.join(SESSION_FILE).exists());
        assert!(target.join(RECOVERY_FILE).exists());
    }

    #[test]
    fn test_archive_without_session() {
        let temp = TempDir::new().unwrap();
        let layout = LogLayout::new(temp.path());
        layout.ensure_dirs().unwrap();

        assert!(layout.archive_session().unwrap().is_none());
    }
}
