//! Immutable checkpoint documents.
//!
//! A checkpoint is written to a hidden temp file, synced, then renamed
//! into place, so a visible checkpoint is always complete.

use chrono::{DateTime, Utc};
use mesh_types::Checkpoint;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::StorageError;
use crate::session::SessionSnapshot;

const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S_%3f";

/// A checkpoint file on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointInfo {
    pub path: PathBuf,
    pub label: String,
    pub size_bytes: u64,
}

/// Directory of checkpoint files.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write a checkpoint of `snapshot` labelled `label`.
    ///
    /// Lines of the snapshot that are not valid JSON are left out of
    /// `messages` but still counted in `size_bytes`.
    pub fn create(
        &self,
        label: &str,
        snapshot: &SessionSnapshot,
    ) -> Result<CheckpointInfo, StorageError> {
        validate_label(label)?;
        fs::create_dir_all(&self.dir)?;

        let mut messages = Vec::with_capacity(snapshot.line_count as usize);
        for line in snapshot.lines() {
            match serde_json::from_str::<serde_json::Value>(line) {
                Ok(value) => messages.push(value),
                Err(e) => warn!(error = %e, "Skipping unparseable log line in checkpoint"),
            }
        }

        let timestamp = Utc::now();
        let checkpoint = Checkpoint {
            checkpoint_id: ulid::Ulid::new().to_string(),
            timestamp,
            label: label.to_string(),
            message_count: messages.len(),
            size_bytes: snapshot.size_bytes(),
            messages,
        };

        let file_name = format!("{}_{}.json", timestamp.format(TIMESTAMP_FORMAT), label);
        let final_path = self.dir.join(&file_name);
        let temp_path = self.dir.join(format!(".{file_name}.tmp"));

        let bytes = serde_json::to_vec_pretty(&checkpoint)?;
        {
            let mut file = File::create(&temp_path)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
        }
        fs::rename(&temp_path, &final_path)?;

        debug!(path = %final_path.display(), messages = checkpoint.message_count, "Checkpoint written");

        Ok(CheckpointInfo {
            path: final_path,
            label: label.to_string(),
            size_bytes: bytes.len() as u64,
        })
    }

    /// All checkpoints, newest first.
    pub fn list(&self) -> Result<Vec<CheckpointInfo>, StorageError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut infos = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with('.') || !name.ends_with(".json") {
                continue;
            }
            let Some(label) = label_from_file_name(&name) else {
                continue;
            };
            infos.push(CheckpointInfo {
                path: entry.path(),
                label,
                size_bytes: entry.metadata()?.len(),
            });
        }

        // File names start with a sortable timestamp
        infos.sort_by(|a, b| b.path.file_name().cmp(&a.path.file_name()));
        Ok(infos)
    }

    /// Load a checkpoint document.
    pub fn load(path: &Path) -> Result<Checkpoint, StorageError> {
        if !path.exists() {
            return Err(StorageError::NotFound(path.display().to_string()));
        }
        let bytes = fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// The most recent checkpoint, if any.
    pub fn latest(&self) -> Result<Option<Checkpoint>, StorageError> {
        match self.list()?.first() {
            Some(info) => Ok(Some(Self::load(&info.path)?)),
            None => Ok(None),
        }
    }
}

/// Timestamp encoded in a checkpoint file name.
pub fn timestamp_from_file_name(name: &str) -> Option<DateTime<Utc>> {
    let stamp = name.get(..19)?;
    chrono::NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

fn label_from_file_name(name: &str) -> Option<String> {
    timestamp_from_file_name(name)?;
    let rest = name.get(20..)?;
    rest.strip_suffix(".json").map(String::from)
}

fn validate_label(label: &str) -> Result<(), StorageError> {
    let valid = !label.is_empty()
        && label
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidInput(format!(
            "checkpoint label must be non-empty [A-Za-z0-9_-], got '{label}'"
        )))
    }
}
