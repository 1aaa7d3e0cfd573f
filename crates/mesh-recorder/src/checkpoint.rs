//! Periodic and shutdown checkpoints.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use mesh_scheduler::JobResult;
use mesh_storage::{CheckpointInfo, CheckpointStore};
use tracing::{info, warn};

use crate::error::RecorderError;
use crate::stats::StatsInner;
use crate::writer::LogWriter;

/// Label of the checkpoint written on graceful shutdown.
pub const FINAL_CHECKPOINT_LABEL: &str = "final_checkpoint_before_shutdown";

/// Copies the session log into the checkpoint store.
///
/// Snapshots are taken through the writer, so a checkpoint never contains
/// a half-written line.
#[derive(Clone)]
pub struct Checkpointer {
    writer: LogWriter,
    store: CheckpointStore,
    /// Log length at the last successful checkpoint
    last_lines: Arc<AtomicU64>,
    stats: Arc<StatsInner>,
}

impl Checkpointer {
    pub(crate) fn new(writer: LogWriter, store: CheckpointStore, stats: Arc<StatsInner>) -> Self {
        Self {
            writer,
            store,
            last_lines: Arc::new(AtomicU64::new(0)),
            stats,
        }
    }

    /// Write a checkpoint labelled `label` unconditionally.
    pub async fn checkpoint(&self, label: &str) -> Result<CheckpointInfo, RecorderError> {
        let snapshot = self.writer.snapshot().await?;
        let lines = snapshot.line_count;

        let store = self.store.clone();
        let label_owned = label.to_string();
        let result = tokio::task::spawn_blocking(move || store.create(&label_owned, &snapshot))
            .await
            .map_err(|e| RecorderError::Io(std::io::Error::other(e)))?;

        match result {
            Ok(info) => {
                self.last_lines.store(lines, Ordering::SeqCst);
                StatsInner::incr(&self.stats.checkpoints_created);
                info!(
                    label = %info.label,
                    messages = lines,
                    path = %info.path.display(),
                    "Checkpoint created"
                );
                Ok(info)
            }
            Err(e) => {
                StatsInner::incr(&self.stats.checkpoint_failures);
                Err(e.into())
            }
        }
    }

    /// Timer entry point: `auto_<unix_ts>`, skipped when nothing new was
    /// recorded since the last checkpoint.
    pub async fn run_scheduled(&self) -> JobResult {
        let lines = match self.writer.line_count().await {
            Ok(lines) => lines,
            Err(e) => return JobResult::Failed(e.to_string()),
        };
        if lines == self.last_lines.load(Ordering::SeqCst) {
            return JobResult::Skipped("no new events since last checkpoint".to_string());
        }

        let label = format!("auto_{}", Utc::now().timestamp());
        match self.checkpoint(&label).await {
            Ok(_) => JobResult::Success,
            Err(e) => {
                warn!(error = %e, "Scheduled checkpoint failed");
                JobResult::Failed(e.to_string())
            }
        }
    }
}
