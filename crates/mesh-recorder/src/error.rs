//! Recorder error types.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RecorderError {
    /// A write could not be made durable. Fatal for the recorder.
    #[error("Durability failure: {0}")]
    Durability(String),

    #[error("Storage error: {0}")]
    Storage(#[from] mesh_storage::StorageError),

    #[error("Scheduler error: {0}")]
    Scheduler(#[from] mesh_scheduler::SchedulerError),

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed event: {0}")]
    Malformed(String),

    #[error("Invalid classifier table: {0}")]
    Classifier(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The writer thread is gone.
    #[error("Writer stopped")]
    WriterStopped,
}

impl From<serde_json::Error> for RecorderError {
    fn from(err: serde_json::Error) -> Self {
        RecorderError::Serialization(err.to_string())
    }
}

impl From<mesh_types::MeshError> for RecorderError {
    fn from(err: mesh_types::MeshError) -> Self {
        RecorderError::Malformed(err.to_string())
    }
}
