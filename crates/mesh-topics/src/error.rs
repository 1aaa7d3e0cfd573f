//! Clustering error types.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TopicsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    #[error("Failed to read threads: {0}")]
    Threads(#[from] mesh_threads::ReconstructError),

    #[error("Invalid pattern: {0}")]
    Pattern(#[from] regex::Error),
}

impl From<serde_json::Error> for TopicsError {
    fn from(err: serde_json::Error) -> Self {
        TopicsError::Serialization(err.to_string())
    }
}
