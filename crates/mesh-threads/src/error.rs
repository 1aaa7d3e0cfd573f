//! Reconstruction error types.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReconstructError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Input not found: {0}")]
    NotFound(String),

    #[error("Invalid settings: {0}")]
    InvalidSettings(String),
}

impl From<serde_json::Error> for ReconstructError {
    fn from(err: serde_json::Error) -> Self {
        ReconstructError::Serialization(err.to_string())
    }
}
