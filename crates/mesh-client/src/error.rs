//! Error types for the mesh clients.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    /// Could not reach the endpoint within the retry budget
    #[error("Connection to {addr} failed: {source}")]
    Connection {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// The recorder refused the event
    #[error("Rejected by recorder: {0}")]
    Rejected(String),

    /// The peer closed the connection
    #[error("Connection closed by peer")]
    Closed,

    #[error("Frame error: {0}")]
    Frame(#[from] mesh_router::RouterError),
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Serialization(err.to_string())
    }
}
