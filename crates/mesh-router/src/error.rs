//! Router error types.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RouterError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Could not listen on a configured address
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Frame body does not follow the routed-frame layout
    #[error("Malformed frame: {0}")]
    Frame(String),

    #[error("Configuration error: {0}")]
    Config(String),
}
