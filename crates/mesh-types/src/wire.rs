//! Replies on the direct ingestion channel.

use serde::{Deserialize, Serialize};

/// Acknowledgement of a durably recorded event.
///
/// Sent only after the session and recovery logs are both synced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestAck {
    pub event_id: String,
    /// Receipt order in the session log
    pub sequence: u64,
}

/// One reply frame per ingested frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IngestReply {
    Ack(IngestAck),
    Error { message: String },
}
