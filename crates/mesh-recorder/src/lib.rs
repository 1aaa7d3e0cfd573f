//! # mesh-recorder
//!
//! Durable recorder for the synaptic mesh.
//!
//! Two ingestion paths feed one writer:
//! - a live subscription to all router traffic
//! - a direct ingestion endpoint for producers that bypass the router
//!
//! Every event is classified (domain tag, tier, highlight tags, keywords,
//! content hash), given the next sequence number and appended to the
//! session log. Checkpoints are taken on a timer and once more on
//! shutdown. A failed write stops the recorder with
//! [`RecorderError::Durability`].

pub mod checkpoint;
pub mod classify;
pub mod error;
mod feed;
mod ingest;
pub mod recorder;
mod stats;
pub mod writer;

pub use checkpoint::{Checkpointer, FINAL_CHECKPOINT_LABEL};
pub use classify::{content_hash, Classifier, ClassifierTables, DomainRule, HighlightRule};
pub use error::RecorderError;
pub use recorder::{run_recorder_with_shutdown, Recorder, RecorderHandle};
pub use stats::RecorderStats;
pub use writer::LogWriter;
