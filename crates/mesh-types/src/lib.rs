//! # mesh-types
//!
//! Shared domain types for the synaptic mesh pipeline.
//!
//! This crate defines the data structures passed between the router,
//! the recorder and the offline analytics stages:
//! - Events: immutable, timestamped text events produced by actors
//! - Metadata: classification attached by the recorder
//! - Threads and superthreads: reconstructed conversations
//! - Checkpoints: immutable snapshots of the session log
//! - Settings: layered configuration
//!
//! ## Usage
//!
//! ```rust
//! use mesh_types::Event;
//!
//! let event = Event::new("pm_alpha", "planning", "Should we split the cache layer?");
//! assert_eq!(event.topic, "planning");
//! ```

pub mod checkpoint;
pub mod config;
pub mod error;
pub mod event;
pub mod thread;
pub mod wire;

pub use checkpoint::Checkpoint;
pub use config::{ClusterSettings, ReconstructSettings, RecorderSettings, RouterSettings, Settings};
pub use error::MeshError;
pub use event::{
    Event, EventMetadata, IncomingEvent, Tier, DEFAULT_TOPIC, MAX_PAYLOAD_BYTES, UNKNOWN,
};
pub use thread::{ContextShift, Superthread, Thread, ThreadStatus};
pub use wire::{IngestAck, IngestReply};
