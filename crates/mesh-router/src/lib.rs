//! Topic router for the synaptic mesh.
//!
//! A stateless forwarding proxy: publishers connect to the frontend and
//! send `(topic, payload)` frames; subscribers connect to the backend,
//! register topic prefixes, and receive every matching frame published
//! after their subscription is processed.
//!
//! The router never parses payloads and never waits on a slow subscriber.
//! Each subscriber reads from a bounded broadcast buffer; one that falls
//! further behind than the buffer loses the overflowed frames.

pub mod error;
pub mod frame;
pub mod server;

pub use error::RouterError;
pub use frame::{ControlFrame, RoutedFrame, MAX_FRAME_BYTES};
pub use server::{run_router_with_shutdown, BoundRouter, RouterHandle, RouterStats};
