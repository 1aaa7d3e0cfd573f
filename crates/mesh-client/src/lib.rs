//! Client side of the synaptic mesh.
//!
//! - [`Publisher`]: fire-and-forget publishing through the router
//! - [`Subscriber`]: topic-prefix subscriptions on the router backend
//! - [`IngestClient`]: direct, acknowledged ingestion into the recorder,
//!   usable when the router is down

mod connect;
pub mod error;
pub mod ingest;
pub mod publisher;
pub mod subscriber;

pub use connect::RetryPolicy;
pub use error::ClientError;
pub use ingest::IngestClient;
pub use publisher::Publisher;
pub use subscriber::{RoutedMessage, Subscriber};
