//! Fire-and-forget publishing through the router frontend.

use bytes::Bytes;
use futures::SinkExt;
use mesh_router::frame::{codec, RoutedFrame};
use mesh_types::Event;
use tokio::net::TcpStream;
use tokio_util::codec::{FramedWrite, LengthDelimitedCodec};
use tracing::{debug, warn};

use crate::connect::{connect_with_retry, RetryPolicy};
use crate::error::ClientError;

/// Publishes `(topic, payload)` frames to the router.
///
/// Delivery is best-effort: a failed write triggers one reconnect with
/// backoff, after which the frame is dropped and counted. Durability is
/// the recorder's job, not the router's.
pub struct Publisher {
    addr: String,
    policy: RetryPolicy,
    conn: Option<FramedWrite<TcpStream, LengthDelimitedCodec>>,
    dropped: u64,
}

impl Publisher {
    /// Connect to the router frontend, retrying with the default policy.
    pub async fn connect(addr: &str) -> Result<Self, ClientError> {
        Self::connect_with(addr, RetryPolicy::default()).await
    }

    pub async fn connect_with(addr: &str, policy: RetryPolicy) -> Result<Self, ClientError> {
        let stream = connect_with_retry(addr, policy).await?;
        Ok(Self {
            addr: addr.to_string(),
            policy,
            conn: Some(FramedWrite::new(stream, codec())),
            dropped: 0,
        })
    }

    /// Publish a payload on `topic`. Never fails; see [`dropped`](Self::dropped).
    pub async fn publish(&mut self, topic: &str, payload: impl Into<Bytes>) {
        let body = match RoutedFrame::new(topic.to_string(), payload.into()).encode() {
            Ok(body) => body,
            Err(e) => {
                warn!(%topic, error = %e, "Dropping unencodable frame");
                self.dropped += 1;
                return;
            }
        };

        if self.try_send(body.clone()).await {
            return;
        }

        debug!(addr = %self.addr, "Publish failed, reconnecting");
        self.conn = None;
        match connect_with_retry(&self.addr, self.policy).await {
            Ok(stream) => {
                self.conn = Some(FramedWrite::new(stream, codec()));
                if self.try_send(body).await {
                    return;
                }
                self.conn = None;
            }
            Err(e) => debug!(error = %e, "Reconnect failed"),
        }

        self.dropped += 1;
        warn!(%topic, dropped = self.dropped, "Router unreachable, frame dropped");
    }

    /// Publish an event as JSON on its own topic.
    pub async fn publish_event(&mut self, event: &Event) {
        match event.to_bytes() {
            Ok(bytes) => self.publish(&event.topic, bytes).await,
            Err(e) => {
                warn!(event_id = %event.id, error = %e, "Failed to serialize event");
                self.dropped += 1;
            }
        }
    }

    /// Frames that could not be handed to the router.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    async fn try_send(&mut self, body: Bytes) -> bool {
        match self.conn.as_mut() {
            Some(conn) => conn.send(body).await.is_ok(),
            None => false,
        }
    }
}
