//! Topic subscriptions on the router backend.

use bytes::Bytes;
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use mesh_router::frame::{framed, ControlFrame, RoutedFrame};
use mesh_types::{Event, IncomingEvent};
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use tracing::debug;

use crate::connect::{connect_with_retry, RetryPolicy};
use crate::error::ClientError;

/// A frame received from the router.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutedMessage {
    pub topic: String,
    pub payload: Bytes,
}

/// Receives frames for the topic prefixes it subscribed to.
///
/// Only traffic published after the router processes a subscription is
/// delivered; there is no history.
pub struct Subscriber {
    conn: Framed<TcpStream, LengthDelimitedCodec>,
    malformed: u64,
}

impl Subscriber {
    pub async fn connect(addr: &str) -> Result<Self, ClientError> {
        Self::connect_with(addr, RetryPolicy::default()).await
    }

    pub async fn connect_with(addr: &str, policy: RetryPolicy) -> Result<Self, ClientError> {
        let stream = connect_with_retry(addr, policy).await?;
        Ok(Self {
            conn: framed(stream),
            malformed: 0,
        })
    }

    /// Subscribe to topics starting with `prefix`; `""` subscribes to all.
    pub async fn subscribe(&mut self, prefix: &str) -> Result<(), ClientError> {
        let frame = ControlFrame::Subscribe(Bytes::from(prefix.to_string()));
        self.conn.send(frame.encode()).await?;
        Ok(())
    }

    pub async fn unsubscribe(&mut self, prefix: &str) -> Result<(), ClientError> {
        let frame = ControlFrame::Unsubscribe(Bytes::from(prefix.to_string()));
        self.conn.send(frame.encode()).await?;
        Ok(())
    }

    /// Next routed frame, or `None` once the router closes the connection.
    pub async fn recv(&mut self) -> Result<Option<RoutedMessage>, ClientError> {
        loop {
            let Some(body) = self.conn.next().await.transpose()? else {
                return Ok(None);
            };
            match RoutedFrame::decode(body.freeze()) {
                Ok(frame) => {
                    return Ok(Some(RoutedMessage {
                        topic: frame.topic_str(),
                        payload: frame.payload,
                    }))
                }
                Err(e) => {
                    self.malformed += 1;
                    debug!(error = %e, "Skipping malformed routed frame");
                }
            }
        }
    }

    /// Next frame whose payload decodes as an event.
    ///
    /// Undecodable payloads are skipped and counted in
    /// [`malformed`](Self::malformed).
    pub async fn recv_event(&mut self) -> Result<Option<Event>, ClientError> {
        while let Some(message) = self.recv().await? {
            let decoded = IncomingEvent::from_bytes(&message.payload)
                .and_then(|incoming| incoming.into_event(Some(&message.topic), Utc::now()));
            match decoded {
                Ok(event) => return Ok(Some(event)),
                Err(e) => {
                    self.malformed += 1;
                    debug!(topic = %message.topic, error = %e, "Skipping undecodable payload");
                }
            }
        }
        Ok(None)
    }

    /// Frames or payloads skipped because they did not decode.
    pub fn malformed(&self) -> u64 {
        self.malformed
    }
}
