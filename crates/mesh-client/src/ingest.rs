//! Direct ingestion into the recorder.
//!
//! Request and reply frames use the same length-delimited framing as the
//! router. Each request is one JSON event; each reply is one
//! [`IngestReply`]. An ack is only sent once the event is synced to disk.

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use mesh_router::frame::framed;
use mesh_types::{Event, IncomingEvent, IngestAck, IngestReply};
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use tracing::debug;

use crate::connect::{connect_with_retry, RetryPolicy};
use crate::error::ClientError;

/// Point-to-point channel to the recorder's ingestion endpoint.
pub struct IngestClient {
    conn: Framed<TcpStream, LengthDelimitedCodec>,
}

impl IngestClient {
    pub async fn connect(addr: &str) -> Result<Self, ClientError> {
        Self::connect_with(addr, RetryPolicy::default()).await
    }

    pub async fn connect_with(addr: &str, policy: RetryPolicy) -> Result<Self, ClientError> {
        let stream = connect_with_retry(addr, policy).await?;
        Ok(Self {
            conn: framed(stream),
        })
    }

    /// Record an event and wait for the durable ack.
    pub async fn ingest(&mut self, event: &Event) -> Result<IngestAck, ClientError> {
        debug!(event_id = %event.id, "Ingesting event");
        self.send_raw(Bytes::from(event.to_bytes()?)).await
    }

    /// Record a loosely specified event (missing id, timestamp or topic).
    pub async fn ingest_incoming(
        &mut self,
        incoming: &IncomingEvent,
    ) -> Result<IngestAck, ClientError> {
        self.send_raw(Bytes::from(serde_json::to_vec(incoming)?))
            .await
    }

    /// Send a raw frame body and wait for its reply.
    pub async fn send_raw(&mut self, body: Bytes) -> Result<IngestAck, ClientError> {
        self.conn.send(body).await?;

        let reply = self.conn.next().await.transpose()?.ok_or(ClientError::Closed)?;
        match serde_json::from_slice::<IngestReply>(&reply)? {
            IngestReply::Ack(ack) => Ok(ack),
            IngestReply::Error { message } => Err(ClientError::Rejected(message)),
        }
    }
}
