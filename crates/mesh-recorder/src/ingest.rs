//! Direct ingestion endpoint.
//!
//! Producers that cannot reach the router write here. Each request frame
//! carries one JSON event and gets exactly one [`IngestReply`]; an ack
//! means the event is synced to the session log.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use mesh_router::frame::framed;
use mesh_types::{IncomingEvent, IngestReply};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::RecorderError;
use crate::stats::StatsInner;
use crate::writer::LogWriter;

pub(crate) async fn serve_ingest(
    listener: TcpListener,
    writer: LogWriter,
    stats: Arc<StatsInner>,
    token: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    tokio::spawn(handle_producer(
                        stream,
                        peer,
                        writer.clone(),
                        stats.clone(),
                        token.clone(),
                    ));
                }
                Err(e) => warn!(error = %e, "Ingest accept failed"),
            }
        }
    }
    debug!("Ingest listener stopped");
}

async fn handle_producer(
    stream: TcpStream,
    peer: SocketAddr,
    writer: LogWriter,
    stats: Arc<StatsInner>,
    token: CancellationToken,
) {
    debug!(%peer, "Producer connected for direct ingestion");
    let mut conn = framed(stream);

    loop {
        let body = tokio::select! {
            _ = token.cancelled() => break,
            frame = conn.next() => match frame {
                Some(Ok(body)) => body,
                Some(Err(e)) => {
                    debug!(%peer, error = %e, "Ingest connection error");
                    break;
                }
                None => break,
            }
        };

        let reply = ingest_frame(&writer, &stats, &body).await;
        let encoded = match serde_json::to_vec(&reply) {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!(%peer, error = %e, "Failed to encode ingest reply");
                break;
            }
        };
        if let Err(e) = conn.send(Bytes::from(encoded)).await {
            debug!(%peer, error = %e, "Failed to send ingest reply");
            break;
        }
    }
    debug!(%peer, "Producer disconnected");
}

async fn ingest_frame(writer: &LogWriter, stats: &StatsInner, body: &[u8]) -> IngestReply {
    let event = match IncomingEvent::from_bytes(body).and_then(|e| e.into_event(None, Utc::now())) {
        Ok(event) => event,
        Err(e) => {
            StatsInner::incr(&stats.malformed_skipped);
            warn!(error = %e, "Skipping malformed ingest payload");
            return IngestReply::Error {
                message: RecorderError::from(e).to_string(),
            };
        }
    };

    match writer.append(event).await {
        Ok(ack) => IngestReply::Ack(ack),
        Err(e) => IngestReply::Error {
            message: e.to_string(),
        },
    }
}

/// Bind the ingestion listener.
pub(crate) async fn bind(addr: &str) -> Result<TcpListener, RecorderError> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| RecorderError::Bind {
            addr: addr.to_string(),
            source,
        })?;
    info!(addr = %listener.local_addr()?, "Direct ingestion listening");
    Ok(listener)
}
