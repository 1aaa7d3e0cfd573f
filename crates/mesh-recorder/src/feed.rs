//! Live subscription to all router traffic.

use std::sync::Arc;
use std::time::Duration;

use mesh_client::{RetryPolicy, RoutedMessage, Subscriber};
use mesh_types::IncomingEvent;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::RecorderError;
use crate::stats::StatsInner;
use crate::writer::LogWriter;

const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Record everything published on the router at `addr` until `token` is
/// cancelled. Losing the router is never fatal; the loop reconnects.
pub(crate) async fn follow_router(
    addr: String,
    writer: LogWriter,
    stats: Arc<StatsInner>,
    token: CancellationToken,
) {
    while !token.is_cancelled() {
        let connect = Subscriber::connect_with(&addr, RetryPolicy::default());
        let subscriber = tokio::select! {
            _ = token.cancelled() => break,
            connected = connect => connected,
        };

        match subscriber {
            Ok(mut subscriber) => match subscriber.subscribe("").await {
                Ok(()) => {
                    info!(%addr, "Following router traffic");
                    if !pump(&mut subscriber, &writer, &stats, &token).await {
                        break;
                    }
                }
                Err(e) => warn!(%addr, error = %e, "Router subscription failed"),
            },
            Err(e) => warn!(%addr, error = %e, "Router unreachable, direct ingestion only"),
        }

        tokio::select! {
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(RECONNECT_DELAY) => {}
        }
    }
    debug!("Router feed stopped");
}

/// Record frames until the connection drops. Returns `false` when the feed
/// should stop for good.
async fn pump(
    subscriber: &mut Subscriber,
    writer: &LogWriter,
    stats: &StatsInner,
    token: &CancellationToken,
) -> bool {
    loop {
        let received = tokio::select! {
            _ = token.cancelled() => return false,
            received = subscriber.recv() => received,
        };

        match received {
            Ok(Some(message)) => match record(message, writer, stats).await {
                Err(e @ (RecorderError::Durability(_) | RecorderError::WriterStopped)) => {
                    warn!(error = %e, "Router feed stopping");
                    return false;
                }
                Err(e) => debug!(error = %e, "Routed event not recorded"),
                Ok(()) => {}
            },
            Ok(None) => {
                warn!("Router closed the subscription, reconnecting");
                return true;
            }
            Err(e) => {
                warn!(error = %e, "Router connection lost, reconnecting");
                return true;
            }
        }
    }
}

async fn record(
    message: RoutedMessage,
    writer: &LogWriter,
    stats: &StatsInner,
) -> Result<(), RecorderError> {
    let event = IncomingEvent::from_bytes(&message.payload)
        .and_then(|incoming| incoming.into_event(Some(&message.topic), chrono::Utc::now()));

    match event {
        Ok(event) => {
            writer.append(event).await?;
            Ok(())
        }
        Err(e) => {
            StatsInner::incr(&stats.malformed_skipped);
            warn!(topic = %message.topic, error = %e, "Skipping malformed routed payload");
            Ok(())
        }
    }
}
