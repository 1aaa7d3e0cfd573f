//! Router server: publisher frontend, subscriber backend, broadcast fan-out.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use mesh_types::RouterSettings;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::RouterError;
use crate::frame::{codec, ControlFrame, RoutedFrame};

/// A frame in flight: its topic (for matching) and the untouched body.
#[derive(Debug, Clone)]
struct Routed {
    topic: Bytes,
    body: Bytes,
}

#[derive(Debug, Default)]
struct StatsInner {
    published: AtomicU64,
    forwarded: AtomicU64,
    dropped_lagged: AtomicU64,
    malformed: AtomicU64,
    publishers: AtomicUsize,
    subscribers: AtomicUsize,
}

/// Point-in-time router counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouterStats {
    /// Frames accepted from publishers
    pub published: u64,
    /// Frame deliveries to subscribers (one frame to two subscribers counts twice)
    pub forwarded: u64,
    /// Frames lost by subscribers that fell behind the buffer
    pub dropped_lagged: u64,
    /// Frames or control messages that did not parse
    pub malformed: u64,
    /// Connected publishers
    pub publishers: usize,
    /// Connected subscribers
    pub subscribers: usize,
}

/// Cheap handle for observing and stopping a running router.
#[derive(Debug, Clone)]
pub struct RouterHandle {
    stats: Arc<StatsInner>,
    shutdown: CancellationToken,
}

impl RouterHandle {
    pub fn stats(&self) -> RouterStats {
        RouterStats {
            published: self.stats.published.load(Ordering::Relaxed),
            forwarded: self.stats.forwarded.load(Ordering::Relaxed),
            dropped_lagged: self.stats.dropped_lagged.load(Ordering::Relaxed),
            malformed: self.stats.malformed.load(Ordering::Relaxed),
            publishers: self.stats.publishers.load(Ordering::Relaxed),
            subscribers: self.stats.subscribers.load(Ordering::Relaxed),
        }
    }

    /// Stop the router as if its shutdown signal had fired.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

/// A router whose listeners are bound but not yet serving.
pub struct BoundRouter {
    frontend: TcpListener,
    backend: TcpListener,
    buffer: usize,
    handle: RouterHandle,
}

impl BoundRouter {
    /// Bind the frontend and backend listeners.
    pub async fn bind(settings: &RouterSettings) -> Result<Self, RouterError> {
        if settings.subscriber_buffer == 0 {
            return Err(RouterError::Config(
                "subscriber_buffer must be > 0".to_string(),
            ));
        }

        let frontend = bind(&settings.frontend_addr).await?;
        let backend = bind(&settings.backend_addr).await?;

        Ok(Self {
            frontend,
            backend,
            buffer: settings.subscriber_buffer,
            handle: RouterHandle {
                stats: Arc::new(StatsInner::default()),
                shutdown: CancellationToken::new(),
            },
        })
    }

    pub fn frontend_addr(&self) -> Result<SocketAddr, RouterError> {
        Ok(self.frontend.local_addr()?)
    }

    pub fn backend_addr(&self) -> Result<SocketAddr, RouterError> {
        Ok(self.backend.local_addr()?)
    }

    pub fn handle(&self) -> RouterHandle {
        self.handle.clone()
    }

    /// Serve until `shutdown` resolves or the handle is told to stop.
    pub async fn run_with_shutdown<F>(self, shutdown: F) -> Result<(), RouterError>
    where
        F: Future<Output = ()> + Send,
    {
        let frontend_addr = self.frontend_addr()?;
        let backend_addr = self.backend_addr()?;
        info!(%frontend_addr, %backend_addr, buffer = self.buffer, "Router ready");

        let (tx, _) = broadcast::channel::<Routed>(self.buffer);
        let token = self.handle.shutdown.clone();
        let stats = self.handle.stats.clone();

        let frontend = tokio::spawn(accept_publishers(
            self.frontend,
            tx.clone(),
            stats.clone(),
            token.clone(),
        ));
        let backend = tokio::spawn(accept_subscribers(self.backend, tx, stats, token.clone()));

        tokio::select! {
            _ = shutdown => {}
            _ = token.cancelled() => {}
        }
        token.cancel();

        for task in [frontend, backend] {
            if let Err(e) = task.await {
                warn!(error = %e, "Router accept loop ended abnormally");
            }
        }

        let stats = self.handle.stats();
        info!(
            published = stats.published,
            forwarded = stats.forwarded,
            dropped_lagged = stats.dropped_lagged,
            "Router shutdown complete"
        );
        Ok(())
    }
}

/// Bind and serve with the given settings until `shutdown` resolves.
pub async fn run_router_with_shutdown<F>(
    settings: &RouterSettings,
    shutdown: F,
) -> Result<(), RouterError>
where
    F: Future<Output = ()> + Send,
{
    BoundRouter::bind(settings)
        .await?
        .run_with_shutdown(shutdown)
        .await
}

async fn bind(addr: &str) -> Result<TcpListener, RouterError> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| RouterError::Bind {
            addr: addr.to_string(),
            source,
        })
}

async fn accept_publishers(
    listener: TcpListener,
    tx: broadcast::Sender<Routed>,
    stats: Arc<StatsInner>,
    token: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    tokio::spawn(handle_publisher(
                        stream,
                        peer,
                        tx.clone(),
                        stats.clone(),
                        token.child_token(),
                    ));
                }
                Err(e) => warn!(error = %e, "Failed to accept publisher"),
            },
        }
    }
}

async fn accept_subscribers(
    listener: TcpListener,
    tx: broadcast::Sender<Routed>,
    stats: Arc<StatsInner>,
    token: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    // Subscribe before spawning so nothing published after
                    // the accept can slip past this subscriber
                    let rx = tx.subscribe();
                    tokio::spawn(handle_subscriber(
                        stream,
                        peer,
                        rx,
                        stats.clone(),
                        token.child_token(),
                    ));
                }
                Err(e) => warn!(error = %e, "Failed to accept subscriber"),
            },
        }
    }
}

async fn handle_publisher(
    stream: TcpStream,
    peer: SocketAddr,
    tx: broadcast::Sender<Routed>,
    stats: Arc<StatsInner>,
    token: CancellationToken,
) {
    stats.publishers.fetch_add(1, Ordering::Relaxed);
    debug!(%peer, "Publisher connected");

    let mut frames = FramedRead::new(stream, codec());
    loop {
        let next = tokio::select! {
            _ = token.cancelled() => break,
            next = frames.next() => next,
        };

        match next {
            Some(Ok(body)) => {
                let body = body.freeze();
                match RoutedFrame::peek_topic(&body) {
                    Ok(topic) => {
                        stats.published.fetch_add(1, Ordering::Relaxed);
                        // No subscribers is not an error: the live path is best-effort
                        let _ = tx.send(Routed { topic, body });
                    }
                    Err(e) => {
                        stats.malformed.fetch_add(1, Ordering::Relaxed);
                        debug!(%peer, error = %e, "Dropping malformed frame");
                    }
                }
            }
            Some(Err(e)) => {
                debug!(%peer, error = %e, "Publisher connection error");
                break;
            }
            None => break,
        }
    }

    stats.publishers.fetch_sub(1, Ordering::Relaxed);
    debug!(%peer, "Publisher disconnected");
}

async fn handle_subscriber(
    stream: TcpStream,
    peer: SocketAddr,
    mut rx: broadcast::Receiver<Routed>,
    stats: Arc<StatsInner>,
    token: CancellationToken,
) {
    stats.subscribers.fetch_add(1, Ordering::Relaxed);
    debug!(%peer, "Subscriber connected");

    let (read_half, write_half) = stream.into_split();
    let mut control = FramedRead::new(read_half, codec());
    let mut out = FramedWrite::new(write_half, codec());
    let mut subscriptions: Vec<Bytes> = Vec::new();

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            frame = control.next() => match frame {
                Some(Ok(body)) => match ControlFrame::decode(body.freeze()) {
                    Ok(ControlFrame::Subscribe(topic)) => {
                        debug!(%peer, topic = %String::from_utf8_lossy(&topic), "Subscribed");
                        if !subscriptions.contains(&topic) {
                            subscriptions.push(topic);
                        }
                    }
                    Ok(ControlFrame::Unsubscribe(topic)) => {
                        subscriptions.retain(|s| s != &topic);
                    }
                    Err(e) => {
                        stats.malformed.fetch_add(1, Ordering::Relaxed);
                        debug!(%peer, error = %e, "Ignoring malformed control frame");
                    }
                },
                Some(Err(e)) => {
                    debug!(%peer, error = %e, "Subscriber connection error");
                    break;
                }
                None => break,
            },
            routed = rx.recv() => match routed {
                Ok(routed) => {
                    if !matches_any(&subscriptions, &routed.topic) {
                        continue;
                    }
                    if let Err(e) = out.send(routed.body).await {
                        debug!(%peer, error = %e, "Subscriber write failed");
                        break;
                    }
                    stats.forwarded.fetch_add(1, Ordering::Relaxed);
                }
                Err(RecvError::Lagged(skipped)) => {
                    stats.dropped_lagged.fetch_add(skipped, Ordering::Relaxed);
                    warn!(%peer, dropped = skipped, "Subscriber lagging, frames dropped");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    stats.subscribers.fetch_sub(1, Ordering::Relaxed);
    debug!(%peer, "Subscriber disconnected");
}

/// Prefix match; an empty subscription matches every topic.
fn matches_any(subscriptions: &[Bytes], topic: &[u8]) -> bool {
    subscriptions.iter().any(|prefix| topic.starts_with(prefix))
}
