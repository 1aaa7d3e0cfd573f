//! Single writer for the session log.
//!
//! Both ingestion paths and the checkpoint job talk to one actor running
//! on a dedicated OS thread. The actor owns the [`LogSink`], so appends
//! and snapshots are serialized without a shared lock. An append is only
//! acknowledged after the sink has synced it.
//!
//! The first sink failure puts the writer into a failed state: the
//! failure token is cancelled, and every later append is rejected with
//! [`RecorderError::Durability`].

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::thread::JoinHandle;

use lru::LruCache;
use mesh_storage::{LogSink, SessionSnapshot};
use mesh_types::{Event, IngestAck};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::classify::Classifier;
use crate::error::RecorderError;
use crate::stats::StatsInner;

const REQUEST_BUFFER: usize = 1024;
const PROGRESS_EVERY: u64 = 10;

enum Request {
    Append {
        event: Event,
        reply: oneshot::Sender<Result<IngestAck, RecorderError>>,
    },
    Snapshot {
        reply: oneshot::Sender<Result<SessionSnapshot, RecorderError>>,
    },
    LineCount {
        reply: oneshot::Sender<u64>,
    },
}

/// Handle to the writer actor. Cheap to clone.
#[derive(Clone)]
pub struct LogWriter {
    tx: mpsc::Sender<Request>,
}

impl LogWriter {
    /// Start the writer thread over `sink`.
    ///
    /// The thread exits once every handle has been dropped.
    pub(crate) fn spawn<S>(
        sink: S,
        classifier: Classifier,
        duplicate_window: usize,
        stats: Arc<StatsInner>,
        failure: CancellationToken,
    ) -> Result<(Self, JoinHandle<()>), RecorderError>
    where
        S: LogSink + 'static,
    {
        let (tx, rx) = mpsc::channel(REQUEST_BUFFER);
        let window = NonZeroUsize::new(duplicate_window.max(1)).unwrap_or(NonZeroUsize::MIN);
        let actor = WriterActor {
            sink,
            classifier,
            recent: LruCache::new(window),
            stats,
            failure,
            failed: None,
        };

        let thread = std::thread::Builder::new()
            .name("mesh-writer".to_string())
            .spawn(move || actor.run(rx))?;

        Ok((Self { tx }, thread))
    }

    /// Classify and durably append `event`.
    pub async fn append(&self, event: Event) -> Result<IngestAck, RecorderError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Request::Append { event, reply })
            .await
            .map_err(|_| RecorderError::WriterStopped)?;
        rx.await.map_err(|_| RecorderError::WriterStopped)?
    }

    /// Copy of the session log between two appends.
    pub async fn snapshot(&self) -> Result<SessionSnapshot, RecorderError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Request::Snapshot { reply })
            .await
            .map_err(|_| RecorderError::WriterStopped)?;
        rx.await.map_err(|_| RecorderError::WriterStopped)?
    }

    /// Number of lines in the session log, without copying it.
    pub async fn line_count(&self) -> Result<u64, RecorderError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Request::LineCount { reply })
            .await
            .map_err(|_| RecorderError::WriterStopped)?;
        rx.await.map_err(|_| RecorderError::WriterStopped)
    }
}

struct WriterActor<S> {
    sink: S,
    classifier: Classifier,
    /// content_hash -> id of the first event seen with it
    recent: LruCache<String, String>,
    stats: Arc<StatsInner>,
    failure: CancellationToken,
    failed: Option<String>,
}

impl<S: LogSink> WriterActor<S> {
    fn run(mut self, mut rx: mpsc::Receiver<Request>) {
        debug!(lines = self.sink.line_count(), "Writer started");
        while let Some(request) = rx.blocking_recv() {
            match request {
                Request::Append { event, reply } => {
                    let _ = reply.send(self.append(event));
                }
                Request::Snapshot { reply } => {
                    let _ = reply.send(self.sink.snapshot().map_err(RecorderError::from));
                }
                Request::LineCount { reply } => {
                    let _ = reply.send(self.sink.line_count());
                }
            }
        }
        debug!("Writer stopped");
    }

    fn append(&mut self, mut event: Event) -> Result<IngestAck, RecorderError> {
        if let Some(reason) = &self.failed {
            return Err(RecorderError::Durability(format!(
                "log unavailable after earlier failure: {reason}"
            )));
        }

        let mut metadata = self
            .classifier
            .classify(event.sender_role.as_deref(), &event.payload);
        metadata.sequence = self.sink.line_count() + 1;
        metadata.duplicate_of = self.recent.get(&metadata.content_hash).cloned();
        event.metadata = metadata;

        let line = serde_json::to_string(&event)?;
        let sequence = match self.sink.append(&line) {
            Ok(sequence) => sequence,
            Err(e) => {
                error!(event_id = %event.id, error = %e, "Session log write failed, recorder stopping");
                self.failed = Some(e.to_string());
                self.failure.cancel();
                return Err(RecorderError::Durability(e.to_string()));
            }
        };

        if event.metadata.duplicate_of.is_some() {
            StatsInner::incr(&self.stats.duplicates);
        } else {
            self.recent
                .put(event.metadata.content_hash.clone(), event.id.clone());
        }

        let recorded = StatsInner::incr(&self.stats.recorded);
        if recorded % PROGRESS_EVERY == 0 {
            info!(recorded, sequence, "Recording progress");
        }
        debug!(
            event_id = %event.id,
            sequence,
            domain = %event.metadata.domain_tag,
            tier = %event.metadata.tier,
            "Event recorded"
        );

        Ok(IngestAck {
            event_id: event.id,
            sequence,
        })
    }
}
