//! Recorder service: wires the writer, both ingestion paths and the
//! checkpoint timer together.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use mesh_scheduler::{SchedulerConfig, SchedulerService};
use mesh_storage::{CheckpointStore, LogLayout, LogSink, SessionLog};
use mesh_types::RecorderSettings;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::checkpoint::{Checkpointer, FINAL_CHECKPOINT_LABEL};
use crate::classify::{Classifier, ClassifierTables};
use crate::error::RecorderError;
use crate::stats::{RecorderStats, StatsInner};
use crate::writer::LogWriter;
use crate::{feed, ingest};

const CHECKPOINT_JOB: &str = "session_checkpoint";

/// Cheap handle for observing and stopping a running recorder.
#[derive(Debug, Clone)]
pub struct RecorderHandle {
    stats: Arc<StatsInner>,
    shutdown: CancellationToken,
    failure: CancellationToken,
}

impl RecorderHandle {
    pub fn stats(&self) -> RecorderStats {
        self.stats.snapshot()
    }

    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Whether the writer hit a durability failure.
    pub fn is_failed(&self) -> bool {
        self.failure.is_cancelled()
    }
}

/// A recorder with its log open and its ingestion listener bound.
pub struct Recorder {
    settings: RecorderSettings,
    router_backend: Option<String>,
    listener: TcpListener,
    writer: LogWriter,
    checkpointer: Checkpointer,
    handle: RecorderHandle,
}

impl Recorder {
    /// Open the session log (running crash recovery) and bind the direct
    /// ingestion endpoint. `router_backend` is the router's subscriber
    /// address; `None` disables the live feed.
    pub async fn open(
        settings: &RecorderSettings,
        router_backend: Option<&str>,
    ) -> Result<Self, RecorderError> {
        let tables = ClassifierTables::default().with_default_domain(&settings.default_domain);
        Self::open_with_tables(settings, router_backend, tables).await
    }

    pub async fn open_with_tables(
        settings: &RecorderSettings,
        router_backend: Option<&str>,
        tables: ClassifierTables,
    ) -> Result<Self, RecorderError> {
        let layout = LogLayout::new(settings.expanded_log_dir());
        let (log, report) = SessionLog::open(layout)?;
        info!(
            log_dir = %log.layout().root().display(),
            lines = report.session_lines,
            recovered = report.recovered_entries,
            "Session log open"
        );

        let stats = Arc::new(StatsInner::default());
        stats
            .recovered_on_start
            .store(report.recovered_entries, std::sync::atomic::Ordering::Relaxed);

        Self::with_sink(settings, router_backend, log, Classifier::new(tables)?, stats).await
    }

    pub(crate) async fn with_sink<S>(
        settings: &RecorderSettings,
        router_backend: Option<&str>,
        sink: S,
        classifier: Classifier,
        stats: Arc<StatsInner>,
    ) -> Result<Self, RecorderError>
    where
        S: LogSink + 'static,
    {
        let failure = CancellationToken::new();
        // Every ack is already synced, so the thread is left to exit with
        // its last handle.
        let (writer, _thread) = LogWriter::spawn(
            sink,
            classifier,
            settings.duplicate_window,
            stats.clone(),
            failure.clone(),
        )?;

        let store = CheckpointStore::new(LogLayout::new(settings.expanded_log_dir()).checkpoint_dir());
        let checkpointer = Checkpointer::new(writer.clone(), store, stats.clone());
        let listener = ingest::bind(&settings.ingest_addr).await?;

        Ok(Self {
            settings: settings.clone(),
            router_backend: router_backend
                .filter(|_| settings.subscribe_router)
                .map(String::from),
            listener,
            writer,
            checkpointer,
            handle: RecorderHandle {
                stats,
                shutdown: CancellationToken::new(),
                failure,
            },
        })
    }

    pub fn ingest_addr(&self) -> Result<SocketAddr, RecorderError> {
        Ok(self.listener.local_addr()?)
    }

    pub fn handle(&self) -> RecorderHandle {
        self.handle.clone()
    }

    /// Record until `shutdown` resolves, the handle is told to stop, or a
    /// write fails. A final checkpoint is attempted in every case; a
    /// write failure is returned as [`RecorderError::Durability`].
    pub async fn run_with_shutdown<F>(self, shutdown: F) -> Result<(), RecorderError>
    where
        F: Future<Output = ()> + Send,
    {
        let mut scheduler = SchedulerService::new(SchedulerConfig::default()).await?;
        self.register_checkpoint_job(&scheduler).await?;
        scheduler.start().await?;

        let stop = CancellationToken::new();
        let mut tasks = vec![tokio::spawn(ingest::serve_ingest(
            self.listener,
            self.writer.clone(),
            self.handle.stats.clone(),
            stop.clone(),
        ))];
        if let Some(addr) = self.router_backend.clone() {
            tasks.push(tokio::spawn(feed::follow_router(
                addr,
                self.writer.clone(),
                self.handle.stats.clone(),
                stop.clone(),
            )));
        }
        info!(
            router = self.router_backend.as_deref().unwrap_or("disabled"),
            "Recorder ready"
        );

        tokio::select! {
            _ = shutdown => info!("Recorder shutting down"),
            _ = self.handle.shutdown.cancelled() => info!("Recorder shutting down"),
            _ = self.handle.failure.cancelled() => error!("Recorder stopping after write failure"),
        }
        stop.cancel();

        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Recorder task ended abnormally");
            }
        }
        if let Err(e) = scheduler.shutdown().await {
            warn!(error = %e, "Scheduler shutdown failed");
        }

        if let Err(e) = self.checkpointer.checkpoint(FINAL_CHECKPOINT_LABEL).await {
            error!(error = %e, "Final checkpoint failed");
        }

        let stats = self.handle.stats();
        info!(
            recorded = stats.recorded,
            duplicates = stats.duplicates,
            malformed = stats.malformed_skipped,
            checkpoints = stats.checkpoints_created,
            "Recorder stopped"
        );

        if self.handle.is_failed() {
            return Err(RecorderError::Durability(
                "session log write failed; events after the failure were not recorded".to_string(),
            ));
        }
        Ok(())
    }

    async fn register_checkpoint_job(
        &self,
        scheduler: &SchedulerService,
    ) -> Result<(), RecorderError> {
        let checkpointer = self.checkpointer.clone();
        let job = move |_token: CancellationToken| {
            let checkpointer = checkpointer.clone();
            async move { checkpointer.run_scheduled().await }
        };

        match &self.settings.checkpoint_schedule {
            Some(cron) => {
                scheduler.add_cron_job(CHECKPOINT_JOB, cron, None, job).await?;
            }
            None => {
                let interval = Duration::from_secs(self.settings.checkpoint_interval_secs);
                scheduler.add_interval_job(CHECKPOINT_JOB, interval, job).await?;
            }
        }
        Ok(())
    }
}

/// Open, bind and record with the given settings until `shutdown` resolves.
pub async fn run_recorder_with_shutdown<F>(
    settings: &RecorderSettings,
    router_backend: Option<&str>,
    shutdown: F,
) -> Result<(), RecorderError>
where
    F: Future<Output = ()> + Send,
{
    Recorder::open(settings, router_backend)
        .await?
        .run_with_shutdown(shutdown)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::tests::FailingSink;
    use bytes::Bytes;
    use mesh_client::{ClientError, IngestClient, Publisher};
    use mesh_router::BoundRouter;
    use mesh_storage::read_session_events;
    use mesh_types::{Event, IncomingEvent, RouterSettings};
    use tempfile::TempDir;

    fn settings(dir: &TempDir) -> RecorderSettings {
        RecorderSettings {
            ingest_addr: "127.0.0.1:0".to_string(),
            log_dir: dir.path().to_string_lossy().to_string(),
            ..Default::default()
        }
    }

    async fn wait_for(handle: &RecorderHandle, recorded: u64) {
        for _ in 0..100 {
            if handle.stats().recorded >= recorded {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("recorder did not reach {recorded} events");
    }

    #[tokio::test]
    async fn test_direct_ingest_acks_after_write() {
        let dir = TempDir::new().unwrap();
        let recorder = Recorder::open(&settings(&dir), None).await.unwrap();
        let addr = recorder.ingest_addr().unwrap().to_string();
        let handle = recorder.handle();
        let run = tokio::spawn(recorder.run_with_shutdown(std::future::pending()));

        let mut client = IngestClient::connect(&addr).await.unwrap();
        let event = Event::new("claude_code", "X", "Upload the photo").with_role("Agent");
        let ack = client.ingest(&event).await.unwrap();
        assert_eq!(ack.event_id, event.id);
        assert_eq!(ack.sequence, 1);

        // Loose producers: no id, no topic
        let loose = IncomingEvent {
            id: None,
            timestamp: None,
            sender: Some("gemini".to_string()),
            sender_role: None,
            topic: None,
            correlation_id: None,
            payload: serde_json::json!({"message": "done"}),
        };
        let ack = client.ingest_incoming(&loose).await.unwrap();
        assert_eq!(ack.sequence, 2);

        // Acked means on disk
        let log = read_session_events(&dir.path().join("current_session.jsonl")).unwrap();
        assert_eq!(log.events.len(), 2);
        assert_eq!(log.events[0].metadata.domain_tag, "photo_capture");
        assert_eq!(log.events[1].topic, "general");

        let err = client.send_raw(Bytes::from_static(b"{oops")).await.unwrap_err();
        assert!(matches!(err, ClientError::Rejected(_)));
        assert_eq!(handle.stats().malformed_skipped, 1);

        handle.shutdown();
        run.await.unwrap().unwrap();

        let store = CheckpointStore::new(dir.path().join("checkpoints"));
        let latest = store.latest().unwrap().unwrap();
        assert_eq!(latest.label, FINAL_CHECKPOINT_LABEL);
        assert_eq!(latest.message_count, 2);
    }

    #[tokio::test]
    async fn test_records_router_traffic() {
        let router = BoundRouter::bind(&RouterSettings {
            frontend_addr: "127.0.0.1:0".to_string(),
            backend_addr: "127.0.0.1:0".to_string(),
            subscriber_buffer: 64,
        })
        .await
        .unwrap();
        let frontend = router.frontend_addr().unwrap().to_string();
        let backend = router.backend_addr().unwrap().to_string();
        let router_handle = router.handle();
        tokio::spawn(router.run_with_shutdown(std::future::pending()));

        let dir = TempDir::new().unwrap();
        let recorder = Recorder::open(&settings(&dir), Some(&backend)).await.unwrap();
        let handle = recorder.handle();
        let run = tokio::spawn(recorder.run_with_shutdown(std::future::pending()));

        // Wait until the recorder's subscription is in place
        for _ in 0..100 {
            if router_handle.stats().subscribers > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;

        let mut publisher = Publisher::connect(&frontend).await.unwrap();
        publisher.publish("noise", "not an event").await;
        publisher
            .publish_event(&Event::new("gpt", "planning", "Should we cache the index?"))
            .await;
        wait_for(&handle, 1).await;

        assert_eq!(handle.stats().malformed_skipped, 1);
        let log = read_session_events(&dir.path().join("current_session.jsonl")).unwrap();
        assert_eq!(log.events.len(), 1);
        assert_eq!(log.events[0].topic, "planning");
        assert_eq!(log.events[0].metadata.domain_tag, "data_management");

        handle.shutdown();
        run.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_write_failure_stops_recorder_with_error() {
        let dir = TempDir::new().unwrap();
        let sink = FailingSink {
            lines: Vec::new(),
            ok_appends: 0,
        };
        let recorder = Recorder::with_sink(
            &settings(&dir),
            None,
            sink,
            Classifier::new(ClassifierTables::default()).unwrap(),
            Arc::new(StatsInner::default()),
        )
        .await
        .unwrap();
        let addr = recorder.ingest_addr().unwrap().to_string();
        let handle = recorder.handle();
        let run = tokio::spawn(recorder.run_with_shutdown(std::future::pending()));

        let mut client = IngestClient::connect(&addr).await.unwrap();
        let err = client
            .ingest(&Event::new("a", "X", "lost"))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Rejected(_)));

        let result = tokio::time::timeout(Duration::from_secs(10), run)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(result, Err(RecorderError::Durability(_))));
        assert!(handle.is_failed());
    }
}
