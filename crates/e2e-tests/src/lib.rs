//! End-to-end test infrastructure for the synaptic mesh.
//!
//! Provides a [`TestHarness`] that runs a router and a recorder on
//! ephemeral ports over a temp log directory, plus event helpers.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use tokio::task::JoinHandle;

use mesh_client::{IngestClient, Publisher};
use mesh_recorder::{Recorder, RecorderError, RecorderHandle};
use mesh_router::{BoundRouter, RouterError, RouterHandle};
use mesh_storage::{read_session_events, CheckpointStore, LogLayout};
use mesh_types::{Event, RecorderSettings, RouterSettings};

/// Router plus recorder running in-process.
pub struct TestHarness {
    /// Keeps temp dir alive for the lifetime of the harness
    pub temp_dir: tempfile::TempDir,
    pub layout: LogLayout,
    pub frontend: Option<String>,
    pub ingest: String,
    pub router: Option<RouterHandle>,
    pub recorder: RecorderHandle,
    router_task: Option<JoinHandle<Result<(), RouterError>>>,
    recorder_task: JoinHandle<Result<(), RecorderError>>,
}

impl TestHarness {
    /// Start a router and a recorder following it.
    pub async fn start() -> Self {
        let router = BoundRouter::bind(&RouterSettings {
            frontend_addr: "127.0.0.1:0".to_string(),
            backend_addr: "127.0.0.1:0".to_string(),
            subscriber_buffer: 1024,
        })
        .await
        .expect("Failed to bind router");
        let frontend = router.frontend_addr().expect("frontend addr").to_string();
        let backend = router.backend_addr().expect("backend addr").to_string();
        let router_handle = router.handle();
        let router_task = tokio::spawn(router.run_with_shutdown(std::future::pending()));

        let mut harness = Self::start_recorder(Some(backend)).await;
        harness.frontend = Some(frontend);
        harness.router = Some(router_handle.clone());
        harness.router_task = Some(router_task);

        // Wait until the recorder's subscription is in place
        for _ in 0..100 {
            if router_handle.stats().subscribers > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        harness
    }

    /// Start a recorder with direct ingestion only.
    pub async fn start_direct_only() -> Self {
        Self::start_recorder(None).await
    }

    async fn start_recorder(router_backend: Option<String>) -> Self {
        let temp_dir = tempfile::TempDir::new().expect("Failed to create temp dir");
        let settings = RecorderSettings {
            ingest_addr: "127.0.0.1:0".to_string(),
            log_dir: temp_dir.path().to_string_lossy().to_string(),
            ..Default::default()
        };
        let recorder = Recorder::open(&settings, router_backend.as_deref())
            .await
            .expect("Failed to open recorder");
        let ingest = recorder.ingest_addr().expect("ingest addr").to_string();
        let handle = recorder.handle();
        let recorder_task = tokio::spawn(recorder.run_with_shutdown(std::future::pending()));

        Self {
            layout: LogLayout::new(temp_dir.path()),
            temp_dir,
            frontend: None,
            ingest,
            router: None,
            recorder: handle,
            router_task: None,
            recorder_task,
        }
    }

    pub async fn publisher(&self) -> Publisher {
        let frontend = self.frontend.as_deref().expect("harness has no router");
        Publisher::connect(frontend)
            .await
            .expect("Failed to connect publisher")
    }

    pub async fn ingest_client(&self) -> IngestClient {
        IngestClient::connect(&self.ingest)
            .await
            .expect("Failed to connect ingest client")
    }

    /// Wait until the recorder has appended at least `count` events.
    pub async fn wait_for_recorded(&self, count: u64) {
        for _ in 0..250 {
            if self.recorder.stats().recorded >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!(
            "recorder stuck at {} of {count} events",
            self.recorder.stats().recorded
        );
    }

    /// Events currently in the session log.
    pub fn recorded_events(&self) -> Vec<Event> {
        read_session_events(&self.layout.session_path())
            .expect("Failed to read session log")
            .events
    }

    pub fn session_path(&self) -> PathBuf {
        self.layout.session_path()
    }

    pub fn checkpoints(&self) -> CheckpointStore {
        CheckpointStore::new(self.layout.checkpoint_dir())
    }

    /// Stop the recorder (writing its final checkpoint) and the router.
    ///
    /// The temp dir stays alive so the log can still be inspected.
    pub async fn shutdown(self) -> tempfile::TempDir {
        self.recorder.shutdown();
        self.recorder_task
            .await
            .expect("recorder task panicked")
            .expect("recorder stopped with an error");
        if let (Some(router), Some(task)) = (self.router, self.router_task) {
            router.shutdown();
            task.await
                .expect("router task panicked")
                .expect("router stopped with an error");
        }
        self.temp_dir
    }
}

/// 2024-01-29 10:00:00 UTC plus `secs`.
pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 29, 10, 0, 0)
        .single()
        .expect("valid base time") + chrono::Duration::seconds(secs)
}

/// An event with a fixed timestamp.
pub fn event_at(sender: &str, topic: &str, payload: &str, secs: i64) -> Event {
    Event::new(sender, topic, payload).with_timestamp(at(secs))
}
