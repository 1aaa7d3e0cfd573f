//! Command implementations for the `mesh` binary.
//!
//! Handles:
//! - router / recorder: long-running services with graceful shutdown
//! - publish: one event through the router or direct ingestion
//! - reconstruct / cluster: offline analysis stages
//! - log: offline queries and maintenance of the log directory

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tokio::signal;
use tracing::{info, warn};

use mesh_client::{IngestClient, Publisher};
use mesh_recorder::run_recorder_with_shutdown;
use mesh_router::run_router_with_shutdown;
use mesh_storage::{recent, search, CheckpointStore, LogLayout, SessionSnapshot, SessionStats};
use mesh_threads::Reconstructor;
use mesh_topics::{excluded_path, Clusterer};
use mesh_types::{Event, Settings};

use crate::cli::LogCommands;

/// Load settings and apply the global CLI overrides.
pub fn load_settings(config_path: Option<&str>, log_level: Option<&str>) -> Result<Settings> {
    let mut settings = Settings::load(config_path).context("Failed to load configuration")?;
    if let Some(level) = log_level {
        settings.log_level = level.to_string();
    }
    Ok(settings)
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over the configured level.
pub fn init_logging(settings: &Settings) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&settings.log_level)),
        )
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;
    Ok(())
}

/// Resolves on SIGINT or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down...");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down...");
        }
    }
}

/// Run the topic router until a shutdown signal.
pub async fn start_router(settings: &Settings) -> Result<()> {
    info!(
        frontend = %settings.router.frontend_addr,
        backend = %settings.router.backend_addr,
        buffer = settings.router.subscriber_buffer,
        "Router starting"
    );
    run_router_with_shutdown(&settings.router, shutdown_signal())
        .await
        .context("Router failed")?;
    Ok(())
}

/// Run the recorder until a shutdown signal.
///
/// Exits with an error if the log stopped accepting writes.
pub async fn start_recorder(
    settings: &Settings,
    log_dir_override: Option<&str>,
    no_router: bool,
) -> Result<()> {
    let mut recorder = settings.recorder.clone();
    if let Some(dir) = log_dir_override {
        recorder.log_dir = dir.to_string();
    }
    if no_router {
        recorder.subscribe_router = false;
    }

    info!(
        log_dir = %recorder.expanded_log_dir().display(),
        ingest = %recorder.ingest_addr,
        follow_router = recorder.subscribe_router,
        "Recorder starting"
    );
    run_recorder_with_shutdown(
        &recorder,
        Some(settings.router.backend_addr.as_str()),
        shutdown_signal(),
    )
    .await
    .context("Recorder stopped")?;
    Ok(())
}

/// Options for `mesh publish`.
#[derive(Debug, Clone)]
pub struct PublishArgs {
    pub topic: String,
    pub sender: String,
    pub role: Option<String>,
    pub correlation_id: Option<String>,
    pub direct: bool,
    pub message: String,
}

/// Send one event.
///
/// Direct publishing waits for the recorder's durable acknowledgement;
/// router publishing is fire-and-forget.
pub async fn publish(settings: &Settings, args: PublishArgs) -> Result<()> {
    let mut event = Event::new(args.sender, args.topic, args.message);
    if let Some(role) = args.role {
        event = event.with_role(role);
    }
    if let Some(correlation_id) = args.correlation_id {
        event = event.with_correlation_id(correlation_id);
    }

    if args.direct {
        let mut client = IngestClient::connect(&settings.recorder.ingest_addr)
            .await
            .with_context(|| format!("Failed to reach recorder at {}", settings.recorder.ingest_addr))?;
        let ack = client.ingest(&event).await.context("Ingestion failed")?;
        println!("Recorded {} (sequence {})", ack.event_id, ack.sequence);
    } else {
        let mut publisher = Publisher::connect(&settings.router.frontend_addr)
            .await
            .with_context(|| format!("Failed to reach router at {}", settings.router.frontend_addr))?;
        publisher.publish_event(&event).await;
        if publisher.dropped() > 0 {
            bail!("Event {} could not be delivered to the router", event.id);
        }
        println!("Published {} on '{}'", event.id, event.topic);
    }
    Ok(())
}

/// Options for `mesh reconstruct`.
#[derive(Debug, Clone, Default)]
pub struct ReconstructArgs {
    pub input: Option<String>,
    pub output: Option<String>,
    pub max_gap_secs: Option<u64>,
    pub min_messages: Option<usize>,
    pub min_duration_secs: Option<u64>,
}

pub fn reconstruct(settings: &Settings, args: ReconstructArgs) -> Result<()> {
    let mut reconstruct = settings.reconstruct.clone();
    if let Some(gap) = args.max_gap_secs {
        reconstruct.max_gap_secs = gap;
    }
    if let Some(min) = args.min_messages {
        reconstruct.min_messages = min;
    }
    if let Some(min) = args.min_duration_secs {
        reconstruct.min_duration_secs = min;
    }

    let layout = LogLayout::new(settings.recorder.expanded_log_dir());
    let input = args
        .input
        .map(PathBuf::from)
        .unwrap_or_else(|| layout.session_path());
    let output = args
        .output
        .map(PathBuf::from)
        .unwrap_or_else(|| layout.root().join("threads.jsonl"));

    let report = Reconstructor::new(reconstruct)
        .context("Invalid reconstruction settings")?
        .run(&input, &output)
        .with_context(|| format!("Failed to reconstruct {}", input.display()))?;

    println!("Threads written to {}", output.display());
    println!("  Records read:        {}", report.input_records);
    println!("  Malformed lines:     {}", report.malformed_lines);
    println!("  Timestamp anomalies: {}", report.timestamp_anomalies);
    println!("  Duplicates dropped:  {}", report.duplicates_dropped);
    println!("  Threads built:       {}", report.threads_built);
    println!("  Threads filtered:    {}", report.threads_filtered);
    println!("  Threads emitted:     {}", report.threads_emitted);
    Ok(())
}

pub fn cluster(settings: &Settings, input: &str, output: &str, k: Option<usize>) -> Result<()> {
    let mut topics = settings.topics.clone();
    if let Some(k) = k {
        topics.k = k;
    }

    let output = Path::new(output);
    let report = Clusterer::new(topics)
        .context("Invalid clustering settings")?
        .run(Path::new(input), output)
        .with_context(|| format!("Failed to cluster {input}"))?;

    println!("Superthreads written to {}", output.display());
    println!("  Threads:    {}", report.threads_in);
    println!("  Clustered:  {}", report.clustered);
    println!(
        "  Excluded:   {} (see {})",
        report.excluded.len(),
        excluded_path(output).display()
    );
    println!("  Topics:     {}", report.topics);
    println!("  Vocabulary: {}", report.vocabulary_size);
    Ok(())
}

/// Offline log commands. Reads whatever is on disk.
pub fn handle_log_command(
    settings: &Settings,
    log_dir_override: Option<&str>,
    command: LogCommands,
) -> Result<()> {
    let root = log_dir_override
        .map(PathBuf::from)
        .unwrap_or_else(|| settings.recorder.expanded_log_dir());
    let layout = LogLayout::new(root);
    let session = layout.session_path();

    match command {
        LogCommands::Recent { n } => {
            let events = recent(&session, n).context("Failed to read session log")?;
            if events.is_empty() {
                println!("No events recorded");
            }
            for event in &events {
                print_event(event);
            }
        }
        LogCommands::Search { query, limit } => {
            let events = search(&session, &query, limit).context("Failed to search session log")?;
            println!("{} match(es) for '{}'", events.len(), query);
            for event in &events {
                print_event(event);
            }
        }
        LogCommands::Stats => {
            let stats = SessionStats::compute(&session).context("Failed to read session log")?;
            println!("Session log: {}", session.display());
            println!("  Messages:        {}", stats.message_count);
            println!("  Malformed lines: {}", stats.malformed_lines);
            println!("  Size:            {} bytes", stats.size_bytes);
            println!("  Duplicates:      {}", stats.duplicates);
            println!("  Senders:         {}", stats.senders.len());
            for (domain, count) in &stats.by_domain {
                println!("  domain {domain}: {count}");
            }
            for (tier, count) in &stats.by_tier {
                println!("  tier {tier}: {count}");
            }
        }
        LogCommands::Checkpoints => {
            let store = CheckpointStore::new(layout.checkpoint_dir());
            let infos = store.list().context("Failed to list checkpoints")?;
            if infos.is_empty() {
                println!("No checkpoints");
            }
            for info in infos {
                println!("{}  {}  {} bytes", info.path.display(), info.label, info.size_bytes);
            }
        }
        LogCommands::Checkpoint { label } => {
            let snapshot = offline_snapshot(&session)?;
            let store = CheckpointStore::new(layout.checkpoint_dir());
            let info = store
                .create(&label, &snapshot)
                .context("Failed to write checkpoint")?;
            println!("Checkpoint written to {}", info.path.display());
        }
        LogCommands::Archive => match layout.archive_session().context("Failed to archive")? {
            Some(target) => println!("Session archived to {}", target.display()),
            None => println!("No session to archive"),
        },
    }

    Ok(())
}

/// Snapshot of the session file as it is on disk, up to its last newline.
fn offline_snapshot(session: &Path) -> Result<SessionSnapshot> {
    if !session.exists() {
        return Ok(SessionSnapshot::default());
    }
    let mut bytes = fs::read(session)
        .with_context(|| format!("Failed to read {}", session.display()))?;
    let complete = bytes
        .iter()
        .rposition(|b| *b == b'\n')
        .map_or(0, |i| i + 1);
    bytes.truncate(complete);
    let line_count = bytes.iter().filter(|b| **b == b'\n').count() as u64;
    Ok(SessionSnapshot { bytes, line_count })
}

fn print_event(event: &Event) {
    println!(
        "{}  [{}] {} ({}/{}): {}",
        event.timestamp.format("%Y-%m-%d %H:%M:%S"),
        event.topic,
        event.sender,
        event.metadata.domain_tag,
        event.metadata.tier,
        event.payload
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::TempDir;

    #[test]
    fn test_offline_snapshot_drops_partial_line() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("current_session.jsonl");
        fs::write(&path, "{\"a\":1}\n{\"b\":2}\n{\"torn\"").unwrap();

        let snapshot = offline_snapshot(&path).unwrap();
        assert_eq!(snapshot.line_count, 2);
        assert_eq!(snapshot.lines().count(), 2);
    }

    #[test]
    fn test_offline_snapshot_missing_file() {
        let dir = TempDir::new().unwrap();
        let snapshot = offline_snapshot(&dir.path().join("none.jsonl")).unwrap();
        assert_eq!(snapshot.line_count, 0);
        assert!(snapshot.bytes.is_empty());
    }

    #[test]
    fn test_log_checkpoint_and_archive() {
        let dir = TempDir::new().unwrap();
        let layout = LogLayout::new(dir.path());
        let event = Event::new("pm_alpha", "planning", "hello");
        fs::write(
            layout.session_path(),
            format!("{}\n", serde_json::to_string(&event).unwrap()),
        )
        .unwrap();

        let settings = Settings::default();
        let root = dir.path().to_str().unwrap();
        handle_log_command(
            &settings,
            Some(root),
            LogCommands::Checkpoint {
                label: "manual".to_string(),
            },
        )
        .unwrap();

        let infos = CheckpointStore::new(layout.checkpoint_dir()).list().unwrap();
        assert_eq!(infos.len(), 1);
        assert_eq!(infos[0].label, "manual");
        let checkpoint = CheckpointStore::load(&infos[0].path).unwrap();
        assert_eq!(checkpoint.message_count, 1);

        handle_log_command(&settings, Some(root), LogCommands::Archive).unwrap();
        assert!(!layout.session_path().exists());
    }

    #[test]
    fn test_reconstruct_and_cluster_commands() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("session.jsonl");
        let threads = dir.path().join("threads.jsonl");
        let supers = dir.path().join("superthreads.json");
        let start = Utc::now();
        let lines: Vec<String> = (0..3)
            .map(|i| {
                let event = Event::new("dev", "build", format!("compile shader pipeline step {i}"))
                    .with_timestamp(start + chrono::Duration::seconds(i * 10));
                serde_json::to_string(&event).unwrap()
            })
            .collect();
        fs::write(&log, lines.join("\n") + "\n").unwrap();

        let settings = Settings::default();
        reconstruct(
            &settings,
            ReconstructArgs {
                input: Some(log.display().to_string()),
                output: Some(threads.display().to_string()),
                ..Default::default()
            },
        )
        .unwrap();
        assert!(threads.exists());

        cluster(
            &settings,
            threads.to_str().unwrap(),
            supers.to_str().unwrap(),
            Some(1),
        )
        .unwrap();
        assert!(supers.exists());
        assert!(excluded_path(&supers).exists());
    }
}
