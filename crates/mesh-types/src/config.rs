//! Configuration loading for the mesh.
//!
//! Layered config: defaults -> config file -> `--config` file -> env vars.
//! CLI flags are applied by the caller on top of the loaded [`Settings`].
//!
//! Environment variables use the `MESH_` prefix and `__` between nested
//! keys, e.g. `MESH_ROUTER__FRONTEND_ADDR` or `MESH_TOPICS__K`.

use config::{Config, Environment, File};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::MeshError;

const APP_NAME: &str = "mesh";

/// Topic router settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterSettings {
    /// Publishers connect here
    #[serde(default = "default_frontend_addr")]
    pub frontend_addr: String,

    /// Subscribers connect here
    #[serde(default = "default_backend_addr")]
    pub backend_addr: String,

    /// Frames buffered per subscriber before the slowest one starts losing traffic
    #[serde(default = "default_subscriber_buffer")]
    pub subscriber_buffer: usize,
}

fn default_frontend_addr() -> String {
    "127.0.0.1:5555".to_string()
}

fn default_backend_addr() -> String {
    "127.0.0.1:5556".to_string()
}

fn default_subscriber_buffer() -> usize {
    1024
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            frontend_addr: default_frontend_addr(),
            backend_addr: default_backend_addr(),
            subscriber_buffer: default_subscriber_buffer(),
        }
    }
}

impl RouterSettings {
    pub fn validate(&self) -> Result<(), String> {
        if self.subscriber_buffer == 0 {
            return Err("router.subscriber_buffer must be > 0".to_string());
        }
        if self.frontend_addr == self.backend_addr {
            return Err(format!(
                "router.frontend_addr and router.backend_addr must differ, both are {}",
                self.frontend_addr
            ));
        }
        Ok(())
    }
}

/// Durable recorder settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecorderSettings {
    /// Direct ingestion endpoint
    #[serde(default = "default_ingest_addr")]
    pub ingest_addr: String,

    /// Directory holding the session log, recovery log and checkpoints
    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    #[serde(default = "default_checkpoint_interval_secs")]
    pub checkpoint_interval_secs: u64,

    /// 6-field cron expression; overrides `checkpoint_interval_secs` when set
    #[serde(default)]
    pub checkpoint_schedule: Option<String>,

    /// Subscribe to all router traffic
    #[serde(default = "default_true")]
    pub subscribe_router: bool,

    /// Domain assigned when no keyword matches
    #[serde(default = "default_domain")]
    pub default_domain: String,

    /// Number of recent content hashes remembered for duplicate marking
    #[serde(default = "default_duplicate_window")]
    pub duplicate_window: usize,
}

fn default_ingest_addr() -> String {
    "127.0.0.1:5557".to_string()
}

fn default_log_dir() -> String {
    ProjectDirs::from("", "", APP_NAME)
        .map(|p| p.data_local_dir().join("conversation_logs"))
        .unwrap_or_else(|| PathBuf::from("./conversation_logs"))
        .to_string_lossy()
        .to_string()
}

fn default_checkpoint_interval_secs() -> u64 {
    300
}

fn default_true() -> bool {
    true
}

fn default_domain() -> String {
    "system_architecture".to_string()
}

fn default_duplicate_window() -> usize {
    10_000
}

impl Default for RecorderSettings {
    fn default() -> Self {
        Self {
            ingest_addr: default_ingest_addr(),
            log_dir: default_log_dir(),
            checkpoint_interval_secs: default_checkpoint_interval_secs(),
            checkpoint_schedule: None,
            subscribe_router: true,
            default_domain: default_domain(),
            duplicate_window: default_duplicate_window(),
        }
    }
}

impl RecorderSettings {
    pub fn validate(&self) -> Result<(), String> {
        if self.checkpoint_interval_secs == 0 {
            return Err("recorder.checkpoint_interval_secs must be > 0".to_string());
        }
        if self.duplicate_window == 0 {
            return Err("recorder.duplicate_window must be > 0".to_string());
        }
        if self.default_domain.trim().is_empty() {
            return Err("recorder.default_domain must not be empty".to_string());
        }
        if let Some(schedule) = &self.checkpoint_schedule {
            if schedule.split_whitespace().count() != 6 {
                return Err(format!(
                    "recorder.checkpoint_schedule must have 6 fields (sec min hour dom mon dow), got '{schedule}'"
                ));
            }
        }
        Ok(())
    }

    /// Log directory with `~` and environment variables expanded.
    pub fn expanded_log_dir(&self) -> PathBuf {
        PathBuf::from(shellexpand::full(&self.log_dir).map_or_else(
            |_| self.log_dir.clone(),
            |expanded| expanded.into_owned(),
        ))
    }
}

/// Thread reconstruction settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconstructSettings {
    /// Gap that starts a new time-based thread
    #[serde(default = "default_max_gap_secs")]
    pub max_gap_secs: u64,

    #[serde(default = "default_min_messages")]
    pub min_messages: usize,

    #[serde(default = "default_min_duration_secs")]
    pub min_duration_secs: u64,

    /// Consecutive events a new domain tag must hold to count as a shift
    #[serde(default = "default_stability_window")]
    pub stability_window: usize,
}

fn default_max_gap_secs() -> u64 {
    300
}

fn default_min_messages() -> usize {
    2
}

fn default_min_duration_secs() -> u64 {
    5
}

fn default_stability_window() -> usize {
    2
}

impl Default for ReconstructSettings {
    fn default() -> Self {
        Self {
            max_gap_secs: default_max_gap_secs(),
            min_messages: default_min_messages(),
            min_duration_secs: default_min_duration_secs(),
            stability_window: default_stability_window(),
        }
    }
}

impl ReconstructSettings {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_gap_secs == 0 {
            return Err("reconstruct.max_gap_secs must be > 0".to_string());
        }
        if self.stability_window == 0 {
            return Err("reconstruct.stability_window must be >= 1".to_string());
        }
        Ok(())
    }
}

/// Superthread clustering settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterSettings {
    /// Target number of topics
    #[serde(default = "default_k")]
    pub k: usize,

    /// Terms used to name a topic
    #[serde(default = "default_top_terms")]
    pub top_terms: usize,

    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Terms must appear in at least this many threads
    #[serde(default = "default_min_df")]
    pub min_df: usize,

    /// Terms in more than this share of threads are dropped
    #[serde(default = "default_max_df_ratio")]
    pub max_df_ratio: f64,

    /// Seed for factor initialization
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_k() -> usize {
    20
}

fn default_top_terms() -> usize {
    8
}

fn default_max_iterations() -> usize {
    500
}

fn default_min_df() -> usize {
    1
}

fn default_max_df_ratio() -> f64 {
    0.95
}

fn default_seed() -> u64 {
    42
}

impl Default for ClusterSettings {
    fn default() -> Self {
        Self {
            k: default_k(),
            top_terms: default_top_terms(),
            max_iterations: default_max_iterations(),
            min_df: default_min_df(),
            max_df_ratio: default_max_df_ratio(),
            seed: default_seed(),
        }
    }
}

impl ClusterSettings {
    pub const MAX_K: usize = 50;

    pub fn validate(&self) -> Result<(), String> {
        if !(1..=Self::MAX_K).contains(&self.k) {
            return Err(format!("topics.k must be 1-{}, got {}", Self::MAX_K, self.k));
        }
        if self.top_terms == 0 {
            return Err("topics.top_terms must be > 0".to_string());
        }
        if self.max_iterations == 0 {
            return Err("topics.max_iterations must be > 0".to_string());
        }
        if !(self.max_df_ratio > 0.0 && self.max_df_ratio <= 1.0) {
            return Err(format!(
                "topics.max_df_ratio must be in (0.0, 1.0], got {}",
                self.max_df_ratio
            ));
        }
        Ok(())
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub router: RouterSettings,

    #[serde(default)]
    pub recorder: RecorderSettings,

    #[serde(default)]
    pub reconstruct: ReconstructSettings,

    #[serde(default)]
    pub topics: ClusterSettings,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Settings {
    /// Load settings with layered precedence:
    /// 1. Built-in defaults
    /// 2. Config file in the project config dir (`mesh/config.*`)
    /// 3. CLI-specified config file (optional)
    /// 4. Environment variables (`MESH_*`)
    pub fn load(cli_config_path: Option<&str>) -> Result<Self, MeshError> {
        let config_dir = ProjectDirs::from("", "", APP_NAME)
            .map(|p| p.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        let default_config_path = config_dir.join("config");

        let mut builder = Config::builder()
            .add_source(File::with_name(&default_config_path.to_string_lossy()).required(false));

        if let Some(path) = cli_config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix("MESH")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder
            .build()
            .map_err(|e| MeshError::Config(e.to_string()))?;

        // Missing keys fall back to the serde defaults on each struct
        let settings: Settings = config
            .try_deserialize()
            .map_err(|e| MeshError::Config(e.to_string()))?;

        settings.validate()?;
        Ok(settings)
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<(), MeshError> {
        self.router.validate().map_err(MeshError::Config)?;
        self.recorder.validate().map_err(MeshError::Config)?;
        self.reconstruct.validate().map_err(MeshError::Config)?;
        self.topics.validate().map_err(MeshError::Config)?;
        Ok(())
    }
}
