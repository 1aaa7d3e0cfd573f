//! CLI argument parsing for the `mesh` binary.
//!
//! CLI flags override every other configuration source.

use clap::{Parser, Subcommand};

/// Synaptic mesh
///
/// Topic router, durable recorder and offline conversation analysis.
#[derive(Parser, Debug)]
#[command(name = "mesh")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file (overrides the default project config file)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Set log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the topic router until Ctrl+C or SIGTERM
    Router,

    /// Run the durable recorder until Ctrl+C or SIGTERM
    Recorder {
        /// Override the log directory
        #[arg(long)]
        log_dir: Option<String>,

        /// Only accept direct ingestion, do not follow the router
        #[arg(long)]
        no_router: bool,
    },

    /// Send one event through the router or straight to the recorder
    Publish {
        #[arg(short, long, default_value = "general")]
        topic: String,

        #[arg(short, long)]
        sender: String,

        /// Sender role, e.g. Architect
        #[arg(long)]
        role: Option<String>,

        #[arg(long)]
        correlation_id: Option<String>,

        /// Use the recorder's direct ingestion endpoint and wait for the ack
        #[arg(long)]
        direct: bool,

        message: String,
    },

    /// Rebuild conversation threads from a session log or checkpoint
    Reconstruct {
        /// Session log or checkpoint (default: current session log)
        #[arg(short, long)]
        input: Option<String>,

        /// Thread output file (default: threads.jsonl in the log directory)
        #[arg(short, long)]
        output: Option<String>,

        #[arg(long)]
        max_gap_secs: Option<u64>,

        #[arg(long)]
        min_messages: Option<usize>,

        #[arg(long)]
        min_duration_secs: Option<u64>,
    },

    /// Cluster reconstructed threads into superthreads
    Cluster {
        /// Thread file written by `reconstruct`
        #[arg(short, long)]
        input: String,

        /// Superthread output file
        #[arg(short, long)]
        output: String,

        /// Number of topics (1-50)
        #[arg(short)]
        k: Option<usize>,
    },

    /// Query and maintain the recorder's log directory
    Log {
        /// Override the log directory
        #[arg(long)]
        log_dir: Option<String>,

        #[command(subcommand)]
        command: LogCommands,
    },
}

/// Offline log subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum LogCommands {
    /// Show the most recent events
    Recent {
        #[arg(short, default_value = "20")]
        n: usize,
    },

    /// Case-insensitive search over payloads and senders
    Search {
        query: String,

        #[arg(long, default_value = "20")]
        limit: usize,
    },

    /// Session statistics
    Stats,

    /// List checkpoints, newest first
    Checkpoints,

    /// Write a checkpoint of the current session log
    Checkpoint {
        #[arg(long, default_value = "manual")]
        label: String,
    },

    /// Move the current session into the archive directory
    Archive,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_router() {
        let cli = Cli::parse_from(["mesh", "router"]);
        assert!(matches!(cli.command, Commands::Router));
    }

    #[test]
    fn test_cli_recorder_flags() {
        let cli = Cli::parse_from(["mesh", "recorder", "--log-dir", "/tmp/logs", "--no-router"]);
        match cli.command {
            Commands::Recorder { log_dir, no_router } => {
                assert_eq!(log_dir, Some("/tmp/logs".to_string()));
                assert!(no_router);
            }
            _ => panic!("Expected Recorder command"),
        }
    }

    #[test]
    fn test_cli_publish() {
        let cli = Cli::parse_from([
            "mesh",
            "publish",
            "--topic",
            "planning",
            "--sender",
            "pm_alpha",
            "--correlation-id",
            "ctx-1",
            "--direct",
            "Ready for review",
        ]);
        match cli.command {
            Commands::Publish {
                topic,
                sender,
                correlation_id,
                direct,
                message,
                ..
            } => {
                assert_eq!(topic, "planning");
                assert_eq!(sender, "pm_alpha");
                assert_eq!(correlation_id.as_deref(), Some("ctx-1"));
                assert!(direct);
                assert_eq!(message, "Ready for review");
            }
            _ => panic!("Expected Publish command"),
        }
    }

    #[test]
    fn test_cli_cluster_k() {
        let cli = Cli::parse_from(["mesh", "cluster", "-i", "t.jsonl", "-o", "s.json", "-k", "4"]);
        match cli.command {
            Commands::Cluster { k, .. } => assert_eq!(k, Some(4)),
            _ => panic!("Expected Cluster command"),
        }
    }

    #[test]
    fn test_cli_log_search() {
        let cli = Cli::parse_from(["mesh", "log", "search", "cache", "--limit", "5"]);
        match cli.command {
            Commands::Log {
                command: LogCommands::Search { query, limit },
                ..
            } => {
                assert_eq!(query, "cache");
                assert_eq!(limit, 5);
            }
            _ => panic!("Expected Log Search command"),
        }
    }

    #[test]
    fn test_cli_global_flags() {
        let cli = Cli::parse_from(["mesh", "log", "stats", "--log-level", "debug", "-c", "/etc/mesh.toml"]);
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        assert_eq!(cli.config.as_deref(), Some("/etc/mesh.toml"));
    }
}
