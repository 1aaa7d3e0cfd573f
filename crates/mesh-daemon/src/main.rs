//! Synaptic mesh command line.
//!
//! # Usage
//!
//! ```bash
//! mesh router
//! mesh recorder [--log-dir DIR] [--no-router]
//! mesh publish --topic T --sender S [--correlation-id C] [--direct] MESSAGE
//! mesh reconstruct [--input FILE] [--output FILE]
//! mesh cluster --input FILE --output FILE [-k N]
//! mesh log recent|search|stats|checkpoints|checkpoint|archive
//! ```
//!
//! # Configuration
//!
//! Configuration is loaded in order (later sources override earlier):
//! 1. Built-in defaults
//! 2. Config file (~/.config/mesh/config.toml, or --config)
//! 3. Environment variables (MESH_*)
//! 4. CLI flags

use anyhow::Result;
use clap::Parser;

use mesh_daemon::{
    cluster, handle_log_command, init_logging, load_settings, publish, reconstruct,
    start_recorder, start_router, Cli, Commands, PublishArgs, ReconstructArgs,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = load_settings(cli.config.as_deref(), cli.log_level.as_deref())?;
    init_logging(&settings)?;

    match cli.command {
        Commands::Router => {
            start_router(&settings).await?;
        }
        Commands::Recorder { log_dir, no_router } => {
            start_recorder(&settings, log_dir.as_deref(), no_router).await?;
        }
        Commands::Publish {
            topic,
            sender,
            role,
            correlation_id,
            direct,
            message,
        } => {
            publish(
                &settings,
                PublishArgs {
                    topic,
                    sender,
                    role,
                    correlation_id,
                    direct,
                    message,
                },
            )
            .await?;
        }
        Commands::Reconstruct {
            input,
            output,
            max_gap_secs,
            min_messages,
            min_duration_secs,
        } => {
            reconstruct(
                &settings,
                ReconstructArgs {
                    input,
                    output,
                    max_gap_secs,
                    min_messages,
                    min_duration_secs,
                },
            )?;
        }
        Commands::Cluster { input, output, k } => {
            cluster(&settings, &input, &output, k)?;
        }
        Commands::Log { log_dir, command } => {
            handle_log_command(&settings, log_dir.as_deref(), command)?;
        }
    }

    Ok(())
}
