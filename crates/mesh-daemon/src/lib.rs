//! Library side of the `mesh` binary.
//!
//! # Modules
//!
//! - `cli`: Command-line argument parsing with clap
//! - `commands`: Command implementations

pub mod cli;
pub mod commands;

pub use cli::{Cli, Commands, LogCommands};
pub use commands::{
    cluster, handle_log_command, init_logging, load_settings, publish, reconstruct,
    shutdown_signal, start_recorder, start_router, PublishArgs, ReconstructArgs,
};
