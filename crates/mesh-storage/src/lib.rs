//! File-level durability for the mesh recorder.
//!
//! Provides:
//! - Append-only session log mirrored to a recovery log, both synced per write
//! - Crash recovery of torn lines and unmirrored entries on open
//! - Immutable checkpoint documents written via temp file + rename
//! - Offline readers (recent, search, stats) and operator archival
//!
//! Layout under the log directory:
//!
//! ```text
//! <log_dir>/
//!   current_session.jsonl
//!   recovery/crash_recovery.jsonl
//!   checkpoints/<timestamp>_<label>.json
//!   archive/<timestamp>/
//! ```

pub mod checkpoint;
pub mod error;
pub mod layout;
pub mod reader;
pub mod recovery;
pub mod session;

pub use checkpoint::{CheckpointInfo, CheckpointStore};
pub use error::StorageError;
pub use layout::LogLayout;
pub use reader::{read_session_events, recent, search, LogRead, SessionStats};
pub use recovery::RecoveryReport;
pub use session::{LogSink, SessionLog, SessionSnapshot};
