//! # mesh-threads
//!
//! Offline thread reconstruction over a session log or a checkpoint.
//!
//! The pass is:
//! 1. Load records leniently (bad records are counted, never fatal)
//! 2. Drop repeats: an id or content hash already seen, or a record the recorder flagged
//! 3. Sort by timestamp, keeping log order for ties
//! 4. Group by correlation id, then split the rest on time gaps
//! 5. Summarize each group and drop threads below the minimum size or
//!    duration
//! 6. Write one thread per line, sorted by start time
//!
//! Thread ids are derived from the grouping (`ctx:<id>`, `session_<n>`),
//! so output is byte-identical across runs on the same input.

pub mod error;
pub mod group;
pub mod load;
pub mod reconstruct;
pub mod summary;

pub use error::ReconstructError;
pub use group::{group_events, Group};
pub use load::{load_events, InputKind, LoadedLog, SENTINEL_TIMESTAMP};
pub use reconstruct::{read_threads, write_threads, ReconstructionReport, Reconstructor};
pub use summary::{context_shifts, dominant, final_status, summarize};
