//! Durable log path
//!
//! Samples accumulate in a pair of ping/pong buffers ([`DualBufferLog`]); full
//! buffers go to a writer that frames them into a fixed ring of files
//! ([`FileRotationStore`]). Wrapping the ring compiles every file into one
//! export for off-board delivery.

mod dual_buffer;
mod export;
mod integrity;
mod store;

pub use dual_buffer::{BufferSlot, DualBufferLog, LogBuffer, LogFlush};
pub use export::{
    EXPORT_EXTENSION, EXPORT_FILLER, ExportTransport, NullTransport, export_file_name,
};
pub use integrity::{FileSummary, IntegrityStatus, repaired_len, summarize, verify_integrity};
pub use store::{FileRotationStore, FileState, LOG_EXTENSION, RecoveryReport, WriteOutcome};
