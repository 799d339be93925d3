//! Binary framing for stream records and export files
//!
//! This module owns the recorder's wire formats:
//!
//! 1. **Stream Header** (85 bytes) - precedes every network flush and every
//!    record in a log file
//! 2. **Sample payload** - `sample_count` × (sample header + changed values)
//! 3. **Compilation Header** (80 bytes) - precedes the concatenated ring in an
//!    export file, after the configuration text
//!
//! All multi-byte integers are big-endian and all access is bounds-checked.

pub mod codec;
pub mod header;
pub mod record;

pub use header::{
    BinaryFramer, COMPILATION_DELIMITER, CompilationHeader, HeaderKind, MAX_PAYLOAD_LEN,
    RecorderIdentity, STREAM_DELIMITER, StreamHeader, verify_header,
};
pub use record::{Record, RecordWalker};
