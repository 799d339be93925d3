//! Startup integrity check for ring files
//!
//! A write interrupted by power loss leaves a partial record at the end of a
//! file. The check finds the last record header that verifies, compares the
//! size it declares with the bytes actually left in the file, and cuts the file
//! back to a record boundary. Delimiter bytes that happen to occur inside a
//! payload are skipped because their header CRC does not verify.

use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::format::{RecordWalker, STREAM_DELIMITER, StreamHeader, verify_header};
use crate::{RecorderError, Result, Timestamp};

/// Result of checking one ring slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegrityStatus {
    /// File ends exactly at a record boundary
    Valid,
    /// Trailing bytes were removed; the remaining records are intact
    Repaired,
    /// No usable record; the file was deleted
    Invalid,
    /// No file exists for the slot
    Absent,
    /// The file could not be read or repaired; the slot is skipped
    Unreadable,
}

impl IntegrityStatus {
    /// Whether the slot holds records after the check.
    pub fn is_usable(&self) -> bool {
        matches!(self, IntegrityStatus::Valid | IntegrityStatus::Repaired)
    }
}

/// Time range and record count of one ring file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileSummary {
    pub first: Timestamp,
    pub last: Timestamp,
    pub records: u32,
    /// Bytes covered by complete records, from the start of the file
    pub complete_len: usize,
}

/// Offset of the last verified stream header in `data`.
pub fn last_record_offset(data: &[u8]) -> Option<usize> {
    let last_start = data.len().checked_sub(STREAM_DELIMITER.len())?;
    (0..=last_start).rev().find(|&i| {
        data[i..i + STREAM_DELIMITER.len()] == STREAM_DELIMITER && verify_header(&data[i..])
    })
}

/// Length `data` should be cut to, or `None` if nothing in it is usable.
pub fn repaired_len(data: &[u8]) -> Option<usize> {
    let offset = last_record_offset(data)?;
    let header = StreamHeader::parse(&data[offset..]).ok()?;
    let remaining = data.len() - offset;

    if remaining < header.record_len() {
        // interrupted write: drop the partial record
        (offset > 0).then_some(offset)
    } else {
        Some(offset + header.record_len())
    }
}

/// Check and repair the file at `path`.
pub fn verify_integrity(path: &Path) -> Result<IntegrityStatus> {
    let data = match fs::read(path) {
        Ok(data) => data,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(IntegrityStatus::Absent),
        Err(e) => return Err(RecorderError::file_error(path.to_path_buf(), e)),
    };

    match repaired_len(&data) {
        Some(len) if len == data.len() => {
            debug!(path = %path.display(), bytes = len, "Log file intact");
            Ok(IntegrityStatus::Valid)
        }
        Some(len) => {
            let issue = RecorderError::Integrity {
                path: path.to_path_buf(),
                details: format!("{} bytes past the last complete record", data.len() - len),
            };
            warn!(error = %issue, kept = len, "Truncating partial record");
            let file = OpenOptions::new()
                .write(true)
                .open(path)
                .map_err(|e| RecorderError::file_error(path.to_path_buf(), e))?;
            file.set_len(len as u64)
                .and_then(|_| file.sync_all())
                .map_err(|e| RecorderError::file_error(path.to_path_buf(), e))?;
            Ok(IntegrityStatus::Repaired)
        }
        None => {
            info!(
                path = %path.display(),
                bytes = data.len(),
                "Discarding log file without a usable record"
            );
            fs::remove_file(path).map_err(|e| RecorderError::file_error(path.to_path_buf(), e))?;
            Ok(IntegrityStatus::Invalid)
        }
    }
}

/// Summarize the complete records at the start of `data`.
///
/// Stops at the first malformed or partial record, so a copy taken while the
/// file was being appended still yields its intact prefix.
pub fn summarize(data: &[u8]) -> Option<FileSummary> {
    let mut walker = RecordWalker::new(data);
    let mut first = None;
    let mut last = None;
    let mut records = 0u32;

    for record in walker.by_ref() {
        let Ok(record) = record else { break };
        first.get_or_insert(record.header.timestamp);
        last = Some(record.header.timestamp);
        records += 1;
    }

    Some(FileSummary { first: first?, last: last?, records, complete_len: walker.position() })
}

/// Read and summarize the file at `path`, `None` when absent or empty of records.
pub fn summarize_file(path: &Path) -> Result<Option<FileSummary>> {
    match fs::read(path) {
        Ok(data) => Ok(summarize(&data)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(RecorderError::file_error(path.to_path_buf(), e)),
    }
}
