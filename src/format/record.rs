//! Sequential record access over a log file's bytes

use super::header::StreamHeader;
use crate::{RecorderError, Result};

/// One complete record inside a byte buffer.
#[derive(Debug, Clone)]
pub struct Record<'a> {
    /// Offset of the record delimiter within the buffer
    pub offset: usize,
    pub header: StreamHeader,
    pub payload: &'a [u8],
}

/// Walks records front to back using each header's declared size.
///
/// Yields `Err` once and then stops if a record is malformed or runs past the
/// end of the buffer.
pub struct RecordWalker<'a> {
    data: &'a [u8],
    pos: usize,
    failed: bool,
}

impl<'a> RecordWalker<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0, failed: false }
    }

    /// Offset just past the last record yielded so far.
    pub fn position(&self) -> usize {
        self.pos
    }
}

impl<'a> Iterator for RecordWalker<'a> {
    type Item = Result<Record<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.pos >= self.data.len() {
            return None;
        }

        let offset = self.pos;
        let header = match StreamHeader::parse(&self.data[offset..]) {
            Ok(header) => header,
            Err(e) => {
                self.failed = true;
                return Some(Err(e));
            }
        };

        let end = offset + header.record_len();
        if end > self.data.len() {
            self.failed = true;
            return Some(Err(RecorderError::parse(
                "Record walk",
                format!(
                    "Record at offset {} declares {} bytes, only {} remain",
                    offset,
                    header.record_len(),
                    self.data.len() - offset
                ),
            )));
        }

        let payload = &self.data[offset + StreamHeader::LEN..end];
        self.pos = end;
        Some(Ok(Record { offset, header, payload }))
    }
}
