//! Stream staging buffer

use tracing::{debug, trace};

use crate::config::StreamConfig;
use crate::format::BinaryFramer;
use crate::types::SampleHeader;
use crate::{RecorderError, Result, Timestamp};

/// Outcome of offering one sample to the stream.
#[derive(Debug, PartialEq, Eq)]
pub enum StreamAction {
    /// Nothing to send yet
    Buffered,
    /// A complete framed record ready for the network sender
    Flush(Vec<u8>),
}

/// Accumulates samples into network-sized records.
pub struct StreamAssembler {
    framer: BinaryFramer,
    buffer: Vec<u8>,
    capacity: usize,
    worst_case_sample: usize,
    max_wait_ms: u64,
    sample_count: u16,
    first_sample: Option<Timestamp>,
    last_flush: Option<Timestamp>,
}

impl StreamAssembler {
    pub fn new(framer: BinaryFramer, config: &StreamConfig, worst_case_sample: usize) -> Self {
        Self {
            framer,
            buffer: Vec::with_capacity(config.capacity),
            capacity: config.capacity,
            worst_case_sample,
            max_wait_ms: config.max_wait_ms,
            sample_count: 0,
            first_sample: None,
            last_flush: None,
        }
    }

    /// Payload bytes currently staged.
    pub fn staged_len(&self) -> usize {
        self.buffer.len()
    }

    pub fn staged_samples(&self) -> u16 {
        self.sample_count
    }

    /// Stage one sample and decide whether a record is due.
    ///
    /// Samples with no changed values are not staged, but the wait timer is
    /// still evaluated against their timestamp.
    pub fn offer(&mut self, header: &SampleHeader, delta: &[u8]) -> Result<StreamAction> {
        let now = header.timestamp;
        let last_flush = *self.last_flush.get_or_insert(now);

        if !delta.is_empty() {
            let needed = SampleHeader::ENCODED_LEN + delta.len();
            let available = self.capacity - self.buffer.len();
            if needed > available {
                return Err(RecorderError::capacity_exceeded("stream staging", needed, available));
            }
            header.write_to(&mut self.buffer);
            self.buffer.extend_from_slice(delta);
            self.sample_count += 1;
            self.first_sample.get_or_insert(now);
            trace!(staged = self.buffer.len(), samples = self.sample_count, "Staged stream sample");
        }

        if self.buffer.is_empty() {
            return Ok(StreamAction::Buffered);
        }

        let residual = self.capacity - self.buffer.len();
        let timed_out = now.has_elapsed(&last_flush, self.max_wait_ms);
        if residual < self.worst_case_sample || timed_out {
            debug!(
                bytes = self.buffer.len(),
                samples = self.sample_count,
                timed_out,
                "Flushing stream buffer"
            );
            return self.flush(now).map(StreamAction::Flush);
        }

        Ok(StreamAction::Buffered)
    }

    /// Frame whatever is staged and reset the buffer.
    ///
    /// The buffer is cleared even when framing fails, so a bad record can never
    /// wedge the stream.
    pub fn flush(&mut self, now: Timestamp) -> Result<Vec<u8>> {
        let first = self.first_sample.take().unwrap_or(now);
        let count = std::mem::take(&mut self.sample_count);
        let framed = self.framer.frame_record(first, &self.buffer, count);
        self.buffer.clear();
        self.last_flush = Some(now);
        framed
    }
}
