//! Ping/pong log buffers
//!
//! Exactly one buffer is active at a time. A flush moves the active buffer out
//! as a [`LogFlush`] and switches to the other slot in the same call, so the
//! next sample can never land in a buffer that is on its way to disk. The
//! writer hands drained buffers back through [`DualBufferLog::reclaim`]; when a
//! slot is still in flight at swap time a fresh buffer is allocated instead of
//! waiting.

use std::sync::Arc;
use tracing::{debug, trace};

use crate::config::LogConfig;
use crate::stats::PipelineStats;
use crate::types::SampleHeader;
use crate::{RecorderError, Result, Timestamp};

/// Which of the two log buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferSlot {
    Ping,
    Pong,
}

impl BufferSlot {
    const fn index(self) -> usize {
        match self {
            BufferSlot::Ping => 0,
            BufferSlot::Pong => 1,
        }
    }

    pub const fn other(self) -> Self {
        match self {
            BufferSlot::Ping => BufferSlot::Pong,
            BufferSlot::Pong => BufferSlot::Ping,
        }
    }
}

/// Bounded sample buffer handed whole to the writer.
#[derive(Debug, Clone, Default)]
pub struct LogBuffer {
    data: Vec<u8>,
    sample_count: u16,
    first: Option<Timestamp>,
    last: Option<Timestamp>,
}

impl LogBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self { data: Vec::with_capacity(capacity), ..Self::default() }
    }

    /// Staged samples: header plus delta, in arrival order.
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn sample_count(&self) -> u16 {
        self.sample_count
    }

    /// Timestamp of the first staged sample.
    pub fn first_timestamp(&self) -> Option<Timestamp> {
        self.first
    }

    pub fn last_timestamp(&self) -> Option<Timestamp> {
        self.last
    }

    fn push(&mut self, header: &SampleHeader, delta: &[u8]) {
        header.write_to(&mut self.data);
        self.data.extend_from_slice(delta);
        self.sample_count += 1;
        self.first.get_or_insert(header.timestamp);
        self.last = Some(header.timestamp);
    }

    /// Empty the buffer, keeping its allocation.
    pub fn clear(&mut self) {
        self.data.clear();
        self.sample_count = 0;
        self.first = None;
        self.last = None;
    }
}

/// A full buffer on its way to the writer.
#[derive(Debug)]
pub struct LogFlush {
    pub slot: BufferSlot,
    pub buffer: LogBuffer,
}

/// The two log buffers and the policy deciding when to swap them.
pub struct DualBufferLog {
    slots: [Option<LogBuffer>; 2],
    active: BufferSlot,
    capacity: usize,
    worst_case_sample: usize,
    max_samples: u16,
    max_wait_ms: u64,
    window_start: Option<Timestamp>,
    stats: Arc<PipelineStats>,
}

impl DualBufferLog {
    pub fn new(config: &LogConfig, worst_case_sample: usize, stats: Arc<PipelineStats>) -> Self {
        Self {
            slots: [
                Some(LogBuffer::with_capacity(config.capacity)),
                Some(LogBuffer::with_capacity(config.capacity)),
            ],
            active: BufferSlot::Ping,
            capacity: config.capacity,
            worst_case_sample,
            max_samples: config.max_samples,
            max_wait_ms: config.max_wait_ms,
            window_start: None,
            stats,
        }
    }

    /// The buffer currently receiving samples.
    pub fn active(&self) -> BufferSlot {
        self.active
    }

    /// Samples staged in the active buffer.
    pub fn staged_samples(&self) -> u16 {
        self.slots[self.active.index()].as_ref().map_or(0, LogBuffer::sample_count)
    }

    /// Whether the writer currently owns `slot`.
    pub fn in_flight(&self, slot: BufferSlot) -> bool {
        self.slots[slot.index()].is_none()
    }

    fn active_buffer(&mut self) -> &mut LogBuffer {
        let capacity = self.capacity;
        self.slots[self.active.index()].get_or_insert_with(|| LogBuffer::with_capacity(capacity))
    }

    /// Stage one sample and hand off the active buffer when a threshold is hit.
    pub fn offer(&mut self, header: &SampleHeader, delta: &[u8]) -> Result<Option<LogFlush>> {
        let now = header.timestamp;
        let window_start = *self.window_start.get_or_insert(now);
        let capacity = self.capacity;

        let (samples, len) = {
            let buffer = self.active_buffer();
            if !delta.is_empty() {
                let needed = SampleHeader::ENCODED_LEN + delta.len();
                let available = capacity - buffer.len();
                if needed > available {
                    return Err(RecorderError::capacity_exceeded("log", needed, available));
                }
                buffer.push(header, delta);
            }
            (buffer.sample_count(), buffer.len())
        };

        if samples == 0 {
            return Ok(None);
        }

        let residual = capacity - len;
        let full = samples >= self.max_samples || residual < self.worst_case_sample;
        let timed_out = now.has_elapsed(&window_start, self.max_wait_ms);
        trace!(samples, residual, "Staged log sample");

        if full || timed_out {
            debug!(slot = ?self.active, samples, full, timed_out, "Swapping log buffer");
            self.window_start = Some(now);
            return Ok(self.swap());
        }
        Ok(None)
    }

    /// Hand off the active buffer and activate the other slot.
    ///
    /// Returns `None` when the active buffer holds nothing.
    pub fn swap(&mut self) -> Option<LogFlush> {
        let slot = self.active;
        if self.slots[slot.index()].as_ref().is_none_or(LogBuffer::is_empty) {
            self.active_buffer();
            return None;
        }
        let buffer = self.slots[slot.index()].take()?;

        self.active = slot.other();
        if self.slots[self.active.index()].is_none() {
            self.stats.record_buffer_reallocated();
            debug!(slot = ?self.active, "Previous flush still in flight, allocating new buffer");
        }
        self.active_buffer();
        Some(LogFlush { slot, buffer })
    }

    /// Return a drained buffer to its slot.
    pub fn reclaim(&mut self, flush: LogFlush) {
        let LogFlush { slot, mut buffer } = flush;
        buffer.clear();
        let entry = &mut self.slots[slot.index()];
        if entry.is_none() {
            *entry = Some(buffer);
        }
    }
}
