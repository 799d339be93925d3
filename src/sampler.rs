//! Signal snapshot and delta computation
//!
//! Each cycle the sampler serializes every configured signal as
//! `id(2) · value(native width)` in network byte order into the *current*
//! snapshot, compares it with the *previous* one signal by signal, and emits
//! only the pairs whose bytes changed. A full snapshot is emitted instead on
//! the first cycle, when compression is disabled, when the refresh cadence is
//! due, or when any single signal has gone unreported past the staleness limit.
//!
//! The delta is returned as a borrow of the sampler, so it cannot outlive the
//! cycle that produced it: consumers copy what they need before the next call.

use tracing::trace;

use crate::config::SamplingConfig;
use crate::types::{SampleHeader, SignalDescriptor};
use crate::{Result, RecorderError, Timestamp};

/// Why a cycle reported every signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FullReason {
    FirstCycle,
    CompressionDisabled,
    RefreshDue,
    StaleSignal(u16),
}

/// Output of one sampling cycle, valid until the next call.
#[derive(Debug)]
pub struct SampleFrame<'a> {
    pub header: SampleHeader,
    pub delta: &'a [u8],
    pub full: Option<FullReason>,
}

impl SampleFrame<'_> {
    /// Whether anything was recorded this cycle.
    pub fn is_empty(&self) -> bool {
        self.delta.is_empty()
    }

    /// Bytes this sample occupies in a staging buffer.
    pub fn encoded_len(&self) -> usize {
        SampleHeader::ENCODED_LEN + self.delta.len()
    }

    /// Append header and delta to a buffer.
    pub fn write_to(&self, out: &mut Vec<u8>) {
        self.header.write_to(out);
        out.extend_from_slice(self.delta);
    }
}

/// Per-cycle sampler owning the snapshot pair and the delta buffer.
pub struct SignalSampler {
    descriptors: Vec<SignalDescriptor>,
    /// (offset, length) of each signal within a snapshot
    layout: Vec<(usize, usize)>,
    current: Vec<u8>,
    previous: Vec<u8>,
    delta: Vec<u8>,
    has_previous: bool,
    compression: bool,
    staleness_ms: Option<u64>,
    full_refresh_ms: Option<u64>,
    last_full: Option<Timestamp>,
}

impl SignalSampler {
    pub fn new(descriptors: Vec<SignalDescriptor>, config: &SamplingConfig) -> Result<Self> {
        if descriptors.is_empty() {
            return Err(RecorderError::config("signals", "no signals to sample"));
        }

        let mut layout = Vec::with_capacity(descriptors.len());
        let mut offset = 0;
        for descriptor in &descriptors {
            layout.push((offset, descriptor.encoded_len()));
            offset += descriptor.encoded_len();
        }

        Ok(Self {
            descriptors,
            layout,
            current: Vec::with_capacity(offset),
            previous: Vec::with_capacity(offset),
            delta: Vec::with_capacity(offset),
            has_previous: false,
            compression: config.compression,
            staleness_ms: config.signal_staleness_ms,
            full_refresh_ms: config.full_refresh_ms,
            last_full: None,
        })
    }

    pub fn descriptors(&self) -> &[SignalDescriptor] {
        &self.descriptors
    }

    /// Bytes of a full snapshot.
    pub fn full_snapshot_len(&self) -> usize {
        self.layout.last().map_or(0, |(offset, len)| offset + len)
    }

    /// Bytes of the largest sample this sampler can produce.
    pub fn worst_case_sample_len(&self) -> usize {
        SampleHeader::ENCODED_LEN + self.full_snapshot_len()
    }

    /// Decide whether this cycle must report every signal.
    pub fn full_reason(&self, now: Timestamp) -> Option<FullReason> {
        if !self.has_previous {
            return Some(FullReason::FirstCycle);
        }
        if !self.compression {
            return Some(FullReason::CompressionDisabled);
        }
        if let (Some(limit), Some(last)) = (self.full_refresh_ms, self.last_full) {
            if now.has_elapsed(&last, limit) {
                return Some(FullReason::RefreshDue);
            }
        }
        if let Some(limit) = self.staleness_ms {
            let stale = self.descriptors.iter().find(|d| match d.last_change {
                Some(last) => now.has_elapsed(&last, limit),
                None => true,
            });
            if let Some(descriptor) = stale {
                return Some(FullReason::StaleSignal(descriptor.id));
            }
        }
        None
    }

    /// Sample all signals and compute this cycle's delta.
    pub fn sample(&mut self, now: Timestamp) -> SampleFrame<'_> {
        let reason = self.full_reason(now);
        self.sample_and_diff(now, reason)
    }

    /// Sample all signals, reporting every one when `force_full` is set.
    pub fn sample_and_diff(
        &mut self,
        now: Timestamp,
        force_full: Option<FullReason>,
    ) -> SampleFrame<'_> {
        self.current.clear();
        for descriptor in &self.descriptors {
            descriptor.write_snapshot(&mut self.current);
        }

        self.delta.clear();
        let force_full = if self.has_previous { force_full } else { Some(FullReason::FirstCycle) };

        let changed = match force_full {
            Some(reason) => {
                self.delta.extend_from_slice(&self.current);
                for descriptor in &mut self.descriptors {
                    descriptor.last_change = Some(now);
                }
                self.last_full = Some(now);
                trace!(?reason, signals = self.descriptors.len(), "Full snapshot");
                self.descriptors.len()
            }
            None => {
                let mut changed = 0;
                for (descriptor, &(offset, len)) in self.descriptors.iter_mut().zip(&self.layout) {
                    let new = &self.current[offset..offset + len];
                    if new != &self.previous[offset..offset + len] {
                        self.delta.extend_from_slice(new);
                        descriptor.last_change = Some(now);
                        changed += 1;
                    }
                }
                changed
            }
        };

        std::mem::swap(&mut self.current, &mut self.previous);
        self.has_previous = true;

        SampleFrame {
            header: SampleHeader::new(now, changed as u16),
            delta: &self.delta,
            full: force_full,
        }
    }
}
