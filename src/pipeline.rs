//! Per-cycle pipeline context
//!
//! [`Pipeline`] owns everything the periodic path touches: the sampler, the
//! stream staging buffer and the ping/pong log buffers. [`Pipeline::cycle`] is
//! synchronous and never performs I/O; whatever must leave the recorder is
//! returned in a [`CycleOutput`] for the caller to dispatch.

use std::sync::Arc;
use tracing::trace;

use crate::config::RecorderConfig;
use crate::format::BinaryFramer;
use crate::log::{DualBufferLog, LogFlush};
use crate::sampler::SignalSampler;
use crate::stats::PipelineStats;
use crate::stream::{StreamAction, StreamAssembler};
use crate::types::{SignalDescriptor, SignalRegistry, bind_signals};
use crate::{Result, Timestamp};

/// Work produced by one cycle.
#[derive(Debug, Default)]
pub struct CycleOutput {
    /// Framed record for the network sender
    pub stream: Option<Vec<u8>>,
    /// Full log buffer for the writer
    pub log: Option<LogFlush>,
    /// Signals reported this cycle
    pub changed: u16,
}

pub struct Pipeline {
    sampler: SignalSampler,
    stream: Option<StreamAssembler>,
    log: DualBufferLog,
    stats: Arc<PipelineStats>,
}

impl Pipeline {
    /// Bind configured signals against `registry` and build the pipeline.
    pub fn from_registry(
        config: &RecorderConfig,
        registry: &SignalRegistry,
        stats: Arc<PipelineStats>,
    ) -> Result<Self> {
        let descriptors = bind_signals(&config.signals, registry)?;
        Self::new(config, descriptors, stats)
    }

    pub fn new(
        config: &RecorderConfig,
        descriptors: Vec<SignalDescriptor>,
        stats: Arc<PipelineStats>,
    ) -> Result<Self> {
        let sampler = SignalSampler::new(descriptors, &config.sampling)?;
        let worst_case = sampler.worst_case_sample_len();

        let stream = config.stream.enabled.then(|| {
            StreamAssembler::new(BinaryFramer::new(&config.identity), &config.stream, worst_case)
        });
        let log = DualBufferLog::new(&config.log, worst_case, stats.clone());

        Ok(Self { sampler, stream, log, stats })
    }

    pub fn stats(&self) -> &Arc<PipelineStats> {
        &self.stats
    }

    pub fn sampler(&self) -> &SignalSampler {
        &self.sampler
    }

    pub fn log(&self) -> &DualBufferLog {
        &self.log
    }

    /// Sample once and feed both consumers.
    ///
    /// The delta is copied into both staging buffers before this returns, so
    /// the next cycle is free to overwrite it.
    pub fn cycle(&mut self, now: Timestamp) -> Result<CycleOutput> {
        self.stats.record_cycle();
        let frame = self.sampler.sample(now);
        let changed = frame.header.changed_count;
        if !frame.is_empty() {
            self.stats.record_sample_staged();
        }
        trace!(changed, bytes = frame.delta.len(), full = ?frame.full, "Sampled");

        let mut output = CycleOutput { changed, ..CycleOutput::default() };

        if let Some(stream) = self.stream.as_mut() {
            if let StreamAction::Flush(record) = stream.offer(&frame.header, frame.delta)? {
                self.stats.record_stream_flush();
                output.stream = Some(record);
            }
        }

        output.log = self.log.offer(&frame.header, frame.delta)?;
        if output.log.is_some() {
            self.stats.record_log_flush();
        }

        Ok(output)
    }

    /// Hand off whatever the active log buffer holds, for a clean stop.
    pub fn drain(&mut self) -> Option<LogFlush> {
        let flush = self.log.swap();
        if flush.is_some() {
            self.stats.record_log_flush();
        }
        flush
    }

    /// Take back a buffer the writer has finished with.
    pub fn reclaim(&mut self, flush: LogFlush) {
        self.log.reclaim(flush);
    }
}
