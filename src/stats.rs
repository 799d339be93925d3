//! Pipeline counters
//!
//! Data dropped on a full writer queue, a failed send or a failed write is an
//! accepted outcome, not an error the pipeline retries. These counters make
//! each such drop observable.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Shared, lock-free counters updated by the periodic task and the writer.
#[derive(Debug, Default)]
pub struct PipelineStats {
    cycles: AtomicU64,
    samples_staged: AtomicU64,
    stream_flushes: AtomicU64,
    stream_send_failures: AtomicU64,
    stream_records_dropped: AtomicU64,
    log_flushes: AtomicU64,
    log_flushes_dropped: AtomicU64,
    log_write_failures: AtomicU64,
    buffers_reallocated: AtomicU64,
    exports: AtomicU64,
    export_failures: AtomicU64,
    records_repaired: AtomicU64,
    files_discarded: AtomicU64,
}

/// Point-in-time copy of [`PipelineStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub cycles: u64,
    pub samples_staged: u64,
    pub stream_flushes: u64,
    pub stream_send_failures: u64,
    pub stream_records_dropped: u64,
    pub log_flushes: u64,
    pub log_flushes_dropped: u64,
    pub log_write_failures: u64,
    pub buffers_reallocated: u64,
    pub exports: u64,
    pub export_failures: u64,
    pub records_repaired: u64,
    pub files_discarded: u64,
}

macro_rules! counter {
    ($($name:ident => $field:ident),* $(,)?) => {
        impl PipelineStats {
            $(
                pub fn $name(&self) {
                    self.$field.fetch_add(1, Ordering::Relaxed);
                }
            )*

            pub fn snapshot(&self) -> StatsSnapshot {
                StatsSnapshot {
                    $($field: self.$field.load(Ordering::Relaxed),)*
                }
            }
        }
    };
}

counter! {
    record_cycle => cycles,
    record_sample_staged => samples_staged,
    record_stream_flush => stream_flushes,
    record_send_failure => stream_send_failures,
    record_stream_dropped => stream_records_dropped,
    record_log_flush => log_flushes,
    record_log_flush_dropped => log_flushes_dropped,
    record_write_failure => log_write_failures,
    record_buffer_reallocated => buffers_reallocated,
    record_export => exports,
    record_export_failure => export_failures,
    record_repair => records_repaired,
    record_discard => files_discarded,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }
}
