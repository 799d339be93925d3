//! Recorder configuration
//!
//! The recorder is configured from a YAML document. Parsing produces a typed
//! [`RecorderConfig`]; [`RecorderConfig::validate`] rejects anything that would
//! let the pipeline start in an unusable state. The original text is kept
//! because every export file embeds it verbatim.
//!
//! ```yaml
//! identity:
//!   consist_id: "CONSIST0042"
//!   car_id: "CAR3"
//!   device_id: "DRU1"
//!   recorder_id: 1
//!   recorder_version: 3
//! sampling:
//!   cycle_ms: 100
//!   compression: true
//!   signal_staleness_ms: 60000
//!   full_refresh_ms: 300000
//! stream:
//!   capacity: 1400
//!   max_wait_ms: 1000
//!   queue: 4
//! log:
//!   directory: /var/lib/railrec
//!   capacity: 16384
//!   max_samples: 600
//!   max_wait_ms: 60000
//!   ring_size: 24
//!   file_span_ms: 3600000
//! signals:
//!   - { name: LineVoltage, id: 1, type: u16 }
//!   - { name: DoorsClosed, id: 2, type: u8 }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::format::codec::IDENTIFIER_LEN;
use crate::format::{MAX_PAYLOAD_LEN, RecorderIdentity};
use crate::types::{SampleHeader, SignalType};
use crate::{RecorderError, Result};

/// Complete recorder configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecorderConfig {
    pub identity: RecorderIdentity,
    #[serde(default)]
    pub sampling: SamplingConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    pub log: LogConfig,
    pub signals: Vec<SignalSpec>,
    #[serde(skip)]
    source_text: String,
}

/// Cycle timing and compression.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SamplingConfig {
    /// Period of the sampling cycle
    #[serde(default = "default_cycle_ms")]
    pub cycle_ms: u64,
    /// Record only changed values; when false every cycle is a full snapshot
    #[serde(default = "default_true")]
    pub compression: bool,
    /// Force a full snapshot once any signal has gone unreported this long
    #[serde(default)]
    pub signal_staleness_ms: Option<u64>,
    /// Force a full snapshot at least this often
    #[serde(default)]
    pub full_refresh_ms: Option<u64>,
    /// Whether the wall clock is synchronized to train time
    #[serde(default)]
    pub clock_synchronized: bool,
}

/// Live network stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StreamConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Payload capacity of the staging buffer in bytes
    #[serde(default = "default_stream_capacity")]
    pub capacity: usize,
    #[serde(default = "default_stream_wait_ms")]
    pub max_wait_ms: u64,
    /// Message identifier passed to the network sender
    #[serde(default = "default_message_id")]
    pub message_id: u16,
    /// Records that may wait for the network sender before new ones are dropped
    #[serde(default = "default_stream_queue")]
    pub queue: usize,
}

/// Durable log ring.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogConfig {
    pub directory: PathBuf,
    /// Where compiled exports are written; defaults to `<directory>/export`
    #[serde(default)]
    pub export_directory: Option<PathBuf>,
    /// Payload capacity of each ping/pong buffer in bytes
    #[serde(default = "default_log_capacity")]
    pub capacity: usize,
    /// Flush after this many samples
    #[serde(default = "default_max_samples")]
    pub max_samples: u16,
    #[serde(default = "default_log_wait_ms")]
    pub max_wait_ms: u64,
    /// Number of files in the ring
    #[serde(default = "default_ring_size")]
    pub ring_size: u16,
    /// Time span covered by one file before rotating to the next
    #[serde(default = "default_file_span_ms")]
    pub file_span_ms: u64,
    /// Flushes that may wait for the writer before new ones are dropped
    #[serde(default = "default_writer_queue")]
    pub writer_queue: usize,
}

/// One recorded signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SignalSpec {
    /// Name of the source in the control-system data model
    pub name: String,
    /// Identifier written to the stream
    pub id: u16,
    #[serde(rename = "type")]
    pub signal_type: SignalType,
}

fn default_true() -> bool {
    true
}
fn default_cycle_ms() -> u64 {
    100
}
fn default_stream_capacity() -> usize {
    1400
}
fn default_stream_wait_ms() -> u64 {
    1000
}
fn default_message_id() -> u16 {
    1
}
fn default_stream_queue() -> usize {
    4
}
fn default_log_capacity() -> usize {
    16 * 1024
}
fn default_max_samples() -> u16 {
    600
}
fn default_log_wait_ms() -> u64 {
    60_000
}
fn default_ring_size() -> u16 {
    24
}
fn default_file_span_ms() -> u64 {
    3_600_000
}
fn default_writer_queue() -> usize {
    4
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            cycle_ms: default_cycle_ms(),
            compression: true,
            signal_staleness_ms: None,
            full_refresh_ms: None,
            clock_synchronized: false,
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: default_stream_capacity(),
            max_wait_ms: default_stream_wait_ms(),
            message_id: default_message_id(),
            queue: default_stream_queue(),
        }
    }
}

impl RecorderConfig {
    /// Build and validate a configuration in code.
    pub fn new(
        identity: RecorderIdentity,
        sampling: SamplingConfig,
        stream: StreamConfig,
        log: LogConfig,
        signals: Vec<SignalSpec>,
    ) -> Result<Self> {
        let config =
            Self { identity, sampling, stream, log, signals, source_text: String::new() };
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a YAML configuration document.
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let mut config: RecorderConfig = serde_yaml_ng::from_str(text)
            .map_err(|e| RecorderError::config("<document>", e.to_string()))?;
        config.source_text = text.to_string();
        config.validate()?;
        debug!(
            signals = config.signals.len(),
            ring_size = config.log.ring_size,
            "Loaded recorder configuration"
        );
        Ok(config)
    }

    /// Read, parse and validate a configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| RecorderError::file_error(path.to_path_buf(), e))?;
        Self::from_yaml_str(&text)
    }

    /// The configuration text this config was parsed from.
    ///
    /// Configs built in code render themselves back to YAML so exports always
    /// carry a readable configuration.
    pub fn source_text(&self) -> String {
        if self.source_text.is_empty() {
            serde_yaml_ng::to_string(self).unwrap_or_default()
        } else {
            self.source_text.clone()
        }
    }

    /// Bytes of a full snapshot: identifier plus value for every signal.
    pub fn full_snapshot_len(&self) -> usize {
        self.signals.iter().map(|s| 2 + s.signal_type.size()).sum()
    }

    /// Bytes of the largest possible sample: header plus full snapshot.
    pub fn worst_case_sample_len(&self) -> usize {
        SampleHeader::ENCODED_LEN + self.full_snapshot_len()
    }

    pub fn export_directory(&self) -> PathBuf {
        self.log.export_directory.clone().unwrap_or_else(|| self.log.directory.join("export"))
    }

    /// Check every parameter the pipeline depends on.
    pub fn validate(&self) -> Result<()> {
        self.validate_identity()?;
        self.validate_signals()?;

        if self.sampling.cycle_ms == 0 {
            return Err(RecorderError::config("sampling.cycle_ms", "must be greater than zero"));
        }

        let worst = self.worst_case_sample_len();
        if self.stream.enabled {
            check_capacity("stream.capacity", self.stream.capacity, worst)?;
            if self.stream.queue == 0 {
                return Err(RecorderError::config("stream.queue", "must be at least 1"));
            }
        }
        check_capacity("log.capacity", self.log.capacity, worst)?;

        if self.log.max_samples == 0 {
            return Err(RecorderError::config("log.max_samples", "must be at least 1"));
        }
        if self.log.ring_size == 0 {
            return Err(RecorderError::config("log.ring_size", "must be at least 1"));
        }
        if self.log.file_span_ms == 0 {
            return Err(RecorderError::config("log.file_span_ms", "must be greater than zero"));
        }
        if self.log.writer_queue == 0 {
            return Err(RecorderError::config("log.writer_queue", "must be at least 1"));
        }

        Ok(())
    }

    fn validate_identity(&self) -> Result<()> {
        let fields = [
            ("identity.consist_id", &self.identity.consist_id),
            ("identity.car_id", &self.identity.car_id),
            ("identity.device_id", &self.identity.device_id),
        ];
        for (field, value) in fields {
            if value.is_empty() || value.len() > IDENTIFIER_LEN || !value.is_ascii() {
                return Err(RecorderError::config(
                    field,
                    format!("must be 1 to {} ASCII characters, got {:?}", IDENTIFIER_LEN, value),
                ));
            }
        }
        Ok(())
    }

    fn validate_signals(&self) -> Result<()> {
        if self.signals.is_empty() {
            return Err(RecorderError::config("signals", "no signals configured"));
        }
        if self.signals.len() > usize::from(u16::MAX) {
            return Err(RecorderError::config("signals", "more signals than a sample can count"));
        }

        let mut ids = HashSet::new();
        let mut names = HashSet::new();
        for signal in &self.signals {
            if !ids.insert(signal.id) {
                return Err(RecorderError::config(
                    "signals",
                    format!("duplicate signal id {}", signal.id),
                ));
            }
            if !names.insert(signal.name.as_str()) {
                return Err(RecorderError::config(
                    "signals",
                    format!("duplicate signal name '{}'", signal.name),
                ));
            }
        }
        Ok(())
    }
}

fn check_capacity(field: &str, capacity: usize, worst: usize) -> Result<()> {
    if capacity < worst {
        return Err(RecorderError::config(
            field,
            format!("{} bytes cannot hold one full sample of {} bytes", capacity, worst),
        ));
    }
    if capacity > MAX_PAYLOAD_LEN {
        return Err(RecorderError::config(
            field,
            format!("{} bytes exceeds the record payload limit of {}", capacity, MAX_PAYLOAD_LEN),
        ));
    }
    Ok(())
}
