//! Test utilities shared by unit tests, integration tests and benchmarks
//!
//! Provides a manually driven clock, recording network/export doubles, signal
//! fixtures and a small valid configuration.

#![cfg(any(test, feature = "benchmark"))]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::clock::Clock;
use crate::config::RecorderConfig;
use crate::log::ExportTransport;
use crate::stream::NetworkSender;
use crate::types::{SignalDescriptor, SignalRegistry, SignalSource, SignalValue};
use crate::{RecorderError, Result, Timestamp};

/// Clock whose time only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    millis: AtomicU64,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Arc<Self> {
        Arc::new(Self { millis: AtomicU64::new(start.as_millis()) })
    }

    pub fn set(&self, time: Timestamp) {
        self.millis.store(time.as_millis(), Ordering::SeqCst);
    }

    pub fn advance(&self, ms: u64) {
        self.millis.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_millis(self.millis.load(Ordering::SeqCst))
    }
}

/// Network sender that keeps every record it was given.
#[derive(Debug, Default)]
pub struct RecordingSender {
    sent: Mutex<Vec<(u16, Vec<u8>)>>,
    failing: AtomicBool,
}

impl RecordingSender {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make every following send fail.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<(u16, Vec<u8>)> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl NetworkSender for RecordingSender {
    async fn send(&self, message_id: u16, bytes: Vec<u8>) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(RecorderError::network_failed("link down"));
        }
        if let Ok(mut sent) = self.sent.lock() {
            sent.push((message_id, bytes));
        }
        Ok(())
    }
}

/// Export transport that records delivered paths.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    delivered: Mutex<Vec<PathBuf>>,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn delivered(&self) -> Vec<PathBuf> {
        self.delivered.lock().map(|d| d.clone()).unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl ExportTransport for RecordingTransport {
    async fn deliver(&self, path: PathBuf) -> Result<()> {
        if let Ok(mut delivered) = self.delivered.lock() {
            delivered.push(path);
        }
        Ok(())
    }
}

/// Registry with `LineVoltage` (u16, 750) and `DoorsClosed` (u8, 1).
///
/// Returns the registry and both sources so tests can change the values.
pub fn line_voltage_and_doors() -> (SignalRegistry, SignalSource, SignalSource) {
    let voltage = SignalSource::from_value(SignalValue::U16(750));
    let doors = SignalSource::from_value(SignalValue::U8(1));
    let mut registry = SignalRegistry::new();
    registry.register("LineVoltage", voltage.clone());
    registry.register("DoorsClosed", doors.clone());
    (registry, voltage, doors)
}

/// `count` u32 descriptors with ids `0..count`, each on its own source.
pub fn u32_signals(count: u16) -> (Vec<SignalDescriptor>, Vec<SignalSource>) {
    let sources: Vec<_> =
        (0..count).map(|i| SignalSource::from_value(SignalValue::U32(u32::from(i)))).collect();
    let descriptors = sources
        .iter()
        .enumerate()
        .map(|(i, source)| SignalDescriptor::new(i as u16, format!("Signal{}", i), source.clone()))
        .collect();
    (descriptors, sources)
}

/// Smallest useful configuration, logging under `directory`.
///
/// Signals match [`line_voltage_and_doors`].
pub fn minimal_config(directory: impl AsRef<Path>) -> RecorderConfig {
    let yaml = format!(
        r#"
identity:
  consist_id: "CONSIST0042"
  car_id: "CAR3"
  device_id: "DRU1"
  recorder_id: 1
  recorder_version: 3
log:
  directory: '{}'
signals:
  - {{ name: LineVoltage, id: 1, type: u16 }}
  - {{ name: DoorsClosed, id: 2, type: u8 }}
"#,
        directory.as_ref().display()
    );
    RecorderConfig::from_yaml_str(&yaml).expect("minimal config is valid")
}
