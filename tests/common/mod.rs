//! Helpers shared by the integration tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use railrec::format::RecordWalker;
use railrec::types::{DecodedSample, SignalType, decode_samples};
use railrec::{Clock, ExportTransport, NetworkSender, Recorder, RecorderConfig, Timestamp};

pub const START: Timestamp = Timestamp::new(1_700_000_000, 0);

#[derive(Debug)]
pub struct TestClock {
    millis: AtomicU64,
}

impl TestClock {
    pub fn at(start: Timestamp) -> Arc<Self> {
        Arc::new(Self { millis: AtomicU64::new(start.as_millis()) })
    }

    pub fn advance(&self, ms: u64) {
        self.millis.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for TestClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_millis(self.millis.load(Ordering::SeqCst))
    }
}

#[derive(Debug, Default)]
pub struct Captured {
    records: Mutex<Vec<Vec<u8>>>,
    exports: Mutex<Vec<PathBuf>>,
}

impl Captured {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn records(&self) -> Vec<Vec<u8>> {
        self.records.lock().expect("records lock").clone()
    }

    pub fn exports(&self) -> Vec<PathBuf> {
        self.exports.lock().expect("exports lock").clone()
    }
}

#[async_trait::async_trait]
impl NetworkSender for Captured {
    async fn send(&self, _message_id: u16, bytes: Vec<u8>) -> railrec::Result<()> {
        self.records.lock().expect("records lock").push(bytes);
        Ok(())
    }
}

#[async_trait::async_trait]
impl ExportTransport for Captured {
    async fn deliver(&self, path: PathBuf) -> railrec::Result<()> {
        self.exports.lock().expect("exports lock").push(path);
        Ok(())
    }
}

/// Two signals, a 5 ms cycle and small buffers so tests see flushes quickly.
pub fn config(directory: &Path) -> RecorderConfig {
    let yaml = format!(
        r#"
identity:
  consist_id: "CONSIST0042"
  car_id: "CAR3"
  device_id: "DRU1"
  recorder_id: 7
  recorder_version: 2
sampling:
  cycle_ms: 5
stream:
  max_wait_ms: 100
log:
  directory: '{}'
  max_samples: 4
  max_wait_ms: 1000
  ring_size: 3
  writer_queue: 32
signals:
  - {{ name: LineVoltage, id: 1, type: u16 }}
  - {{ name: DoorsClosed, id: 2, type: u8 }}
"#,
        directory.display()
    );
    RecorderConfig::from_yaml_str(&yaml).expect("test config")
}

pub fn signal_types(config: &RecorderConfig) -> HashMap<u16, SignalType> {
    config.signals.iter().map(|s| (s.id, s.signal_type)).collect()
}

/// Every sample stored in a ring file, in order.
pub fn read_samples(path: &Path, config: &RecorderConfig) -> Vec<DecodedSample> {
    let data = std::fs::read(path).expect("read log file");
    let types = signal_types(config);
    RecordWalker::new(&data)
        .flat_map(|record| {
            let record = record.expect("complete record");
            decode_samples(record.payload, record.header.sample_count, &types).expect("decode")
        })
        .collect()
}

/// Wait until the recorder has run `count` more cycles.
pub async fn wait_cycles(recorder: &Recorder, count: u64) {
    let target = recorder.stats().cycles + count;
    tokio::time::timeout(Duration::from_secs(5), async {
        while recorder.stats().cycles < target {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("recorder kept cycling");
}
