//! Full recorder runs against a temporary log directory

mod common;

use common::{Captured, START, TestClock, config, read_samples, wait_cycles};
use railrec::format::StreamHeader;
use railrec::log::{FileState, IntegrityStatus};
use railrec::types::{SignalRegistry, SignalSource, SignalValue};
use railrec::{Recorder, RecorderError, Services};

fn registry() -> (SignalRegistry, SignalSource, SignalSource) {
    let voltage = SignalSource::from_value(SignalValue::U16(750));
    let doors = SignalSource::from_value(SignalValue::U8(1));
    let mut registry = SignalRegistry::new();
    registry.register("LineVoltage", voltage.clone());
    registry.register("DoorsClosed", doors.clone());
    (registry, voltage, doors)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn every_change_reaches_the_log() {
    let _ = tracing_subscriber::fmt::try_init();
    let dir = tempfile::tempdir().expect("tempdir");
    let config = config(dir.path());
    let (registry, voltage, doors) = registry();
    let clock = TestClock::at(START);
    let link = Captured::new();
    let services = Services { clock: clock.clone(), sender: link.clone(), transport: link.clone() };

    let recorder = Recorder::start(config.clone(), &registry, services).await.expect("start");
    assert_eq!(recorder.recovery().statuses, vec![IntegrityStatus::Absent; 3]);
    assert_eq!(recorder.recovery().state, FileState::CreateNew);

    wait_cycles(&recorder, 2).await;
    for value in 751..=760u16 {
        voltage.store(SignalValue::U16(value)).expect("store voltage");
        if value == 755 {
            doors.store(SignalValue::U8(0)).expect("store doors");
        }
        clock.advance(50);
        wait_cycles(&recorder, 2).await;
    }

    let stats = recorder.shutdown().await.expect("clean shutdown");
    assert_eq!(stats.log_flushes_dropped, 0);
    assert_eq!(stats.log_write_failures, 0);

    let samples = read_samples(&dir.path().join("0.rec"), &config);
    assert_eq!(samples.len() as u64, stats.samples_staged);

    // first sample is the full snapshot
    assert_eq!(samples[0].values, vec![(1, SignalValue::U16(750)), (2, SignalValue::U8(1))]);

    let voltages: Vec<_> = samples
        .iter()
        .flat_map(|s| s.values.iter())
        .filter(|(id, _)| *id == 1)
        .map(|(_, v)| *v)
        .collect();
    let expected: Vec<_> = (750..=760u16).map(SignalValue::U16).collect();
    assert_eq!(voltages, expected);

    assert!(samples.iter().any(|s| s.values.contains(&(2, SignalValue::U8(0)))));

    // timestamps never go backwards
    let times: Vec<_> = samples.iter().map(|s| s.header.timestamp.as_millis()).collect();
    assert!(times.windows(2).all(|w| w[0] <= w[1]));

    let records = link.records();
    assert!(!records.is_empty());
    for record in &records {
        let header = StreamHeader::parse(record).expect("stream header");
        assert_eq!(header.identity.recorder_id, 7);
        assert_eq!(record.len(), header.record_len());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unbound_signal_stops_startup() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = config(dir.path());
    let mut registry = SignalRegistry::new();
    registry.register("LineVoltage", SignalSource::from_value(SignalValue::U16(0)));
    let link = Captured::new();
    let services =
        Services { clock: TestClock::at(START), sender: link.clone(), transport: link.clone() };

    let result = Recorder::start(config, &registry, services).await;
    assert!(matches!(result, Err(RecorderError::SignalBinding { .. })));
    // nothing touched the disk
    assert!(!dir.path().join("0.rec").exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn mistyped_signal_stops_startup() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = config(dir.path());
    let mut registry = SignalRegistry::new();
    registry.register("LineVoltage", SignalSource::from_value(SignalValue::I32(0)));
    registry.register("DoorsClosed", SignalSource::from_value(SignalValue::U8(0)));
    let link = Captured::new();
    let services =
        Services { clock: TestClock::at(START), sender: link.clone(), transport: link.clone() };

    let result = Recorder::start(config, &registry, services).await;
    assert!(matches!(result, Err(RecorderError::SignalBinding { .. })));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stats_stream_reports_progress() {
    use futures::StreamExt;

    let dir = tempfile::tempdir().expect("tempdir");
    let (registry, _voltage, _doors) = registry();
    let link = Captured::new();
    let services =
        Services { clock: TestClock::at(START), sender: link.clone(), transport: link.clone() };

    let recorder = Recorder::start(config(dir.path()), &registry, services).await.expect("start");
    let mut updates = recorder.stats_updates();
    let mut seen = 0;
    while let Some(snapshot) = updates.next().await {
        if snapshot.cycles >= 3 {
            seen = snapshot.cycles;
            break;
        }
    }
    assert!(seen >= 3);
    assert!(!recorder.is_finished());

    let stats = recorder.shutdown().await.expect("shutdown");
    assert!(stats.cycles >= seen);
    assert_eq!(stats.samples_staged, 1);
}
