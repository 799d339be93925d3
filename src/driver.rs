//! Driver spawns and manages the recorder's tasks
//!
//! Two tasks run per recorder:
//!
//! - the **sampling task**, ticking on a fixed interval, runs
//!   [`Pipeline::cycle`] and dispatches its output without ever waiting on
//!   disk or network: stream records and full log buffers are both handed on
//!   with `try_send` and dropped when their queue is full
//! - the **stream sender** passes queued records to the [`NetworkSender`] one
//!   at a time
//! - the **writer**, on a blocking thread, owns the [`FileRotationStore`],
//!   persists each buffer, runs ring exports and returns drained buffers

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::clock::Clock;
use crate::config::RecorderConfig;
use crate::log::{ExportTransport, FileRotationStore, LogFlush};
use crate::pipeline::Pipeline;
use crate::stats::{PipelineStats, StatsSnapshot};
use crate::stream::NetworkSender;
use crate::{RecorderError, Result};

/// External collaborators of a running recorder.
#[derive(Clone)]
pub struct Services {
    pub clock: Arc<dyn Clock>,
    pub sender: Arc<dyn NetworkSender>,
    pub transport: Arc<dyn ExportTransport>,
}

/// Timing and queue settings taken from the configuration.
#[derive(Debug, Clone, Copy)]
pub struct DriverSettings {
    pub cycle: Duration,
    pub message_id: u16,
    pub stream_queue: usize,
    pub writer_queue: usize,
}

impl DriverSettings {
    pub fn from_config(config: &RecorderConfig) -> Self {
        Self {
            cycle: Duration::from_millis(config.sampling.cycle_ms),
            message_id: config.stream.message_id,
            stream_queue: config.stream.queue,
            writer_queue: config.log.writer_queue,
        }
    }
}

/// Result of spawning driver tasks
pub struct DriverChannels {
    /// Latest counter values, republished after every cycle that changed them
    pub stats: watch::Receiver<StatsSnapshot>,
    /// Cancellation token for graceful shutdown
    pub cancel: CancellationToken,
    pub sampling: JoinHandle<Result<()>>,
    pub stream: JoinHandle<()>,
    pub writer: JoinHandle<()>,
}

pub struct Driver;

impl Driver {
    /// Spawn the sampling task, the stream sender and the writer.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn(
        pipeline: Pipeline,
        store: FileRotationStore,
        settings: DriverSettings,
        services: Services,
    ) -> DriverChannels {
        let stats = pipeline.stats().clone();
        let (stats_tx, stats_rx) = watch::channel(stats.snapshot());
        let (stream_tx, stream_rx) = mpsc::channel(settings.stream_queue.max(1));
        let (log_tx, log_rx) = mpsc::channel(settings.writer_queue.max(1));
        let (recycle_tx, recycle_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let handle = Handle::current();
        let writer_stats = stats.clone();
        let transport = services.transport.clone();
        let writer = tokio::task::spawn_blocking(move || {
            Self::writer_loop(store, log_rx, recycle_tx, transport, writer_stats, handle);
        });

        let stream = tokio::spawn(Self::stream_loop(
            stream_rx,
            services.sender.clone(),
            settings.message_id,
            stats,
            cancel.clone(),
        ));

        let cancel_sampling = cancel.clone();
        let sampling = tokio::spawn(async move {
            let task = SamplingTask {
                pipeline,
                settings,
                services,
                stream_tx,
                log_tx,
                recycle_rx,
                stats_tx,
            };
            task.run(cancel_sampling).await
        });

        DriverChannels { stats: stats_rx, cancel, sampling, stream, writer }
    }

    /// Deliver an export on its own task so the caller never waits on the link.
    pub fn deliver_export(
        handle: &Handle,
        transport: Arc<dyn ExportTransport>,
        path: PathBuf,
        stats: Arc<PipelineStats>,
    ) {
        handle.spawn(async move {
            match transport.deliver(path.clone()).await {
                Ok(()) => info!(path = %path.display(), "Export delivered"),
                Err(e) => {
                    stats.record_export_failure();
                    warn!(path = %path.display(), error = %e, "Export delivery failed");
                }
            }
        });
    }

    /// Stream loop - sends queued records until the sampling task hangs up.
    ///
    /// A send still pending at cancellation is abandoned.
    async fn stream_loop(
        mut stream_rx: mpsc::Receiver<Vec<u8>>,
        sender: Arc<dyn NetworkSender>,
        message_id: u16,
        stats: Arc<PipelineStats>,
        cancel: CancellationToken,
    ) {
        debug!("Stream sender started");
        while let Some(record) = stream_rx.recv().await {
            let bytes = record.len();
            tokio::select! {
                biased;
                result = sender.send(message_id, record) => {
                    if let Err(e) = result {
                        stats.record_send_failure();
                        warn!(error = %e, bytes, "Stream send failed, record dropped");
                    }
                }
                _ = cancel.cancelled() => {
                    debug!(bytes, "Stream send abandoned on shutdown");
                    break;
                }
            }
        }
        debug!("Stream sender stopped");
    }

    /// Writer loop - persists flushed buffers until the sampling task hangs up
    fn writer_loop(
        mut store: FileRotationStore,
        mut log_rx: mpsc::Receiver<LogFlush>,
        recycle_tx: mpsc::UnboundedSender<LogFlush>,
        transport: Arc<dyn ExportTransport>,
        stats: Arc<PipelineStats>,
        handle: Handle,
    ) {
        info!(directory = %store.directory().display(), "Log writer started");
        let mut written = 0u64;

        while let Some(flush) = log_rx.blocking_recv() {
            let buffer = &flush.buffer;
            if let Some(first) = buffer.first_timestamp() {
                match store.write_record(first, buffer.sample_count(), buffer.bytes()) {
                    Ok(outcome) => {
                        written += 1;
                        trace!(index = outcome.index, slot = ?flush.slot, "Log buffer persisted");
                        if let Some(path) = outcome.export {
                            Self::deliver_export(&handle, transport.clone(), path, stats.clone());
                        }
                    }
                    Err(e) => {
                        // the record is lost; the next buffer tries again
                        stats.record_write_failure();
                        warn!(error = %e, samples = buffer.sample_count(), "Log write failed");
                    }
                }
            }

            if recycle_tx.send(flush).is_err() {
                debug!("Sampling task gone, dropping drained buffer");
            }
        }

        info!(records = written, "Log writer stopped");
    }
}

/// State owned by the periodic sampling task.
struct SamplingTask {
    pipeline: Pipeline,
    settings: DriverSettings,
    services: Services,
    stream_tx: mpsc::Sender<Vec<u8>>,
    log_tx: mpsc::Sender<LogFlush>,
    recycle_rx: mpsc::UnboundedReceiver<LogFlush>,
    stats_tx: watch::Sender<StatsSnapshot>,
}

impl SamplingTask {
    async fn run(mut self, cancel: CancellationToken) -> Result<()> {
        info!(cycle_ms = self.settings.cycle.as_millis() as u64, "Sampling task started");
        let mut ticker = interval(self.settings.cycle);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Sampling task cancelled");
                    break;
                }
                _ = ticker.tick() => {}
            }

            while let Ok(flush) = self.recycle_rx.try_recv() {
                self.pipeline.reclaim(flush);
            }

            let now = self.services.clock.now();
            let output = match self.pipeline.cycle(now) {
                Ok(output) => output,
                Err(e) => {
                    error!(error = %e, "Sampling cycle failed, stopping recorder");
                    cancel.cancel();
                    self.publish_stats();
                    return Err(e);
                }
            };

            if let Some(record) = output.stream {
                self.send_stream(record);
            }
            if let Some(flush) = output.log {
                self.hand_off(flush);
            }
            self.publish_stats();
        }

        // a clean stop keeps the partially filled buffer
        if let Some(flush) = self.pipeline.drain() {
            debug!(samples = flush.buffer.sample_count(), "Handing off final log buffer");
            if self.log_tx.send(flush).await.is_err() {
                self.pipeline.stats().record_log_flush_dropped();
                warn!("Log writer gone, final buffer lost");
            }
        }
        self.publish_stats();
        info!("Sampling task ended");
        Ok(())
    }

    /// Queue a record for the stream sender without waiting.
    fn send_stream(&self, record: Vec<u8>) {
        match self.stream_tx.try_send(record) {
            Ok(()) => {}
            Err(TrySendError::Full(record)) => {
                self.pipeline.stats().record_stream_dropped();
                warn!(bytes = record.len(), "Stream queue full, record dropped");
            }
            Err(TrySendError::Closed(record)) => {
                self.pipeline.stats().record_stream_dropped();
                error!(bytes = record.len(), "Stream sender stopped, record dropped");
            }
        }
    }

    /// Pass a full buffer to the writer without waiting.
    fn hand_off(&mut self, flush: LogFlush) {
        match self.log_tx.try_send(flush) {
            Ok(()) => {}
            Err(TrySendError::Full(flush)) => {
                self.pipeline.stats().record_log_flush_dropped();
                let samples = flush.buffer.sample_count();
                warn!(samples, "Writer queue full, log buffer dropped");
                self.pipeline.reclaim(flush);
            }
            Err(TrySendError::Closed(flush)) => {
                self.pipeline.stats().record_log_flush_dropped();
                error!("Log writer stopped, log buffer dropped");
                self.pipeline.reclaim(flush);
            }
        }
    }

    fn publish_stats(&self) {
        let snapshot = self.pipeline.stats().snapshot();
        self.stats_tx.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
    }
}

/// Map a failed task join onto the recorder's error type.
pub(crate) fn join_error(e: tokio::task::JoinError) -> RecorderError {
    if e.is_panic() {
        error!(error = %e, "Recorder task panicked");
    }
    RecorderError::Shutdown
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Timestamp;
    use crate::format::{RecordWalker, StreamHeader};
    use crate::test_utils::{
        ManualClock, RecordingSender, RecordingTransport, line_voltage_and_doors, minimal_config,
    };
    use crate::types::SignalValue;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Link whose sends never complete.
    #[derive(Debug, Default)]
    struct StalledLink {
        started: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl NetworkSender for StalledLink {
        async fn send(&self, _message_id: u16, _bytes: Vec<u8>) -> Result<()> {
            self.started.fetch_add(1, Ordering::SeqCst);
            std::future::pending::<Result<()>>().await
        }
    }

    fn services(
        clock: Arc<ManualClock>,
        sender: Arc<RecordingSender>,
        transport: Arc<RecordingTransport>,
    ) -> Services {
        Services { clock, sender, transport }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn streams_and_logs_until_cancelled() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut config = minimal_config(dir.path());
        config.sampling.cycle_ms = 5;
        config.stream.max_wait_ms = 0;
        config.log.max_samples = 2;
        config.log.writer_queue = 16;

        let (registry, voltage, _doors) = line_voltage_and_doors();
        let stats = Arc::new(PipelineStats::new());
        let pipeline =
            Pipeline::from_registry(&config, &registry, stats.clone()).expect("pipeline");
        let mut store = FileRotationStore::open(&config, stats.clone()).expect("store");
        store.recover(Timestamp::new(1_700_000_000, 0)).expect("recover");

        let clock = ManualClock::new(Timestamp::new(1_700_000_000, 0));
        let sender = RecordingSender::new();
        let transport = RecordingTransport::new();
        let channels = Driver::spawn(
            pipeline,
            store,
            DriverSettings::from_config(&config),
            services(clock.clone(), sender.clone(), transport),
        );

        let mut updates = channels.stats.clone();
        for value in 0..6u16 {
            voltage.store(SignalValue::U16(value)).expect("store");
            clock.advance(100);
            updates.changed().await.expect("stats published");
        }
        tokio::time::sleep(Duration::from_millis(50)).await;

        channels.cancel.cancel();
        channels.sampling.await.expect("join").expect("clean stop");
        channels.stream.await.expect("join stream");
        channels.writer.await.expect("join writer");

        let sent = sender.sent();
        assert!(!sent.is_empty());
        assert!(sent.iter().all(|(id, _)| *id == config.stream.message_id));
        assert!(StreamHeader::parse(&sent[0].1).is_ok());

        let data = std::fs::read(dir.path().join("0.rec")).expect("log file");
        let samples: u32 = RecordWalker::new(&data)
            .map(|r| r.map(|r| u32::from(r.header.sample_count)))
            .sum::<Result<u32>>()
            .expect("walk");
        assert_eq!(u64::from(samples), stats.snapshot().samples_staged);
        assert_eq!(stats.snapshot().log_write_failures, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn send_failures_are_counted_not_fatal() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut config = minimal_config(dir.path());
        config.sampling.cycle_ms = 5;
        config.stream.max_wait_ms = 0;

        let (registry, _voltage, _doors) = line_voltage_and_doors();
        let stats = Arc::new(PipelineStats::new());
        let pipeline =
            Pipeline::from_registry(&config, &registry, stats.clone()).expect("pipeline");
        let store = FileRotationStore::open(&config, stats.clone()).expect("store");

        let clock = ManualClock::new(Timestamp::new(1_700_000_000, 0));
        let sender = RecordingSender::new();
        sender.set_failing(true);
        let channels = Driver::spawn(
            pipeline,
            store,
            DriverSettings::from_config(&config),
            services(clock, sender.clone(), RecordingTransport::new()),
        );

        let mut updates = channels.stats.clone();
        while updates.borrow_and_update().stream_send_failures == 0 {
            updates.changed().await.expect("stats published");
        }

        channels.cancel.cancel();
        channels.sampling.await.expect("join").expect("clean stop");
        channels.stream.await.expect("join stream");
        assert!(sender.sent().is_empty());
        assert!(stats.snapshot().stream_send_failures >= 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn stalled_link_keeps_a_bounded_backlog() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut config = minimal_config(dir.path());
        config.sampling.cycle_ms = 1;
        config.stream.max_wait_ms = 0;
        config.stream.queue = 2;

        let (registry, voltage, _doors) = line_voltage_and_doors();
        let stats = Arc::new(PipelineStats::new());
        let pipeline =
            Pipeline::from_registry(&config, &registry, stats.clone()).expect("pipeline");
        let store = FileRotationStore::open(&config, stats.clone()).expect("store");

        let clock = ManualClock::new(Timestamp::new(1_700_000_000, 0));
        let link = Arc::new(StalledLink::default());
        let channels = Driver::spawn(
            pipeline,
            store,
            DriverSettings::from_config(&config),
            Services {
                clock: clock.clone(),
                sender: link.clone(),
                transport: RecordingTransport::new(),
            },
        );

        let mut updates = channels.stats.clone();
        for value in 0..40u16 {
            voltage.store(SignalValue::U16(value)).expect("store");
            clock.advance(10);
            updates.changed().await.expect("stats published");
            updates.changed().await.expect("stats published");
        }

        let snapshot = stats.snapshot();
        assert!(snapshot.stream_flushes >= 40);
        // one record in the stuck send plus a full queue
        let accepted = snapshot.stream_flushes - snapshot.stream_records_dropped;
        assert!(accepted <= 3, "{} records accepted", accepted);
        assert_eq!(link.started.load(Ordering::SeqCst), 1);

        channels.cancel.cancel();
        channels.sampling.await.expect("join").expect("clean stop");
        tokio::time::timeout(Duration::from_secs(5), channels.stream)
            .await
            .expect("stream sender stops on cancel")
            .expect("join stream");
        channels.writer.await.expect("join writer");
    }
}
