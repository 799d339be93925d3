//! Running recorder handle

use futures::Stream;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::Result;
use crate::config::RecorderConfig;
use crate::driver::{Driver, DriverSettings, Services, join_error};
use crate::log::{FileRotationStore, RecoveryReport};
use crate::pipeline::Pipeline;
use crate::stats::{PipelineStats, StatsSnapshot};
use crate::types::SignalRegistry;

/// A started recorder.
///
/// Sampling, streaming and logging run on background tasks until
/// [`Recorder::shutdown`] is awaited or the handle is dropped.
pub struct Recorder {
    counters: Arc<PipelineStats>,
    stats: watch::Receiver<StatsSnapshot>,
    recovery: RecoveryReport,
    cancel: CancellationToken,
    sampling: Option<JoinHandle<Result<()>>>,
    stream: Option<JoinHandle<()>>,
    writer: Option<JoinHandle<()>>,
}

impl Recorder {
    /// Validate `config`, bind its signals, recover the log ring and start
    /// sampling.
    ///
    /// Every ring slot is verified before the first cycle runs. Configuration
    /// and binding errors are returned before anything touches the disk.
    pub async fn start(
        config: RecorderConfig,
        registry: &SignalRegistry,
        services: Services,
    ) -> Result<Self> {
        config.validate()?;
        info!(
            consist = %config.identity.consist_id,
            car = %config.identity.car_id,
            signals = config.signals.len(),
            "Starting recorder"
        );

        let stats = Arc::new(PipelineStats::new());
        let pipeline = Pipeline::from_registry(&config, registry, stats.clone())?;
        let mut store = FileRotationStore::open(&config, stats.clone())?;

        let now = services.clock.now();
        let (store, recovery) = tokio::task::spawn_blocking(move || {
            let report = store.recover(now);
            report.map(|report| (store, report))
        })
        .await
        .map_err(join_error)??;

        if let Some(path) = recovery.export.clone() {
            let transport = services.transport.clone();
            Driver::deliver_export(&Handle::current(), transport, path, stats.clone());
        }

        let channels =
            Driver::spawn(pipeline, store, DriverSettings::from_config(&config), services);

        Ok(Self {
            counters: stats,
            stats: channels.stats,
            recovery,
            cancel: channels.cancel,
            sampling: Some(channels.sampling),
            stream: Some(channels.stream),
            writer: Some(channels.writer),
        })
    }

    /// Latest published counters.
    pub fn stats(&self) -> StatsSnapshot {
        *self.stats.borrow()
    }

    /// Counters as a stream, starting with the current values.
    pub fn stats_updates(&self) -> impl Stream<Item = StatsSnapshot> + 'static {
        WatchStream::new(self.stats.clone())
    }

    /// What the startup integrity pass found.
    pub fn recovery(&self) -> &RecoveryReport {
        &self.recovery
    }

    /// Whether the sampling task has stopped, on its own or by cancellation.
    pub fn is_finished(&self) -> bool {
        self.sampling.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Stop sampling, flush the partial log buffer and wait for the writer.
    ///
    /// Returns the final counters, or the error that stopped sampling early.
    pub async fn shutdown(mut self) -> Result<StatsSnapshot> {
        info!("Shutting down recorder");
        self.cancel.cancel();

        let sampled = match self.sampling.take() {
            Some(task) => task.await.map_err(join_error)?,
            None => Ok(()),
        };
        if let Some(stream) = self.stream.take() {
            stream.await.map_err(join_error)?;
        }
        if let Some(writer) = self.writer.take() {
            writer.await.map_err(join_error)?;
        }

        let snapshot = self.counters.snapshot();
        info!(cycles = snapshot.cycles, records = snapshot.log_flushes, "Recorder stopped");
        sampled.map(|()| snapshot)
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        debug!("Dropping recorder");
        self.cancel.cancel();
    }
}
