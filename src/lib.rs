//! Onboard signal recorder for rail vehicles.
//!
//! Railrec samples a fixed set of control-system signals every cycle, keeps
//! only what changed, and feeds the result to two independent consumers:
//!
//! - **Live stream**: framed records sent over the vehicle network
//! - **Durable log**: a ring of files that survives power loss and is exported
//!   as one compiled file every time the ring wraps
//!
//! # Features
//!
//! - **Delta compression**: unchanged signals cost nothing, with periodic full
//!   refreshes and per-signal staleness limits
//! - **Non-blocking cycle**: the sampling task never waits on disk or network
//! - **Crash safety**: every ring slot is verified and repaired at startup
//! - **Deterministic time**: all thresholds run off an injectable [`Clock`]
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use railrec::{NullSender, NullTransport, Recorder, RecorderConfig, Services, SystemClock};
//! use railrec::types::{SignalRegistry, SignalSource, SignalValue};
//!
//! #[tokio::main]
//! async fn main() -> railrec::Result<()> {
//!     let config = RecorderConfig::load("/etc/railrec/recorder.yaml")?;
//!
//!     let voltage = SignalSource::from_value(SignalValue::U16(0));
//!     let mut registry = SignalRegistry::new();
//!     registry.register("LineVoltage", voltage.clone());
//!
//!     let services = Services {
//!         clock: Arc::new(SystemClock::new(config.sampling.clock_synchronized)),
//!         sender: Arc::new(NullSender),
//!         transport: Arc::new(NullTransport),
//!     };
//!     let recorder = Recorder::start(config, &registry, services).await?;
//!
//!     voltage.store(SignalValue::U16(750))?;
//!     tokio::time::sleep(std::time::Duration::from_secs(1)).await;
//!
//!     let stats = recorder.shutdown().await?;
//!     println!("{} cycles, {} log flushes", stats.cycles, stats.log_flushes);
//!     Ok(())
//! }
//! ```

// Core types and error handling
mod error;
#[cfg_attr(any(test, feature = "benchmark"), path = "test_utils.rs")]
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;
pub mod types;

// Wire formats and configuration
pub mod clock;
pub mod config;
pub mod format;

// Pipeline stages
pub mod log;
pub mod pipeline;
pub mod sampler;
pub mod stats;
pub mod stream;

// Task orchestration
pub mod driver;
mod recorder;

// Core exports
pub use error::*;
pub use types::Timestamp;

pub use clock::{Clock, SystemClock};
pub use config::RecorderConfig;
pub use driver::Services;
pub use log::{ExportTransport, NullTransport};
pub use recorder::Recorder;
pub use stats::StatsSnapshot;
pub use stream::{NetworkSender, NullSender};
