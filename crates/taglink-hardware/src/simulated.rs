//! Simulated reader for development and testing.
//!
//! `SimulatedDriver` synthesizes periodic tag batches shaped like LLRP
//! tag reports, so the rest of the pipeline can run without hardware.
//! The first batch is emitted right after connect, then one per interval.

use crate::error::{HardwareError, Result};
use crate::traits::ReaderDriver;
use crate::types::{DriverReport, ReportCallback};
use chrono::Utc;
use std::time::Duration;
use taglink_core::RawReading;
use taglink_core::constants::DEFAULT_SIMULATION_INTERVAL_MS;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

/// Tag codes emitted by the default simulation.
pub const DEFAULT_SIMULATED_TAGS: [&str; 4] = [
    "DEADBEEF12345678",
    "CAFEBABE87654321",
    "A1B2C3D4E5F60708",
    "0123456789ABCDEF",
];

/// Simulation settings.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulatedConfig {
    /// Time between batches.
    pub interval: Duration,

    /// Tag codes included in every batch.
    pub tags: Vec<String>,
}

impl Default for SimulatedConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(DEFAULT_SIMULATION_INTERVAL_MS),
            tags: DEFAULT_SIMULATED_TAGS.iter().map(|t| t.to_string()).collect(),
        }
    }
}

impl SimulatedConfig {
    /// Set the batch interval.
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Replace the simulated tag set.
    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }
}

/// Build batch number `round` for the given tag set.
///
/// Antennas alternate 1/2, RSSI drops 5 dBm per tag starting at -40, the
/// timestamp is epoch seconds and the seen count is `round + 1`.
pub fn simulated_batch(tags: &[String], round: u64) -> Vec<RawReading> {
    let now = Utc::now().timestamp();

    tags.iter()
        .enumerate()
        .map(|(i, code)| {
            RawReading::new()
                .with("EPC-96", code.as_str())
                .with("AntennaID", (i % 2 + 1) as u64)
                .with("PeakRSSI", -40 - 5 * i as i64)
                .with("LastSeenTimestampUTC", now)
                .with("TagSeenCount", round + 1)
        })
        .collect()
}

struct Generator {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Reader that emits synthetic batches on a fixed interval.
///
/// # Examples
///
/// ```
/// use std::sync::{Arc, Mutex};
/// use std::time::Duration;
/// use taglink_hardware::{DriverReport, ReaderDriver, SimulatedConfig, SimulatedDriver};
///
/// #[tokio::main]
/// async fn main() -> taglink_hardware::Result<()> {
///     let batches = Arc::new(Mutex::new(0usize));
///     let counter = batches.clone();
///
///     let mut driver = SimulatedDriver::new(SimulatedConfig::default().interval(Duration::from_millis(10)));
///     driver.register_callback(Arc::new(move |report| {
///         if let DriverReport::Readings(_) = report {
///             *counter.lock().unwrap() += 1;
///         }
///     }));
///
///     driver.connect("simulated").await?;
///     tokio::time::sleep(Duration::from_millis(50)).await;
///     driver.disconnect().await?;
///
///     assert!(*batches.lock().unwrap() >= 1);
///     Ok(())
/// }
/// ```
pub struct SimulatedDriver {
    config: SimulatedConfig,
    callback: Option<ReportCallback>,
    generator: Option<Generator>,
}

impl SimulatedDriver {
    pub fn new(config: SimulatedConfig) -> Self {
        Self {
            config,
            callback: None,
            generator: None,
        }
    }

    pub fn config(&self) -> &SimulatedConfig {
        &self.config
    }

    async fn generate(
        tags: Vec<String>,
        interval: Duration,
        callback: ReportCallback,
        cancel: CancellationToken,
    ) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut round = 0u64;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let batch = simulated_batch(&tags, round);
                    trace!(round, size = batch.len(), "emitting simulated batch");
                    callback(DriverReport::Readings(batch));
                    round += 1;
                }
            }
        }

        debug!(rounds = round, "simulation stopped");
    }
}

impl Drop for SimulatedDriver {
    fn drop(&mut self) {
        if let Some(generator) = &self.generator {
            generator.cancel.cancel();
        }
    }
}

impl Default for SimulatedDriver {
    fn default() -> Self {
        Self::new(SimulatedConfig::default())
    }
}

impl std::fmt::Debug for SimulatedDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedDriver")
            .field("config", &self.config)
            .field("connected", &self.generator.is_some())
            .finish()
    }
}

impl ReaderDriver for SimulatedDriver {
    fn register_callback(&mut self, callback: ReportCallback) {
        self.callback = Some(callback);
    }

    async fn connect(&mut self, _address: &str) -> Result<()> {
        if self.generator.is_some() {
            return Ok(());
        }

        let callback = self
            .callback
            .clone()
            .ok_or_else(|| HardwareError::configuration("callback must be registered before connect"))?;

        if self.config.tags.is_empty() {
            return Err(HardwareError::configuration("simulation needs at least one tag"));
        }

        let cancel = CancellationToken::new();
        let task = tokio::spawn(Self::generate(
            self.config.tags.clone(),
            self.config.interval,
            callback,
            cancel.clone(),
        ));

        info!(
            tags = self.config.tags.len(),
            interval_ms = self.config.interval.as_millis() as u64,
            "simulated reader connected"
        );

        self.generator = Some(Generator { cancel, task });
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        if let Some(generator) = self.generator.take() {
            generator.cancel.cancel();
            // The task only ends by cancellation; a panic inside the callback
            // surfaces here and is not worth failing disconnect over
            if let Err(e) = generator.task.await {
                debug!(error = %e, "simulation task ended abnormally");
            }
            info!("simulated reader disconnected");
        }

        self.callback = None;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.generator.is_some()
    }

    fn name(&self) -> &str {
        "simulated"
    }
}
