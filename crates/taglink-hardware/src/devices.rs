//! Enum wrapper for reader driver dispatch.
//!
//! [`ReaderDriver`] uses `impl Future` returns and cannot be boxed as a
//! trait object, so runtime selection goes through [`AnyReaderDriver`]
//! instead. The driver in use is chosen by a [`DriverFactory`] from a
//! [`DriverMode`].
//!
//! # Examples
//!
//! ```
//! use taglink_hardware::{DefaultDriverFactory, DriverFactory, DriverMode, ReaderDriver};
//!
//! let factory = DefaultDriverFactory::default();
//! let driver = factory.create(DriverMode::Simulated);
//! assert_eq!(driver.name(), "simulated");
//! ```

use crate::llrp::{LlrpConfig, LlrpDriver, OpaqueReportDecoder, ReportDecoder};
use crate::mock::MockDriver;
use crate::simulated::{SimulatedConfig, SimulatedDriver};
use crate::traits::ReaderDriver;
use crate::types::{DriverMode, ReportCallback};
use crate::Result;
use std::sync::Arc;

/// Concrete driver selected at runtime.
#[derive(Debug)]
#[non_exhaustive]
pub enum AnyReaderDriver {
    /// Synthetic batches.
    Simulated(SimulatedDriver),

    /// LLRP reader over TCP.
    Llrp(LlrpDriver),

    /// Scripted driver for tests.
    Mock(MockDriver),
}

impl ReaderDriver for AnyReaderDriver {
    fn register_callback(&mut self, callback: ReportCallback) {
        match self {
            Self::Simulated(driver) => driver.register_callback(callback),
            Self::Llrp(driver) => driver.register_callback(callback),
            Self::Mock(driver) => driver.register_callback(callback),
        }
    }

    async fn connect(&mut self, address: &str) -> Result<()> {
        match self {
            Self::Simulated(driver) => driver.connect(address).await,
            Self::Llrp(driver) => driver.connect(address).await,
            Self::Mock(driver) => driver.connect(address).await,
        }
    }

    async fn disconnect(&mut self) -> Result<()> {
        match self {
            Self::Simulated(driver) => driver.disconnect().await,
            Self::Llrp(driver) => driver.disconnect().await,
            Self::Mock(driver) => driver.disconnect().await,
        }
    }

    fn is_connected(&self) -> bool {
        match self {
            Self::Simulated(driver) => driver.is_connected(),
            Self::Llrp(driver) => driver.is_connected(),
            Self::Mock(driver) => driver.is_connected(),
        }
    }

    fn name(&self) -> &str {
        match self {
            Self::Simulated(driver) => driver.name(),
            Self::Llrp(driver) => driver.name(),
            Self::Mock(driver) => driver.name(),
        }
    }
}

impl From<SimulatedDriver> for AnyReaderDriver {
    fn from(driver: SimulatedDriver) -> Self {
        Self::Simulated(driver)
    }
}

impl From<LlrpDriver> for AnyReaderDriver {
    fn from(driver: LlrpDriver) -> Self {
        Self::Llrp(driver)
    }
}

impl From<MockDriver> for AnyReaderDriver {
    fn from(driver: MockDriver) -> Self {
        Self::Mock(driver)
    }
}

/// Creates a fresh driver for each reader session.
pub trait DriverFactory: Send + Sync + 'static {
    fn create(&self, mode: DriverMode) -> AnyReaderDriver;
}

/// Factory building [`SimulatedDriver`]s and [`LlrpDriver`]s from fixed
/// configurations.
#[derive(Clone)]
pub struct DefaultDriverFactory {
    simulated: SimulatedConfig,
    llrp: LlrpConfig,
    decoder: Arc<dyn ReportDecoder>,
}

impl DefaultDriverFactory {
    pub fn new(simulated: SimulatedConfig, llrp: LlrpConfig) -> Self {
        Self {
            simulated,
            llrp,
            decoder: Arc::new(OpaqueReportDecoder),
        }
    }

    /// Use `decoder` for LLRP report decoding.
    pub fn decoder(mut self, decoder: Arc<dyn ReportDecoder>) -> Self {
        self.decoder = decoder;
        self
    }
}

impl Default for DefaultDriverFactory {
    fn default() -> Self {
        Self::new(SimulatedConfig::default(), LlrpConfig::default())
    }
}

impl std::fmt::Debug for DefaultDriverFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefaultDriverFactory")
            .field("simulated", &self.simulated)
            .field("llrp", &self.llrp)
            .finish()
    }
}

impl DriverFactory for DefaultDriverFactory {
    fn create(&self, mode: DriverMode) -> AnyReaderDriver {
        match mode {
            DriverMode::Simulated => SimulatedDriver::new(self.simulated.clone()).into(),
            DriverMode::Llrp => LlrpDriver::with_decoder(self.llrp.clone(), self.decoder.clone()).into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_factory_selects_by_mode() {
        let factory = DefaultDriverFactory::default();
        assert!(matches!(factory.create(DriverMode::Simulated), AnyReaderDriver::Simulated(_)));
        assert!(matches!(factory.create(DriverMode::Llrp), AnyReaderDriver::Llrp(_)));
    }

    #[test]
    fn test_factory_passes_configs() {
        let factory = DefaultDriverFactory::new(
            SimulatedConfig::default().interval(Duration::from_millis(250)),
            LlrpConfig::default().connect_timeout(Duration::from_millis(750)),
        );

        match factory.create(DriverMode::Simulated) {
            AnyReaderDriver::Simulated(driver) => {
                assert_eq!(driver.config().interval, Duration::from_millis(250))
            }
            other => panic!("unexpected driver {other:?}"),
        }
        match factory.create(DriverMode::Llrp) {
            AnyReaderDriver::Llrp(driver) => {
                assert_eq!(driver.config().connect_timeout, Duration::from_millis(750))
            }
            other => panic!("unexpected driver {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_dispatch_to_mock() {
        let (mock, handle) = MockDriver::new();
        let mut driver = AnyReaderDriver::from(mock);
        driver.register_callback(Arc::new(|_| {}));

        driver.connect("mock").await.unwrap();
        assert!(driver.is_connected());
        assert_eq!(handle.connect_calls(), 1);

        driver.disconnect().await.unwrap();
        assert!(!driver.is_connected());
        assert_eq!(driver.name(), "mock");
    }
}
