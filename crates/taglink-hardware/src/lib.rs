//! Reader driver layer for the taglink pipeline.
//!
//! This crate defines the [`ReaderDriver`] capability and its
//! implementations:
//!
//! - [`SimulatedDriver`]: periodic synthetic batches, no hardware needed.
//! - [`LlrpDriver`]: LLRP readers over TCP, with report decoding delegated
//!   to a pluggable [`ReportDecoder`].
//! - [`MockDriver`]: scripted driver for tests.
//!
//! Drivers push [`DriverReport`]s into a registered callback. Runtime
//! selection goes through [`AnyReaderDriver`] and a [`DriverFactory`].

pub mod devices;
pub mod error;
pub mod llrp;
pub mod mock;
pub mod simulated;
pub mod traits;
pub mod types;

pub use devices::{AnyReaderDriver, DefaultDriverFactory, DriverFactory};
pub use error::{HardwareError, Result};
pub use llrp::{LlrpConfig, LlrpDriver, OpaqueReportDecoder, ReportDecoder};
pub use mock::{MockDriver, MockDriverHandle};
pub use simulated::{DEFAULT_SIMULATED_TAGS, SimulatedConfig, SimulatedDriver, simulated_batch};
pub use traits::ReaderDriver;
pub use types::{DriverMode, DriverReport, ReaderAddress, ReportCallback};
