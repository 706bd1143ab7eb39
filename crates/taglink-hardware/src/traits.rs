//! Reader driver capability.
//!
//! A driver owns the link to one source of tag readings, real or
//! simulated. Readings are pushed to a registered [`ReportCallback`] rather
//! than pulled, because vendor stacks deliver reports on their own thread or
//! task.
//!
//! The trait is not object-safe (`impl Future` returns); use
//! [`AnyReaderDriver`](crate::devices::AnyReaderDriver) for runtime
//! selection.

use crate::error::Result;
use crate::types::ReportCallback;
use std::future::Future;

/// Source of tag reading batches.
///
/// # Contract
///
/// - [`register_callback`](Self::register_callback) is called before
///   [`connect`](Self::connect); the callback receives zero or more
///   non-empty batches and at most one fault.
/// - `connect` fails with an error on timeout or transport failure.
/// - [`disconnect`](Self::disconnect) is idempotent and safe when never
///   connected. Once it returns, the callback is not invoked again and the
///   driver has released every clone of it.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use taglink_hardware::{DriverReport, ReaderDriver, Result};
///
/// async fn run<D: ReaderDriver>(driver: &mut D) -> Result<()> {
///     driver.register_callback(Arc::new(|report| {
///         if let DriverReport::Readings(batch) = report {
///             println!("{} readings", batch.len());
///         }
///     }));
///     driver.connect("192.168.1.100").await?;
///     driver.disconnect().await
/// }
/// ```
pub trait ReaderDriver: Send {
    /// Register the report sink. Replaces any previous callback.
    fn register_callback(&mut self, callback: ReportCallback);

    /// Open the link.
    fn connect(&mut self, address: &str) -> impl Future<Output = Result<()>> + Send;

    /// Close the link and stop report delivery.
    fn disconnect(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Whether the link is currently up.
    fn is_connected(&self) -> bool;

    /// Short driver name used in logs.
    fn name(&self) -> &str;
}
