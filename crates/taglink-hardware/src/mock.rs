//! Scriptable reader for tests.
//!
//! `MockDriver` does nothing on its own; the paired [`MockDriverHandle`]
//! pushes batches and faults through the registered callback and controls
//! how the next connect behaves.

use crate::error::{HardwareError, Result};
use crate::traits::ReaderDriver;
use crate::types::{DriverReport, ReportCallback};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use taglink_core::RawReading;

#[derive(Default)]
struct MockState {
    callback: Option<ReportCallback>,
    connected: bool,
    connect_calls: usize,
    last_address: Option<String>,
    fail_next_connect: Option<String>,
    connect_delay: Option<Duration>,
}

/// Reader driven entirely by its [`MockDriverHandle`].
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use taglink_core::RawReading;
/// use taglink_hardware::{MockDriver, ReaderDriver};
///
/// #[tokio::main]
/// async fn main() -> taglink_hardware::Result<()> {
///     let (mut driver, handle) = MockDriver::new();
///     let batches = Arc::new(AtomicUsize::new(0));
///     let counter = batches.clone();
///     driver.register_callback(Arc::new(move |_| {
///         counter.fetch_add(1, Ordering::SeqCst);
///     }));
///
///     driver.connect("mock").await?;
///     assert!(handle.emit(vec![RawReading::new().with("EPC-96", "E1")]));
///     assert_eq!(batches.load(Ordering::SeqCst), 1);
///     Ok(())
/// }
/// ```
pub struct MockDriver {
    state: Arc<Mutex<MockState>>,
}

/// Control side of a [`MockDriver`].
#[derive(Clone)]
pub struct MockDriverHandle {
    state: Arc<Mutex<MockState>>,
}

impl MockDriver {
    /// Create a driver and its control handle.
    pub fn new() -> (Self, MockDriverHandle) {
        let state = Arc::new(Mutex::new(MockState::default()));
        (
            Self {
                state: state.clone(),
            },
            MockDriverHandle { state },
        )
    }
}

impl std::fmt::Debug for MockDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockDriver")
            .field("connected", &self.state.lock().connected)
            .finish()
    }
}

impl ReaderDriver for MockDriver {
    fn register_callback(&mut self, callback: ReportCallback) {
        self.state.lock().callback = Some(callback);
    }

    async fn connect(&mut self, address: &str) -> Result<()> {
        let delay = {
            let mut state = self.state.lock();
            state.connect_calls += 1;
            state.last_address = Some(address.to_string());
            state.connect_delay
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock();
        if let Some(message) = state.fail_next_connect.take() {
            return Err(HardwareError::connection_failed(address, message));
        }
        if state.callback.is_none() {
            return Err(HardwareError::configuration("callback must be registered before connect"));
        }
        state.connected = true;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        let mut state = self.state.lock();
        state.connected = false;
        state.callback = None;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    fn name(&self) -> &str {
        "mock"
    }
}

impl MockDriverHandle {
    /// Deliver a batch. Returns `false` when not connected.
    pub fn emit(&self, batch: Vec<RawReading>) -> bool {
        self.deliver(DriverReport::Readings(batch))
    }

    /// Report a link fault and drop the link. Returns `false` when not connected.
    pub fn fault(&self, message: impl Into<String>) -> bool {
        let delivered = self.deliver(DriverReport::Fault {
            message: message.into(),
        });
        if delivered {
            let mut state = self.state.lock();
            state.connected = false;
            state.callback = None;
        }
        delivered
    }

    /// Make the next connect fail with `message`.
    pub fn fail_next_connect(&self, message: impl Into<String>) {
        self.state.lock().fail_next_connect = Some(message.into());
    }

    /// Delay every connect by `delay`.
    pub fn set_connect_delay(&self, delay: Duration) {
        self.state.lock().connect_delay = Some(delay);
    }

    /// Number of connect calls so far.
    pub fn connect_calls(&self) -> usize {
        self.state.lock().connect_calls
    }

    /// Address passed to the last connect.
    pub fn last_address(&self) -> Option<String> {
        self.state.lock().last_address.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    /// Whether the driver still holds a callback.
    pub fn has_callback(&self) -> bool {
        self.state.lock().callback.is_some()
    }

    fn deliver(&self, report: DriverReport) -> bool {
        // Invoke outside the lock so the callback may call back into the handle
        let callback = {
            let state = self.state.lock();
            if !state.connected {
                return false;
            }
            state.callback.clone()
        };

        match callback {
            Some(callback) => {
                callback(report);
                true
            }
            None => false,
        }
    }
}
