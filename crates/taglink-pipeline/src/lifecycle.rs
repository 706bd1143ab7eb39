//! Reader connection lifecycle.
//!
//! The [`LifecycleController`] owns the driver of the active session and
//! drives the [`ReaderStateMachine`]. At most one session is Connecting or
//! Connected at any time; a connect request in any other state fails with
//! [`PipelineError::AlreadyConnected`] before a driver is created.
//!
//! Each session gets a fresh driver from the [`DriverFactory`] and its own
//! ingest worker. The driver callback forwards reports to the worker over
//! an unbounded channel, so the driver's context never waits on the store.

use crate::error::{PipelineError, Result};
use crate::ingest::{IngestWorker, UnknownIdentityPolicy};
use crate::queue::IngestionQueue;
use crate::state::{ReaderState, ReaderStateMachine, StateTransition};
use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::fmt::Display;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use taglink_core::NormalizerConfig;
use taglink_core::constants::{DEFAULT_CONNECT_TIMEOUT_MS, DEFAULT_DRAIN_TIMEOUT_MS};
use taglink_hardware::{AnyReaderDriver, DriverFactory, DriverMode, ReaderDriver};
use taglink_storage::ReconciliationStore;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Lifecycle settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControllerConfig {
    /// Bounded wait for a driver connect.
    pub connect_timeout: Duration,

    /// Bounded wait for the ingest worker to flush on disconnect.
    pub drain_timeout: Duration,

    pub normalizer: NormalizerConfig,
    pub unknown_identity: UnknownIdentityPolicy,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
            drain_timeout: Duration::from_millis(DEFAULT_DRAIN_TIMEOUT_MS),
            normalizer: NormalizerConfig::default(),
            unknown_identity: UnknownIdentityPolicy::default(),
        }
    }
}

/// Details of the live session.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub session_id: u64,
    #[serde(serialize_with = "serialize_display")]
    pub mode: DriverMode,
    pub driver: String,
    pub address: String,
    pub connected_at: DateTime<Utc>,
}

fn serialize_display<T: Display, S: Serializer>(
    value: &T,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}

/// Result of a disconnect request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectOutcome {
    /// A live session was torn down.
    Disconnected { session_id: u64 },

    /// A connect in flight was aborted.
    ConnectAborted,

    /// Nothing was connected.
    NotConnected,
}

struct ActiveSession {
    info: SessionInfo,
    driver: AnyReaderDriver,
    worker: JoinHandle<()>,
}

struct Inner {
    session: Option<ActiveSession>,
    pending: Option<CancellationToken>,
}

struct Shared<S> {
    factory: Arc<dyn DriverFactory>,
    store: Arc<S>,
    queue: Arc<IngestionQueue>,
    config: ControllerConfig,
    /// Serializes connect resolution, disconnect and fault handling. Every
    /// state transition happens while it is held.
    inner: Mutex<Inner>,
    machine: parking_lot::Mutex<ReaderStateMachine>,
    state: watch::Sender<ReaderState>,
    session: watch::Sender<Option<SessionInfo>>,
    next_session: AtomicU64,
}

/// Owns the reader session and its state machine.
///
/// Clones share the same controller.
pub struct LifecycleController<S> {
    shared: Arc<Shared<S>>,
}

impl<S> Clone for LifecycleController<S> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<S> std::fmt::Debug for LifecycleController<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleController")
            .field("state", &*self.shared.state.borrow())
            .field("config", &self.shared.config)
            .finish()
    }
}

impl<S: ReconciliationStore> LifecycleController<S> {
    pub fn new(
        factory: Arc<dyn DriverFactory>,
        store: Arc<S>,
        queue: Arc<IngestionQueue>,
        config: ControllerConfig,
    ) -> Self {
        let (state, _) = watch::channel(ReaderState::Disconnected);
        let (session, _) = watch::channel(None);
        Self {
            shared: Arc::new(Shared {
                factory,
                store,
                queue,
                config,
                inner: Mutex::new(Inner {
                    session: None,
                    pending: None,
                }),
                machine: parking_lot::Mutex::new(ReaderStateMachine::new()),
                state,
                session,
                next_session: AtomicU64::new(1),
            }),
        }
    }

    /// Current state.
    pub fn state(&self) -> ReaderState {
        *self.shared.state.borrow()
    }

    /// Watch state changes.
    pub fn watch_state(&self) -> watch::Receiver<ReaderState> {
        self.shared.state.subscribe()
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.shared.config
    }

    /// The live session, if any. Cleared as soon as teardown starts.
    pub fn session(&self) -> Option<SessionInfo> {
        self.shared.session.borrow().clone()
    }

    /// The last `count` state transitions, oldest first.
    pub fn history(&self, count: usize) -> Vec<StateTransition> {
        self.shared.machine.lock().last_transitions(count)
    }

    /// Open a session with a fresh driver for `mode`.
    ///
    /// The attempt runs on its own task, bounded by the connect timeout,
    /// and settles the state there: dropping the returned future does not
    /// leave the controller Connecting. Any failure leaves the controller
    /// Disconnected.
    pub async fn connect(&self, address: &str, mode: DriverMode) -> Result<SessionInfo> {
        let shared = &self.shared;

        let (session_id, cancel) = {
            let mut inner = shared.inner.lock().await;
            let current = shared.machine.lock().current_state();
            if current != ReaderState::Disconnected {
                warn!(state = %current, "Connect rejected, reader already connected");
                return Err(PipelineError::AlreadyConnected);
            }
            shared.transition(ReaderState::Connecting, None)?;

            let cancel = CancellationToken::new();
            inner.pending = Some(cancel.clone());
            (shared.next_session.fetch_add(1, Ordering::Relaxed), cancel)
        };

        let attempt = tokio::spawn(shared.clone().run_connect(
            session_id,
            address.to_string(),
            mode,
            cancel,
        ));
        attempt.await.map_err(|e| PipelineError::Task(e.to_string()))?
    }

    /// Close the live session, or abort a connect in flight.
    ///
    /// Idempotent: with nothing connected this is a no-op.
    pub async fn disconnect(&self) -> Result<DisconnectOutcome> {
        let shared = &self.shared;
        let mut aborted = false;

        loop {
            let mut inner = shared.inner.lock().await;
            let current = shared.machine.lock().current_state();
            match current {
                ReaderState::Disconnected | ReaderState::Failed => {
                    if aborted {
                        return Ok(DisconnectOutcome::ConnectAborted);
                    }
                    debug!("Disconnect requested with no reader connected");
                    return Ok(DisconnectOutcome::NotConnected);
                }
                ReaderState::Connecting => {
                    if let Some(cancel) = inner.pending.as_ref() {
                        cancel.cancel();
                    }
                    drop(inner);
                    aborted = true;

                    let mut state = shared.state.subscribe();
                    let settled = state
                        .wait_for(|s| *s != ReaderState::Connecting)
                        .await
                        .map(|_| ());
                    if settled.is_err() {
                        return Err(PipelineError::Task("state channel closed".to_string()));
                    }
                }
                ReaderState::Connected => {
                    let session = inner.session.take();
                    shared.session.send_replace(None);
                    let session_id = session.as_ref().map(|s| s.info.session_id).unwrap_or(0);
                    if let Some(session) = session {
                        shared.teardown(session).await;
                    }
                    shared.transition(ReaderState::Disconnected, None)?;
                    info!(session_id, "Reader disconnected");
                    return Ok(DisconnectOutcome::Disconnected { session_id });
                }
            }
        }
    }
}

impl<S: ReconciliationStore> Shared<S> {
    /// Callers hold `inner`.
    fn transition(&self, target: ReaderState, reason: Option<String>) -> taglink_core::Result<()> {
        let from = {
            let mut machine = self.machine.lock();
            let from = machine.current_state();
            machine.transition_with_reason(target, reason)?;
            from
        };
        debug!(%from, to = %target, "Reader state changed");
        self.state.send_replace(target);
        Ok(())
    }

    /// Connect a fresh driver and settle Connecting into Connected or
    /// Disconnected.
    async fn run_connect(
        self: Arc<Self>,
        session_id: u64,
        address: String,
        mode: DriverMode,
        cancel: CancellationToken,
    ) -> Result<SessionInfo> {
        let (reports_tx, reports_rx) = mpsc::unbounded_channel();
        let mut driver = self.factory.create(mode);
        let driver_name = driver.name().to_string();
        driver.register_callback(Arc::new(move |report| {
            // A closed channel means the session is being torn down
            let _ = reports_tx.send(report);
        }));

        info!(session_id, %mode, %address, driver = %driver_name, "Connecting to reader");

        let target = address.clone();
        let mut attempt = tokio::spawn(async move {
            let result = driver.connect(&target).await;
            (driver, result)
        });

        let timeout = self.config.connect_timeout;
        let outcome = tokio::select! {
            joined = tokio::time::timeout(timeout, &mut attempt) => match joined {
                Ok(Ok((driver, Ok(())))) => Ok(driver),
                Ok(Ok((mut driver, Err(e)))) => {
                    if let Err(e) = driver.disconnect().await {
                        debug!(session_id, error = %e, "Driver cleanup after failed connect");
                    }
                    Err(PipelineError::Connection(e))
                }
                Ok(Err(e)) => Err(PipelineError::Task(e.to_string())),
                Err(_) => {
                    attempt.abort();
                    Err(PipelineError::connect_timeout(timeout.as_millis() as u64))
                }
            },
            _ = cancel.cancelled() => {
                attempt.abort();
                Err(PipelineError::ConnectCancelled)
            }
        };

        let mut inner = self.inner.lock().await;
        inner.pending = None;

        let driver = match outcome {
            Ok(driver) => driver,
            Err(e) => {
                error!(session_id, %address, error = %e, "Reader connect failed");
                self.transition(ReaderState::Failed, Some(e.to_string()))?;
                self.transition(ReaderState::Disconnected, None)?;
                return Err(e);
            }
        };

        self.transition(ReaderState::Connected, None)?;

        let worker = IngestWorker::new(
            session_id,
            self.store.clone(),
            self.queue.clone(),
            self.config.normalizer,
            self.config.unknown_identity,
        );
        let on_fault = {
            let shared = self.clone();
            move |message: String| {
                let shared = shared.clone();
                tokio::spawn(async move { shared.handle_fault(session_id, message).await });
            }
        };
        let worker = tokio::spawn(worker.run(reports_rx, on_fault));

        let info = SessionInfo {
            session_id,
            mode,
            driver: driver_name,
            address,
            connected_at: Utc::now(),
        };
        inner.session = Some(ActiveSession {
            info: info.clone(),
            driver,
            worker,
        });
        self.session.send_replace(Some(info.clone()));

        info!(session_id, %mode, address = %info.address, "Reader connected");
        Ok(info)
    }

    /// Stop the driver, then give the worker a bounded window to flush.
    async fn teardown(&self, session: ActiveSession) {
        let ActiveSession {
            info,
            mut driver,
            mut worker,
        } = session;

        if let Err(e) = driver.disconnect().await {
            warn!(session_id = info.session_id, error = %e, "Driver disconnect failed");
        }
        // Releases the last callback clone, closing the worker's channel
        drop(driver);

        match tokio::time::timeout(self.config.drain_timeout, &mut worker).await {
            Ok(Ok(())) => debug!(session_id = info.session_id, "Ingest worker drained"),
            Ok(Err(e)) => warn!(session_id = info.session_id, error = %e, "Ingest worker ended abnormally"),
            Err(_) => warn!(
                session_id = info.session_id,
                timeout_ms = self.config.drain_timeout.as_millis() as u64,
                "Ingest worker still busy after drain timeout, detaching"
            ),
        }
    }

    async fn handle_fault(&self, session_id: u64, message: String) {
        let mut inner = self.inner.lock().await;

        let current = inner.session.as_ref().map(|s| s.info.session_id);
        if current != Some(session_id) || self.machine.lock().current_state() != ReaderState::Connected {
            debug!(session_id, "Fault for a session that is no longer active");
            return;
        }

        error!(session_id, %message, "Reader link lost");
        self.session.send_replace(None);
        if let Some(session) = inner.session.take() {
            self.teardown(session).await;
        }

        let result = self
            .transition(ReaderState::Failed, Some(message))
            .and_then(|()| self.transition(ReaderState::Disconnected, None));
        if let Err(e) = result {
            error!(session_id, error = %e, "Could not record link failure");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taglink_core::RawReading;
    use taglink_hardware::{MockDriver, MockDriverHandle};
    use taglink_storage::{MemoryTagStore, StorageResult, StoredEvent, TagFields};

    /// Store whose writes never finish in test time.
    struct StalledStore;

    impl ReconciliationStore for StalledStore {
        async fn upsert(&self, _identity: &str, _fields: &TagFields) -> StorageResult<StoredEvent> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            unreachable!("stalled store never completes")
        }

        async fn list_recent(&self, _skip: u32, _limit: u32) -> StorageResult<Vec<StoredEvent>> {
            Ok(Vec::new())
        }
    }

    struct SingleMock(parking_lot::Mutex<Option<MockDriver>>);

    impl DriverFactory for SingleMock {
        fn create(&self, _mode: DriverMode) -> AnyReaderDriver {
            let driver = self.0.lock().take();
            driver.unwrap_or_else(|| MockDriver::new().0).into()
        }
    }

    fn controller(config: ControllerConfig) -> (LifecycleController<MemoryTagStore>, MockDriverHandle) {
        let (driver, handle) = MockDriver::new();
        let factory = Arc::new(SingleMock(parking_lot::Mutex::new(Some(driver))));
        let controller = LifecycleController::new(
            factory,
            Arc::new(MemoryTagStore::new()),
            Arc::new(IngestionQueue::default()),
            config,
        );
        (controller, handle)
    }

    #[tokio::test]
    async fn test_connect_and_disconnect() {
        let (controller, handle) = controller(ControllerConfig::default());

        let info = controller.connect("10.0.0.5", DriverMode::Llrp).await.unwrap();
        assert_eq!(info.session_id, 1);
        assert_eq!(info.driver, "mock");
        assert_eq!(controller.state(), ReaderState::Connected);
        assert_eq!(handle.last_address().as_deref(), Some("10.0.0.5"));

        let outcome = controller.disconnect().await.unwrap();
        assert_eq!(outcome, DisconnectOutcome::Disconnected { session_id: 1 });
        assert_eq!(controller.state(), ReaderState::Disconnected);
        assert!(!handle.has_callback());
        assert!(controller.session().is_none());
    }

    #[tokio::test]
    async fn test_disconnect_when_idle_is_noop() {
        let (controller, _handle) = controller(ControllerConfig::default());

        assert_eq!(controller.disconnect().await.unwrap(), DisconnectOutcome::NotConnected);
        assert_eq!(controller.disconnect().await.unwrap(), DisconnectOutcome::NotConnected);
        assert!(controller.history(10).is_empty());
    }

    #[tokio::test]
    async fn test_failed_connect_returns_to_disconnected() {
        let (controller, handle) = controller(ControllerConfig::default());
        handle.fail_next_connect("refused");

        let err = controller.connect("10.0.0.5", DriverMode::Llrp).await.unwrap_err();
        assert!(matches!(err, PipelineError::Connection(_)));
        assert_eq!(controller.state(), ReaderState::Disconnected);

        let states: Vec<_> = controller.history(10).iter().map(|t| t.to).collect();
        assert_eq!(
            states,
            vec![ReaderState::Connecting, ReaderState::Failed, ReaderState::Disconnected]
        );
    }

    #[tokio::test]
    async fn test_connect_timeout() {
        let config = ControllerConfig {
            connect_timeout: Duration::from_millis(50),
            ..ControllerConfig::default()
        };
        let (controller, handle) = controller(config);
        handle.set_connect_delay(Duration::from_secs(5));

        let err = controller.connect("10.0.0.5", DriverMode::Llrp).await.unwrap_err();
        assert!(matches!(err, PipelineError::ConnectTimeout { duration_ms: 50 }));
        assert_eq!(controller.state(), ReaderState::Disconnected);
        assert!(!handle.is_connected());
    }

    #[tokio::test]
    async fn test_disconnect_aborts_pending_connect() {
        let (controller, handle) = controller(ControllerConfig::default());
        handle.set_connect_delay(Duration::from_secs(2));

        let connecting = {
            let controller = controller.clone();
            tokio::spawn(async move { controller.connect("10.0.0.5", DriverMode::Llrp).await })
        };
        let mut state = controller.watch_state();
        state.wait_for(|s| *s == ReaderState::Connecting).await.unwrap();

        let outcome = controller.disconnect().await.unwrap();
        assert_eq!(outcome, DisconnectOutcome::ConnectAborted);

        let err = connecting.await.unwrap().unwrap_err();
        assert!(matches!(err, PipelineError::ConnectCancelled));
        assert_eq!(controller.state(), ReaderState::Disconnected);
    }

    #[tokio::test]
    async fn test_driver_fault_fails_session() {
        let (controller, handle) = controller(ControllerConfig::default());
        controller.connect("10.0.0.5", DriverMode::Llrp).await.unwrap();

        let mut state = controller.watch_state();
        assert!(handle.fault("link lost"));
        tokio::time::timeout(
            Duration::from_secs(2),
            state.wait_for(|s| *s == ReaderState::Disconnected),
        )
        .await
        .unwrap()
        .unwrap();

        let history = controller.history(2);
        assert_eq!(history[0].to, ReaderState::Failed);
        assert_eq!(history[0].reason.as_deref(), Some("link lost"));
        assert!(controller.session().is_none());

        // A fresh attempt is accepted afterwards
        let info = controller.connect("10.0.0.6", DriverMode::Llrp).await.unwrap();
        assert_eq!(info.session_id, 2);
    }

    #[tokio::test]
    async fn test_dropped_connect_future_settles_state() {
        let config = ControllerConfig {
            connect_timeout: Duration::from_millis(100),
            ..ControllerConfig::default()
        };
        let (controller, handle) = controller(config);
        handle.set_connect_delay(Duration::from_secs(5));

        let dropped =
            tokio::time::timeout(Duration::from_millis(10), controller.connect("10.0.0.5", DriverMode::Llrp))
                .await;
        assert!(dropped.is_err());
        assert_eq!(controller.state(), ReaderState::Connecting);

        let mut state = controller.watch_state();
        tokio::time::timeout(
            Duration::from_secs(2),
            state.wait_for(|s| *s == ReaderState::Disconnected),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(controller.disconnect().await.unwrap(), DisconnectOutcome::NotConnected);
    }

    #[tokio::test]
    async fn test_session_and_history_readable_during_teardown() {
        let (driver, handle) = MockDriver::new();
        let controller = LifecycleController::new(
            Arc::new(SingleMock(parking_lot::Mutex::new(Some(driver)))),
            Arc::new(StalledStore),
            Arc::new(IngestionQueue::default()),
            ControllerConfig {
                drain_timeout: Duration::from_millis(500),
                ..ControllerConfig::default()
            },
        );
        controller.connect("10.0.0.5", DriverMode::Llrp).await.unwrap();
        assert!(controller.session().is_some());

        assert!(handle.emit(vec![RawReading::new().with("EPC-96", "E1")]));
        tokio::time::sleep(Duration::from_millis(50)).await;

        let disconnecting = {
            let controller = controller.clone();
            tokio::spawn(async move { controller.disconnect().await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;

        // The worker is stuck in the store, so teardown is still draining
        assert!(!disconnecting.is_finished());
        assert!(controller.session().is_none());
        assert_eq!(controller.history(10).len(), 2);

        let outcome = disconnecting.await.unwrap().unwrap();
        assert_eq!(outcome, DisconnectOutcome::Disconnected { session_id: 1 });
        assert_eq!(controller.state(), ReaderState::Disconnected);
    }

    #[test]
    fn test_session_info_serializes_mode() {
        let info = SessionInfo {
            session_id: 7,
            mode: DriverMode::Simulated,
            driver: "simulated".to_string(),
            address: "simulated".to_string(),
            connected_at: DateTime::<Utc>::UNIX_EPOCH,
        };
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["mode"], "simulated");
        assert_eq!(json["sessionId"], 7);
    }
}
