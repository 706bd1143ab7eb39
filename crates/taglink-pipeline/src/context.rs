//! Process-wide pipeline wiring.
//!
//! [`PipelineContext`] builds the queue, hub and controller once, hands
//! them to whoever needs them and owns the broadcast loop. Nothing in the
//! pipeline lives in globals.

use crate::broadcast::run_broadcast_loop;
use crate::error::{PipelineError, Result};
use crate::hub::{BroadcastHub, DEFAULT_MAX_SUBSCRIBERS};
use crate::ingest::UnknownIdentityPolicy;
use crate::lifecycle::{ControllerConfig, LifecycleController};
use crate::queue::IngestionQueue;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use taglink_core::NormalizerConfig;
use taglink_core::constants::{DEFAULT_OUTBOX_CAPACITY, DEFAULT_QUEUE_CAPACITY, DEFAULT_QUEUE_POLL_BACKOFF_MS};
use taglink_hardware::DriverFactory;
use taglink_storage::ReconciliationStore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Pipeline settings.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub queue_capacity: usize,
    pub poll_backoff: Duration,
    pub outbox_capacity: usize,
    pub max_subscribers: usize,
    pub controller: ControllerConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            poll_backoff: Duration::from_millis(DEFAULT_QUEUE_POLL_BACKOFF_MS),
            outbox_capacity: DEFAULT_OUTBOX_CAPACITY,
            max_subscribers: DEFAULT_MAX_SUBSCRIBERS,
            controller: ControllerConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn poll_backoff(mut self, backoff: Duration) -> Self {
        self.poll_backoff = backoff;
        self
    }

    pub fn outbox_capacity(mut self, capacity: usize) -> Self {
        self.outbox_capacity = capacity;
        self
    }

    pub fn max_subscribers(mut self, max: usize) -> Self {
        self.max_subscribers = max;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.controller.connect_timeout = timeout;
        self
    }

    pub fn drain_timeout(mut self, timeout: Duration) -> Self {
        self.controller.drain_timeout = timeout;
        self
    }

    pub fn normalizer(mut self, normalizer: NormalizerConfig) -> Self {
        self.controller.normalizer = normalizer;
        self
    }

    pub fn unknown_identity(mut self, policy: UnknownIdentityPolicy) -> Self {
        self.controller.unknown_identity = policy;
        self
    }
}

/// Owns every long-lived pipeline component.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use taglink_hardware::DefaultDriverFactory;
/// use taglink_pipeline::{PipelineConfig, PipelineContext};
/// use taglink_storage::MemoryTagStore;
///
/// # async fn example() -> taglink_pipeline::Result<()> {
/// let context = PipelineContext::new(
///     PipelineConfig::default(),
///     MemoryTagStore::new(),
///     Arc::new(DefaultDriverFactory::default()),
/// );
/// context.start();
///
/// let response = context.request_connect("simulated", true).await;
/// assert!(response.is_success());
///
/// context.shutdown().await?;
/// # Ok(())
/// # }
/// ```
pub struct PipelineContext<S> {
    config: PipelineConfig,
    queue: Arc<IngestionQueue>,
    hub: Arc<BroadcastHub>,
    store: Arc<S>,
    controller: LifecycleController<S>,
    cancel: CancellationToken,
    broadcast_task: Mutex<Option<JoinHandle<u64>>>,
}

impl<S: ReconciliationStore> PipelineContext<S> {
    pub fn new(config: PipelineConfig, store: S, factory: Arc<dyn DriverFactory>) -> Self {
        let queue = Arc::new(IngestionQueue::new(config.queue_capacity));
        let hub = Arc::new(BroadcastHub::new(config.outbox_capacity, config.max_subscribers));
        let store = Arc::new(store);
        let controller =
            LifecycleController::new(factory, store.clone(), queue.clone(), config.controller);

        Self {
            config,
            queue,
            hub,
            store,
            controller,
            cancel: CancellationToken::new(),
            broadcast_task: Mutex::new(None),
        }
    }

    /// Spawn the broadcast loop. Returns `false` if it is already running
    /// or the context was shut down.
    pub fn start(&self) -> bool {
        let mut task = self.broadcast_task.lock();
        if task.is_some() || self.cancel.is_cancelled() {
            return false;
        }

        *task = Some(tokio::spawn(run_broadcast_loop(
            self.queue.clone(),
            self.hub.clone(),
            self.config.poll_backoff,
            self.cancel.clone(),
        )));
        info!(
            queue_capacity = self.queue.capacity(),
            max_subscribers = self.config.max_subscribers,
            "Pipeline started"
        );
        true
    }

    /// Disconnect the reader and stop the broadcast loop.
    pub async fn shutdown(&self) -> Result<()> {
        let disconnected = self.controller.disconnect().await;
        self.cancel.cancel();

        let task = self.broadcast_task.lock().take();
        if let Some(task) = task {
            let taken = task.await.map_err(|e| PipelineError::Task(e.to_string()))?;
            info!(
                events = taken,
                dropped = self.queue.dropped(),
                undelivered = self.queue.len(),
                "Pipeline stopped"
            );
        }

        if let Err(e) = &disconnected {
            warn!(error = %e, "Reader disconnect during shutdown failed");
        }
        disconnected.map(|_| ())
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn queue(&self) -> &Arc<IngestionQueue> {
        &self.queue
    }

    pub fn hub(&self) -> &Arc<BroadcastHub> {
        &self.hub
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn controller(&self) -> &LifecycleController<S> {
        &self.controller
    }

    /// Whether [`shutdown`](Self::shutdown) was called.
    pub fn is_shut_down(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl<S> std::fmt::Debug for PipelineContext<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineContext")
            .field("config", &self.config)
            .field("queue_len", &self.queue.len())
            .field("subscribers", &self.hub.count())
            .field("controller", &self.controller)
            .finish()
    }
}
