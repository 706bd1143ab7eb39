//! Reader-event ingestion and broadcast pipeline.
//!
//! Raw batches from a reader driver flow through an ingest worker
//! (normalize, reconcile with the store) into the [`IngestionQueue`]. The
//! broadcast loop takes events off the queue in order and the
//! [`BroadcastHub`] fans each one out to every live subscriber.
//!
//! ```text
//! driver callback ──► ingest worker ──► IngestionQueue ──► broadcast loop ──► BroadcastHub ──► subscribers
//!                        │
//!                        └──► ReconciliationStore
//! ```
//!
//! The [`LifecycleController`] owns the reader session and the
//! [`PipelineContext`] owns everything else.

mod broadcast;
pub mod context;
pub mod control;
pub mod error;
pub mod hub;
pub mod ingest;
pub mod lifecycle;
pub mod queue;
pub mod state;

pub use context::{PipelineConfig, PipelineContext};
pub use control::{ControlResponse, ReaderStatus, ResponseStatus};
pub use error::{PipelineError, Result};
pub use hub::{
    BroadcastHub, BroadcastOutcome, DEFAULT_MAX_SUBSCRIBERS, DeliveryFailure, HubStats, Subscriber,
    SubscriberId, Subscription,
};
pub use ingest::UnknownIdentityPolicy;
pub use lifecycle::{ControllerConfig, DisconnectOutcome, LifecycleController, SessionInfo};
pub use queue::IngestionQueue;
pub use state::{MAX_HISTORY_SIZE, ReaderState, ReaderStateMachine, StateTransition};
