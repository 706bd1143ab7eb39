//! Driver control surface.
//!
//! Control requests never return `Err`: every outcome, including connect
//! failures, is a [`ControlResponse`] with a human-readable message.

use crate::context::PipelineContext;
use crate::error::PipelineError;
use crate::hub::HubStats;
use crate::lifecycle::{DisconnectOutcome, SessionInfo};
use crate::state::{ReaderState, StateTransition};
use serde::{Deserialize, Serialize};
use taglink_hardware::DriverMode;
use taglink_storage::ReconciliationStore;

pub const MSG_CONNECTED_SIMULATED: &str = "Connected in simulation mode";
pub const MSG_CONNECTED_READER: &str = "Connected to RFID reader";
pub const MSG_ALREADY_CONNECTED: &str = "Reader already connected";
pub const MSG_DISCONNECTED: &str = "Reader disconnected";
pub const MSG_NOT_CONNECTED: &str = "No reader connected";

/// Transitions included in [`ReaderStatus`].
const STATUS_HISTORY_LEN: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Success,
    Error,
}

/// `{"status": "success" | "error", "message": ...}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlResponse {
    pub status: ResponseStatus,
    pub message: String,
}

impl ControlResponse {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Error,
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ResponseStatus::Success
    }
}

impl From<PipelineError> for ControlResponse {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::AlreadyConnected => Self::error(MSG_ALREADY_CONNECTED),
            other => Self::error(other.to_string()),
        }
    }
}

/// Snapshot of the pipeline for status queries.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReaderStatus {
    pub state: ReaderState,
    pub session: Option<SessionInfo>,
    pub queue_depth: usize,
    pub queue_dropped: u64,
    pub hub: HubStats,
    pub recent_transitions: Vec<StateTransition>,
}

impl<S: ReconciliationStore> PipelineContext<S> {
    /// Connect to the reader at `address`, or start the simulator when
    /// `simulate` is set.
    pub async fn request_connect(&self, address: &str, simulate: bool) -> ControlResponse {
        let mode = DriverMode::from_simulate(simulate);
        match self.controller().connect(address, mode).await {
            Ok(_) if simulate => ControlResponse::success(MSG_CONNECTED_SIMULATED),
            Ok(_) => ControlResponse::success(MSG_CONNECTED_READER),
            Err(e) => e.into(),
        }
    }

    /// Disconnect the reader. Succeeds when nothing is connected.
    pub async fn request_disconnect(&self) -> ControlResponse {
        match self.controller().disconnect().await {
            Ok(DisconnectOutcome::Disconnected { .. } | DisconnectOutcome::ConnectAborted) => {
                ControlResponse::success(MSG_DISCONNECTED)
            }
            Ok(DisconnectOutcome::NotConnected) => ControlResponse::success(MSG_NOT_CONNECTED),
            Err(e) => e.into(),
        }
    }

    pub fn status(&self) -> ReaderStatus {
        let controller = self.controller();
        ReaderStatus {
            state: controller.state(),
            session: controller.session(),
            queue_depth: self.queue().len(),
            queue_dropped: self.queue().dropped(),
            hub: self.hub().stats(),
            recent_transitions: controller.history(STATUS_HISTORY_LEN),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_response_wire_shape() {
        let value = serde_json::to_value(ControlResponse::success(MSG_DISCONNECTED)).unwrap();
        assert_eq!(value, json!({"status": "success", "message": "Reader disconnected"}));

        let value = serde_json::to_value(ControlResponse::error("boom")).unwrap();
        assert_eq!(value, json!({"status": "error", "message": "boom"}));
    }

    #[test]
    fn test_error_conversion() {
        let response: ControlResponse = PipelineError::AlreadyConnected.into();
        assert_eq!(response, ControlResponse::error(MSG_ALREADY_CONNECTED));

        let response: ControlResponse = PipelineError::connect_timeout(5000).into();
        assert!(!response.is_success());
        assert_eq!(response.message, "Connection timeout after 5000ms");
    }
}
