use crate::hub::{DeliveryFailure, SubscriberId};
use taglink_hardware::HardwareError;
use taglink_storage::StorageError;
use thiserror::Error;

/// Pipeline errors.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Reader already connected")]
    AlreadyConnected,

    #[error("Connection failed: {0}")]
    Connection(#[from] HardwareError),

    #[error("Connection timeout after {duration_ms}ms")]
    ConnectTimeout { duration_ms: u64 },

    #[error("Connect attempt cancelled")]
    ConnectCancelled,

    #[error("Delivery to subscriber {subscriber} failed: {reason}")]
    Delivery {
        subscriber: SubscriberId,
        reason: DeliveryFailure,
    },

    #[error("Subscriber limit reached ({max})")]
    SubscriberLimit { max: usize },

    #[error("Store error: {0}")]
    Store(#[from] StorageError),

    #[error("Background task failed: {0}")]
    Task(String),

    #[error(transparent)]
    Core(#[from] taglink_core::Error),
}

impl PipelineError {
    pub fn connect_timeout(duration_ms: u64) -> Self {
        Self::ConnectTimeout { duration_ms }
    }

    pub fn delivery(subscriber: SubscriberId, reason: DeliveryFailure) -> Self {
        Self::Delivery { subscriber, reason }
    }
}

impl From<PipelineError> for taglink_core::Error {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::AlreadyConnected => Self::AlreadyConnected,
            PipelineError::Connection(e) => e.into(),
            PipelineError::ConnectTimeout { .. } | PipelineError::ConnectCancelled => {
                Self::Connection(err.to_string())
            }
            PipelineError::Delivery { subscriber, reason } => Self::Delivery {
                subscriber: subscriber.to_string(),
                reason: reason.to_string(),
            },
            PipelineError::Store(e) => e.into(),
            PipelineError::SubscriberLimit { .. } | PipelineError::Task(_) => {
                Self::Config(err.to_string())
            }
            PipelineError::Core(e) => e,
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_maps_to_connection_error() {
        let err: taglink_core::Error = PipelineError::connect_timeout(5000).into();
        assert!(matches!(err, taglink_core::Error::Connection(_)));
        assert_eq!(err.to_string(), "Connection failed: Connection timeout after 5000ms");
    }

    #[test]
    fn test_already_connected_message() {
        assert_eq!(
            PipelineError::AlreadyConnected.to_string(),
            "Reader already connected"
        );
        let err: taglink_core::Error = PipelineError::AlreadyConnected.into();
        assert!(matches!(err, taglink_core::Error::AlreadyConnected));
    }
}
