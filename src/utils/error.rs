//! The `error` module defines the error types used within `topiclink`.
//!
//! `BrokerError` is what a broker collaborator reports. `PubSubError` is what
//! the client surfaces to its callers, wrapping broker errors with the
//! operation that triggered them.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PubSubError>;

/// Kind of remote resource named in a broker error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Topic,
    Subscription,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Topic => f.write_str("topic"),
            ResourceKind::Subscription => f.write_str("subscription"),
        }
    }
}

/// Errors reported by the broker collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BrokerError {
    #[error("{kind} already exists: {name}")]
    AlreadyExists { kind: ResourceKind, name: String },

    #[error("{kind} not found: {name}")]
    NotFound { kind: ResourceKind, name: String },

    #[error("deadline exceeded after {0:?}")]
    DeadlineExceeded(Duration),

    #[error("broker unavailable: {0}")]
    Unavailable(String),

    #[error("broker session closed")]
    Closed,

    #[error("request rejected: {0}")]
    Rejected(String),
}

impl BrokerError {
    /// True for the creation conflict that resolution recovers from by lookup.
    pub fn is_already_exists(&self) -> bool {
        matches!(self, BrokerError::AlreadyExists { .. })
    }
}

/// One failed step of `Connection::close`. Never aborts the teardown.
#[derive(Debug, Clone, Error)]
pub enum TeardownFailure {
    #[error("receive loop for {subscription} did not stop within {grace:?}")]
    ReceiverStuck {
        subscription: String,
        grace: Duration,
    },

    #[error("failed to delete subscription {subscription}: {source}")]
    DeleteSubscription {
        subscription: String,
        source: BrokerError,
    },

    #[error("failed to stop topic {topic}: {source}")]
    StopTopic { topic: String, source: BrokerError },

    #[error("failed to close broker session: {0}")]
    CloseSession(BrokerError),
}

#[derive(Debug, Error)]
pub enum PubSubError {
    #[error("failed to connect to broker: {0}")]
    Connect(BrokerError),

    #[error("failed to resolve topic {topic}: {source}")]
    TopicResolution { topic: String, source: BrokerError },

    #[error("failed to resolve subscription {subscription}: {source}")]
    SubscriptionResolution {
        subscription: String,
        source: BrokerError,
    },

    #[error("failed to serialize payload: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("publish was not acknowledged within {0:?}")]
    PublishAckTimeout(Duration),

    #[error("publish failed: {0}")]
    Publish(BrokerError),

    #[error("connection is closed")]
    Closed,

    #[error("teardown finished with {} failure(s)", .failures.len())]
    Teardown { failures: Vec<TeardownFailure> },
}
