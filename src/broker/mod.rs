//! Broker collaborator interface
//!
//! The client never talks to a concrete broker. It consumes the capability
//! surface defined here: topic and subscription create/lookup/delete, publish
//! with an awaitable acknowledgment, and a blocking pull. A [`Connector`]
//! establishes the session (authentication, emulator routing and transport
//! are its business) and hands back a [`Broker`].
//!
//! `engine` holds an in-process implementation used by the demo binary and
//! the tests.

pub mod engine;
pub mod message;
pub mod topic;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::oneshot;

use crate::config::PubSubSettings;

pub use crate::utils::error::{BrokerError, ResourceKind};
pub use engine::{InMemoryBroker, InMemoryConnector, InMemorySession};
pub use message::Message;

/// Reference to a remote topic. Cheap to clone; holds no remote resources.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TopicHandle {
    name: String,
    path: String,
}

impl TopicHandle {
    pub fn new(project_id: &str, name: &str) -> Self {
        Self {
            name: name.to_string(),
            path: format!("projects/{project_id}/topics/{name}"),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fully qualified resource path.
    pub fn path(&self) -> &str {
        &self.path
    }
}

/// Reference to a remote subscription.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    name: String,
    path: String,
}

impl SubscriptionHandle {
    pub fn new(project_id: &str, name: &str) -> Self {
        Self {
            name: name.to_string(),
            path: format!("projects/{project_id}/subscriptions/{name}"),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

/// Pending acknowledgment of a submitted message.
///
/// Resolves to the broker-assigned message id once the broker accepted the
/// message. Dropping it does not cancel the publish.
#[derive(Debug)]
pub struct PublishResult {
    ack: oneshot::Receiver<Result<String, BrokerError>>,
}

impl PublishResult {
    /// A result the broker completes later through the returned sender.
    pub fn pending() -> (oneshot::Sender<Result<String, BrokerError>>, Self) {
        let (tx, ack) = oneshot::channel();
        (tx, Self { ack })
    }

    /// A result that is already known at submission time.
    pub fn ready(result: Result<String, BrokerError>) -> Self {
        let (tx, this) = Self::pending();
        let _ = tx.send(result);
        this
    }

    /// Waits for the acknowledgment. A broker that drops the sender without
    /// answering is reported as a closed session.
    pub async fn get(self) -> Result<String, BrokerError> {
        self.ack.await.unwrap_or(Err(BrokerError::Closed))
    }

    /// Non-blocking peek; `None` while the acknowledgment is outstanding.
    pub fn try_get(&mut self) -> Option<Result<String, BrokerError>> {
        match self.ack.try_recv() {
            Ok(result) => Some(result),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(BrokerError::Closed)),
        }
    }
}

/// Capability surface of one broker session.
///
/// Every call is expected to be cancel-safe: dropping a returned future
/// abandons the request. The client bounds calls with its own deadlines.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Creates a topic. Fails with [`BrokerError::AlreadyExists`] when the
    /// name is taken.
    async fn create_topic(&self, name: &str) -> Result<TopicHandle, BrokerError>;

    /// Reference to a topic by name without any remote call.
    fn lookup_topic(&self, name: &str) -> TopicHandle;

    /// Flushes and releases local publish state for the topic. The remote
    /// topic is left in place.
    async fn stop_topic(&self, topic: &TopicHandle) -> Result<(), BrokerError>;

    async fn create_subscription(
        &self,
        name: &str,
        topic: &TopicHandle,
    ) -> Result<SubscriptionHandle, BrokerError>;

    /// Reference to a subscription by name without any remote call.
    fn lookup_subscription(&self, name: &str) -> SubscriptionHandle;

    async fn delete_subscription(&self, subscription: &SubscriptionHandle)
    -> Result<(), BrokerError>;

    /// Waits for the next message on the subscription.
    async fn pull(&self, subscription: &SubscriptionHandle) -> Result<Message, BrokerError>;

    /// Submits a message. Submission failures are reported through the
    /// returned result.
    async fn publish(&self, topic: &TopicHandle, data: Vec<u8>) -> PublishResult;

    /// Closes the session.
    async fn close(&self) -> Result<(), BrokerError>;
}

/// Establishes broker sessions.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, settings: &PubSubSettings) -> Result<Arc<dyn Broker>, BrokerError>;
}
