//! In-process broker
//!
//! This module contains an in-memory broker implementing the collaborator
//! surface:
//! - topics with the set of subscriptions bound to them
//! - one unbounded queue per subscription, filled by fan-out on publish
//! - sessions that can be closed independently of the shared engine
//! - an optional acknowledgment delay to model slow brokers
//!
//! Concurrency and usage notes:
//! - `InMemoryBroker` is a cheap clone around shared state. All sessions
//!   produced by one `InMemoryConnector` see the same topics.
//! - The state lock is never held across an await: `pull` clones the
//!   subscription's receiver out of the map and waits on it afterwards, so
//!   publishing and administration proceed while pulls are blocked.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, mpsc};
use tracing::{debug, warn};

use crate::broker::message::Message;
use crate::broker::topic::Topic;
use crate::broker::{
    Broker, BrokerError, Connector, PublishResult, ResourceKind, SubscriptionHandle, TopicHandle,
};
use crate::config::PubSubSettings;

type SharedReceiver = Arc<AsyncMutex<mpsc::UnboundedReceiver<Message>>>;

#[derive(Debug)]
struct SubscriptionQueue {
    topic: String,
    sender: mpsc::UnboundedSender<Message>,
    receiver: SharedReceiver,
}

#[derive(Debug, Default)]
struct State {
    topics: HashMap<String, Topic>,
    subscriptions: HashMap<String, SubscriptionQueue>,
}

#[derive(Debug, Default)]
struct Inner {
    state: Mutex<State>,
    ack_delay: Mutex<Option<Duration>>,
    next_id: AtomicU64,
}

/// Shared in-memory broker state.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBroker {
    inner: Arc<Inner>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays every publish acknowledgment by `delay`. Messages are still
    /// fanned out immediately.
    pub fn set_ack_delay(&self, delay: Option<Duration>) {
        *self.inner.ack_delay.lock() = delay;
    }

    pub fn topic_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.inner.state.lock().topics.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn subscription_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self
            .inner
            .state
            .lock()
            .subscriptions
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Names of the subscriptions currently bound to `topic`.
    pub fn subscriptions_of(&self, topic: &str) -> Vec<String> {
        let state = self.inner.state.lock();
        let mut names: Vec<_> = state
            .topics
            .get(topic)
            .map(|t| t.subscriptions.iter().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    pub fn create_topic(&self, name: &str) -> Result<(), BrokerError> {
        let mut state = self.inner.state.lock();
        if state.topics.contains_key(name) {
            return Err(BrokerError::AlreadyExists {
                kind: ResourceKind::Topic,
                name: name.to_string(),
            });
        }
        state.topics.insert(name.to_string(), Topic::new(name));
        Ok(())
    }

    pub fn create_subscription(&self, name: &str, topic: &str) -> Result<(), BrokerError> {
        let mut state = self.inner.state.lock();
        if state.subscriptions.contains_key(name) {
            return Err(BrokerError::AlreadyExists {
                kind: ResourceKind::Subscription,
                name: name.to_string(),
            });
        }

        let Some(bound) = state.topics.get_mut(topic) else {
            return Err(BrokerError::NotFound {
                kind: ResourceKind::Topic,
                name: topic.to_string(),
            });
        };
        bound.bind(name.to_string());

        let (sender, receiver) = mpsc::unbounded_channel();
        state.subscriptions.insert(
            name.to_string(),
            SubscriptionQueue {
                topic: topic.to_string(),
                sender,
                receiver: Arc::new(AsyncMutex::new(receiver)),
            },
        );
        Ok(())
    }

    /// Removes the subscription. Pending pulls on it end with `NotFound`.
    pub fn delete_subscription(&self, name: &str) -> Result<(), BrokerError> {
        let mut state = self.inner.state.lock();
        let Some(queue) = state.subscriptions.remove(name) else {
            return Err(BrokerError::NotFound {
                kind: ResourceKind::Subscription,
                name: name.to_string(),
            });
        };
        if let Some(topic) = state.topics.get_mut(&queue.topic) {
            topic.unbind(name);
        }
        Ok(())
    }

    /// Copies the message into the queue of every subscription bound to the
    /// topic and returns the assigned message id.
    pub fn publish(&self, topic: &str, data: Vec<u8>) -> Result<String, BrokerError> {
        let state = self.inner.state.lock();
        let Some(bound) = state.topics.get(topic) else {
            return Err(BrokerError::NotFound {
                kind: ResourceKind::Topic,
                name: topic.to_string(),
            });
        };

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed).to_string();
        let message = Message::new(id.clone(), data);

        for name in &bound.subscriptions {
            match state.subscriptions.get(name) {
                Some(queue) => {
                    if queue.sender.send(message.clone()).is_err() {
                        warn!(subscription = %name, "subscription queue closed");
                    }
                }
                None => warn!(subscription = %name, "no queue registered for subscription"),
            }
        }
        Ok(id)
    }

    fn receiver(&self, name: &str) -> Result<SharedReceiver, BrokerError> {
        self.inner
            .state
            .lock()
            .subscriptions
            .get(name)
            .map(|queue| queue.receiver.clone())
            .ok_or_else(|| BrokerError::NotFound {
                kind: ResourceKind::Subscription,
                name: name.to_string(),
            })
    }

    fn ack_delay(&self) -> Option<Duration> {
        *self.inner.ack_delay.lock()
    }
}

/// One client session on an [`InMemoryBroker`].
#[derive(Debug)]
pub struct InMemorySession {
    engine: InMemoryBroker,
    project_id: String,
    closed: AtomicBool,
    stopped_topics: Mutex<HashSet<String>>,
}

impl InMemorySession {
    pub fn new(engine: InMemoryBroker, project_id: &str) -> Self {
        Self {
            engine,
            project_id: project_id.to_string(),
            closed: AtomicBool::new(false),
            stopped_topics: Mutex::new(HashSet::new()),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<(), BrokerError> {
        if self.is_closed() {
            Err(BrokerError::Closed)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Broker for InMemorySession {
    async fn create_topic(&self, name: &str) -> Result<TopicHandle, BrokerError> {
        self.ensure_open()?;
        self.engine.create_topic(name)?;
        Ok(self.lookup_topic(name))
    }

    fn lookup_topic(&self, name: &str) -> TopicHandle {
        TopicHandle::new(&self.project_id, name)
    }

    async fn stop_topic(&self, topic: &TopicHandle) -> Result<(), BrokerError> {
        self.ensure_open()?;
        self.stopped_topics.lock().insert(topic.name().to_string());
        Ok(())
    }

    async fn create_subscription(
        &self,
        name: &str,
        topic: &TopicHandle,
    ) -> Result<SubscriptionHandle, BrokerError> {
        self.ensure_open()?;
        self.engine.create_subscription(name, topic.name())?;
        Ok(self.lookup_subscription(name))
    }

    fn lookup_subscription(&self, name: &str) -> SubscriptionHandle {
        SubscriptionHandle::new(&self.project_id, name)
    }

    async fn delete_subscription(
        &self,
        subscription: &SubscriptionHandle,
    ) -> Result<(), BrokerError> {
        self.ensure_open()?;
        self.engine.delete_subscription(subscription.name())
    }

    async fn pull(&self, subscription: &SubscriptionHandle) -> Result<Message, BrokerError> {
        self.ensure_open()?;
        let receiver = self.engine.receiver(subscription.name())?;
        let mut receiver = receiver.lock().await;
        receiver.recv().await.ok_or_else(|| BrokerError::NotFound {
            kind: ResourceKind::Subscription,
            name: subscription.name().to_string(),
        })
    }

    async fn publish(&self, topic: &TopicHandle, data: Vec<u8>) -> PublishResult {
        if let Err(err) = self.ensure_open() {
            return PublishResult::ready(Err(err));
        }
        if self.stopped_topics.lock().contains(topic.name()) {
            return PublishResult::ready(Err(BrokerError::Rejected(format!(
                "topic {} is stopped",
                topic.name()
            ))));
        }

        let id = match self.engine.publish(topic.name(), data) {
            Ok(id) => id,
            Err(err) => return PublishResult::ready(Err(err)),
        };

        match self.engine.ack_delay() {
            None => PublishResult::ready(Ok(id)),
            Some(delay) => {
                let (tx, result) = PublishResult::pending();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = tx.send(Ok(id));
                });
                result
            }
        }
    }

    async fn close(&self) -> Result<(), BrokerError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            debug!(project_id = %self.project_id, "session already closed");
        }
        Ok(())
    }
}

/// Hands out [`InMemorySession`]s over one shared engine.
#[derive(Debug, Clone, Default)]
pub struct InMemoryConnector {
    engine: InMemoryBroker,
}

impl InMemoryConnector {
    pub fn new(engine: InMemoryBroker) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &InMemoryBroker {
        &self.engine
    }
}

#[async_trait]
impl Connector for InMemoryConnector {
    async fn connect(&self, settings: &PubSubSettings) -> Result<Arc<dyn Broker>, BrokerError> {
        if settings.emulator.enabled {
            debug!(address = %settings.emulator.address, "emulator address ignored by in-process broker");
        }
        let session: Arc<dyn Broker> =
            Arc::new(InMemorySession::new(self.engine.clone(), &settings.project_id));
        Ok(session)
    }
}
