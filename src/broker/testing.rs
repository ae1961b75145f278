//! Scripted broker double for unit tests.
//!
//! Wraps an [`InMemorySession`], counts every call and lets tests inject
//! failures and delays. It also records deletes issued while a pull on the
//! same subscription was still running, which must never happen during an
//! ordered shutdown.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::broker::{
    Broker, BrokerError, Connector, InMemoryBroker, InMemorySession, Message, PublishResult,
    SubscriptionHandle, TopicHandle,
};
use crate::config::PubSubSettings;

#[derive(Debug, Default)]
pub(crate) struct Calls {
    pub create_topic: AtomicUsize,
    pub create_subscription: AtomicUsize,
    pub delete_subscription: AtomicUsize,
    pub stop_topic: AtomicUsize,
    pub publish: AtomicUsize,
    /// Pulls that handed a message to the receive loop.
    pub pulled: AtomicUsize,
    pub close: AtomicUsize,
}

impl Calls {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Event {
    Delete(String),
    Stop(String),
    Close,
}

#[derive(Debug, Default)]
pub(crate) struct Script {
    pub create_topic_delay: Option<Duration>,
    /// Applied after the subscription was created remotely.
    pub create_subscription_delay: Option<Duration>,
    pub create_topic_error: Option<BrokerError>,
    pub create_subscription_error: Option<BrokerError>,
    pub failing_deletes: HashSet<String>,
    pub failing_stops: HashSet<String>,
    pub pull_error: Option<BrokerError>,
    /// Blocks the worker thread inside `pull`, so cancellation cannot reach it.
    pub pull_blocks_thread: Option<Duration>,
    /// Applied before the session is closed.
    pub close_delay: Option<Duration>,
    pub close_error: Option<BrokerError>,
}

pub(crate) struct ScriptedBroker {
    pub engine: InMemoryBroker,
    session: InMemorySession,
    pub calls: Calls,
    pub script: Mutex<Script>,
    active_pulls: Mutex<HashMap<String, usize>>,
    pub deleted_while_pulling: Mutex<Vec<String>>,
    pub events: Mutex<Vec<Event>>,
}

impl ScriptedBroker {
    pub fn new(engine: InMemoryBroker) -> Arc<Self> {
        Arc::new(Self {
            session: InMemorySession::new(engine.clone(), "test-project"),
            engine,
            calls: Calls::default(),
            script: Mutex::new(Script::default()),
            active_pulls: Mutex::new(HashMap::new()),
            deleted_while_pulling: Mutex::new(Vec::new()),
            events: Mutex::new(Vec::new()),
        })
    }

    pub fn deleted(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                Event::Delete(name) => Some(name.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn stopped(&self) -> Vec<String> {
        let mut names: Vec<_> = self
            .events
            .lock()
            .iter()
            .filter_map(|event| match event {
                Event::Stop(name) => Some(name.clone()),
                _ => None,
            })
            .collect();
        names.sort();
        names
    }

    pub fn connector(self: &Arc<Self>) -> ScriptedConnector {
        ScriptedConnector {
            broker: self.clone(),
        }
    }

    fn active_pulls(&self, subscription: &str) -> usize {
        self.active_pulls
            .lock()
            .get(subscription)
            .copied()
            .unwrap_or(0)
    }
}

/// Decrements the active pull count when the pull future completes or is
/// dropped by a cancelled receive loop.
struct PullGuard<'a> {
    broker: &'a ScriptedBroker,
    subscription: String,
}

impl<'a> PullGuard<'a> {
    fn enter(broker: &'a ScriptedBroker, subscription: &str) -> Self {
        *broker
            .active_pulls
            .lock()
            .entry(subscription.to_string())
            .or_default() += 1;
        Self {
            broker,
            subscription: subscription.to_string(),
        }
    }
}

impl Drop for PullGuard<'_> {
    fn drop(&mut self) {
        if let Some(count) = self.broker.active_pulls.lock().get_mut(&self.subscription) {
            *count -= 1;
        }
    }
}

#[async_trait]
impl Broker for ScriptedBroker {
    async fn create_topic(&self, name: &str) -> Result<TopicHandle, BrokerError> {
        self.calls.create_topic.fetch_add(1, Ordering::SeqCst);
        let (delay, error) = {
            let script = self.script.lock();
            (script.create_topic_delay, script.create_topic_error.clone())
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = error {
            return Err(err);
        }
        self.session.create_topic(name).await
    }

    fn lookup_topic(&self, name: &str) -> TopicHandle {
        self.session.lookup_topic(name)
    }

    async fn stop_topic(&self, topic: &TopicHandle) -> Result<(), BrokerError> {
        self.calls.stop_topic.fetch_add(1, Ordering::SeqCst);
        self.events.lock().push(Event::Stop(topic.name().to_string()));
        let fails = self.script.lock().failing_stops.contains(topic.name());
        if fails {
            return Err(BrokerError::Unavailable("stop failed".to_string()));
        }
        self.session.stop_topic(topic).await
    }

    async fn create_subscription(
        &self,
        name: &str,
        topic: &TopicHandle,
    ) -> Result<SubscriptionHandle, BrokerError> {
        self.calls.create_subscription.fetch_add(1, Ordering::SeqCst);
        let (delay, error) = {
            let script = self.script.lock();
            (
                script.create_subscription_delay,
                script.create_subscription_error.clone(),
            )
        };
        if let Some(err) = error {
            return Err(err);
        }
        let created = self.session.create_subscription(name, topic).await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        created
    }

    fn lookup_subscription(&self, name: &str) -> SubscriptionHandle {
        self.session.lookup_subscription(name)
    }

    async fn delete_subscription(
        &self,
        subscription: &SubscriptionHandle,
    ) -> Result<(), BrokerError> {
        self.calls.delete_subscription.fetch_add(1, Ordering::SeqCst);
        self.events
            .lock()
            .push(Event::Delete(subscription.name().to_string()));
        if self.active_pulls(subscription.name()) > 0 {
            self.deleted_while_pulling
                .lock()
                .push(subscription.name().to_string());
        }
        let fails = self
            .script
            .lock()
            .failing_deletes
            .contains(subscription.name());
        if fails {
            return Err(BrokerError::Unavailable("delete failed".to_string()));
        }
        self.session.delete_subscription(subscription).await
    }

    async fn pull(&self, subscription: &SubscriptionHandle) -> Result<Message, BrokerError> {
        let _guard = PullGuard::enter(self, subscription.name());
        let (error, block) = {
            let script = self.script.lock();
            (script.pull_error.clone(), script.pull_blocks_thread)
        };
        if let Some(block) = block {
            std::thread::sleep(block);
        }
        if let Some(err) = error {
            return Err(err);
        }
        let message = self.session.pull(subscription).await?;
        self.calls.pulled.fetch_add(1, Ordering::SeqCst);
        Ok(message)
    }

    async fn publish(&self, topic: &TopicHandle, data: Vec<u8>) -> PublishResult {
        self.calls.publish.fetch_add(1, Ordering::SeqCst);
        self.session.publish(topic, data).await
    }

    async fn close(&self) -> Result<(), BrokerError> {
        self.calls.close.fetch_add(1, Ordering::SeqCst);
        self.events.lock().push(Event::Close);
        let (delay, error) = {
            let script = self.script.lock();
            (script.close_delay, script.close_error.clone())
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.session.close().await?;
        match error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

pub(crate) struct ScriptedConnector {
    broker: Arc<ScriptedBroker>,
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self, _settings: &PubSubSettings) -> Result<Arc<dyn Broker>, BrokerError> {
        let broker: Arc<dyn Broker> = self.broker.clone();
        Ok(broker)
    }
}
