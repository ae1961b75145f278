//! Topic and subscription resolution
//!
//! Get-or-create for remote resources. Creation that fails because the
//! resource already exists is recovered by a lookup and never reported.
//!
//! Topics are cached per connection. Each name owns a `OnceCell` slot, so
//! concurrent first uses of one name share a single creation call while
//! different names resolve in parallel. A failed creation leaves the slot
//! empty and the next caller retries.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::OnceCell;
use tracing::debug;

use crate::broker::{Broker, SubscriptionHandle, TopicHandle};
use crate::client::within;
use crate::config::TimeoutSettings;
use crate::utils::error::{PubSubError, Result};

#[derive(Debug, Default)]
pub struct TopicCache {
    topics: DashMap<String, Arc<OnceCell<TopicHandle>>>,
}

impl TopicCache {
    pub fn get(&self, name: &str) -> Option<TopicHandle> {
        self.topics
            .get(name)
            .and_then(|slot| slot.value().get().cloned())
    }

    /// Every resolved topic. Slots whose creation is in flight or failed are
    /// skipped.
    pub fn handles(&self) -> Vec<TopicHandle> {
        self.topics
            .iter()
            .filter_map(|slot| slot.value().get().cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.handles().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot(&self, name: &str) -> Arc<OnceCell<TopicHandle>> {
        // the map guard is released at the end of this statement, before any await
        self.topics.entry(name.to_string()).or_default().clone()
    }
}

pub struct Resolver {
    broker: Arc<dyn Broker>,
    cache: TopicCache,
    timeouts: TimeoutSettings,
}

impl Resolver {
    pub fn new(broker: Arc<dyn Broker>, timeouts: TimeoutSettings) -> Self {
        Self {
            broker,
            cache: TopicCache::default(),
            timeouts,
        }
    }

    pub fn cache(&self) -> &TopicCache {
        &self.cache
    }

    pub async fn get_or_create_topic(&self, name: &str) -> Result<TopicHandle> {
        if let Some(topic) = self.cache.get(name) {
            return Ok(topic);
        }

        let slot = self.cache.slot(name);
        let topic = slot.get_or_try_init(|| self.create_topic(name)).await?;
        Ok(topic.clone())
    }

    /// Resolves the topic, then creates the subscription bound to it.
    /// Subscriptions are not cached.
    pub async fn get_or_create_subscription(
        &self,
        subscription: &str,
        topic: &str,
    ) -> Result<SubscriptionHandle> {
        let topic = self.get_or_create_topic(topic).await?;

        let created = within(
            self.timeouts.subscription_create,
            self.broker.create_subscription(subscription, &topic),
        )
        .await;

        match created {
            Ok(handle) => {
                debug!(subscription, topic = topic.name(), "created subscription");
                Ok(handle)
            }
            Err(err) if err.is_already_exists() => {
                debug!(subscription, "subscription already exists, attaching");
                Ok(self.broker.lookup_subscription(subscription))
            }
            Err(source) => Err(PubSubError::SubscriptionResolution {
                subscription: subscription.to_string(),
                source,
            }),
        }
    }

    async fn create_topic(&self, name: &str) -> Result<TopicHandle> {
        match within(self.timeouts.topic_create, self.broker.create_topic(name)).await {
            Ok(topic) => {
                debug!(topic = name, "created topic");
                Ok(topic)
            }
            Err(err) if err.is_already_exists() => {
                debug!(topic = name, "topic already exists, using existing");
                Ok(self.broker.lookup_topic(name))
            }
            Err(source) => Err(PubSubError::TopicResolution {
                topic: name.to_string(),
                source,
            }),
        }
    }
}
