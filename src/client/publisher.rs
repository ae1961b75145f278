use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::debug;

use crate::broker::{Broker, TopicHandle};
use crate::utils::error::{PubSubError, Result};

/// Publishes JSON payloads to one topic.
///
/// There is no explicit close: pending publish state is flushed when the
/// connection stops its topics during shutdown.
#[derive(Clone)]
pub struct Publisher {
    broker: Arc<dyn Broker>,
    topic: TopicHandle,
    publish_timeout: Duration,
}

impl Publisher {
    pub(crate) fn new(broker: Arc<dyn Broker>, topic: TopicHandle, publish_timeout: Duration) -> Self {
        Self {
            broker,
            topic,
            publish_timeout,
        }
    }

    pub fn topic(&self) -> &TopicHandle {
        &self.topic
    }

    /// Fire-and-forget. Only serialization errors are returned; the
    /// submission is bounded by the publish timeout and its outcome,
    /// acknowledgment included, is ignored.
    pub async fn publish_async<T: Serialize + ?Sized>(&self, payload: &T) -> Result<()> {
        let data = serde_json::to_vec(payload)?;

        match tokio::time::timeout(self.publish_timeout, self.broker.publish(&self.topic, data)).await
        {
            Ok(mut pending) => {
                if let Some(Err(err)) = pending.try_get() {
                    debug!(topic = self.topic.name(), error = %err, "publish submission failed");
                }
            }
            Err(_) => debug!(topic = self.topic.name(), "publish submission timed out"),
        }
        Ok(())
    }

    /// Submits the payload and waits for the broker to acknowledge it.
    /// Submission and acknowledgment share one publish-timeout deadline.
    /// Returns the broker-assigned message id.
    pub async fn publish<T: Serialize + ?Sized>(&self, payload: &T) -> Result<String> {
        let data = serde_json::to_vec(payload)?;

        let acknowledged = tokio::time::timeout(self.publish_timeout, async {
            self.broker.publish(&self.topic, data).await.get().await
        })
        .await;

        match acknowledged {
            Ok(Ok(id)) => Ok(id),
            Ok(Err(err)) => Err(PubSubError::Publish(err)),
            Err(_) => Err(PubSubError::PublishAckTimeout(self.publish_timeout)),
        }
    }
}

impl fmt::Debug for Publisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Publisher")
            .field("topic", &self.topic)
            .field("publish_timeout", &self.publish_timeout)
            .finish()
    }
}
