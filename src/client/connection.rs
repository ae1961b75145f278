//! Broker connection
//!
//! `Connection` owns one broker session and everything opened through it:
//! the topic cache, the receive loops and the ephemeral subscriptions.
//!
//! Concurrency and usage notes:
//! - All methods take `&self`; share the connection behind an `Arc` to use
//!   it from several tasks.
//! - Receive loops and ephemeral subscriptions are registered under the same
//!   lock as the closing flag. `close` flips the flag and snapshots both
//!   lists in one step, so a subscription is either in the snapshot or its
//!   subscribe call sees the flag and cleans up after itself.
//! - Once `close` has started, every new operation fails with
//!   [`PubSubError::Closed`], including one whose resolution was already in
//!   flight. A topic such an operation got cached is stopped by that call.
//! - Dropping a connection without `close` cancels its receive loops but
//!   leaves remote resources in place.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::broker::{Broker, Connector, SubscriptionHandle, TopicHandle};
use crate::client::naming::{SubscriptionNamer, UuidNamer};
use crate::client::publisher::Publisher;
use crate::client::receiver::{MessageChannel, ReceiveLoop};
use crate::client::resolver::Resolver;
use crate::client::shutdown::{Shutdown, ShutdownPlan};
use crate::client::within;
use crate::config::{PubSubSettings, TimeoutSettings};
use crate::utils::error::{PubSubError, Result};

/// How long `close` waits for each cancelled receive loop to finish.
pub const RECEIVE_GRACE_PERIOD: Duration = Duration::from_secs(2);

#[derive(Debug, Default)]
struct Tracker {
    closing: bool,
    receivers: Vec<ReceiveLoop>,
    ephemeral: Vec<SubscriptionHandle>,
}

pub struct Connection {
    broker: Arc<dyn Broker>,
    resolver: Resolver,
    timeouts: TimeoutSettings,
    namer: Arc<dyn SubscriptionNamer>,
    lifetime: CancellationToken,
    tracker: Mutex<Tracker>,
}

impl Connection {
    /// Dials the broker under the connect timeout.
    pub async fn connect(connector: &dyn Connector, settings: &PubSubSettings) -> Result<Self> {
        debug!(
            project_id = %settings.project_id,
            emulator = settings.emulator.enabled,
            "establishing broker connection"
        );

        let broker = within(settings.timeouts.connect, connector.connect(settings))
            .await
            .map_err(PubSubError::Connect)?;

        info!(project_id = %settings.project_id, "successfully connected to broker");
        Ok(Self::with_broker(broker, settings.timeouts))
    }

    /// Wraps an already established session.
    pub fn with_broker(broker: Arc<dyn Broker>, timeouts: TimeoutSettings) -> Self {
        Self {
            resolver: Resolver::new(broker.clone(), timeouts),
            broker,
            timeouts,
            namer: Arc::new(UuidNamer),
            lifetime: CancellationToken::new(),
            tracker: Mutex::new(Tracker::default()),
        }
    }

    /// Replaces the ephemeral subscription name generator.
    pub fn with_namer(mut self, namer: Arc<dyn SubscriptionNamer>) -> Self {
        self.namer = namer;
        self
    }

    pub fn is_closed(&self) -> bool {
        self.tracker.lock().closing
    }

    pub async fn create_publisher(&self, topic: &str) -> Result<Publisher> {
        self.ensure_open()?;
        let topic = self.resolve_topic(topic).await?;
        Ok(Publisher::new(
            self.broker.clone(),
            topic,
            self.timeouts.publish,
        ))
    }

    /// Creates a new uniquely named subscription on `topic` and starts
    /// consuming it. The subscription is deleted by `close`.
    pub async fn subscribe_to_topic(&self, topic: &str) -> Result<MessageChannel> {
        self.ensure_open()?;
        self.resolve_topic(topic).await?;
        let name = self.namer.ephemeral_name(topic);
        let subscription = self.resolve_subscription(&name, topic).await?;
        self.start_receive(subscription, true).await
    }

    /// Starts consuming a durable subscription, creating it if needed. The
    /// subscription outlives the connection.
    pub async fn attach_to_subscription(
        &self,
        subscription: &str,
        topic: &str,
    ) -> Result<MessageChannel> {
        self.ensure_open()?;
        self.resolve_topic(topic).await?;
        let subscription = self.resolve_subscription(subscription, topic).await?;
        self.start_receive(subscription, false).await
    }

    /// Tears the connection down: stops receive loops, deletes ephemeral
    /// subscriptions, stops cached topics and closes the session, in that
    /// order. Every step runs even when an earlier one failed; failures are
    /// returned together at the end. Calling it again is a no-op.
    pub async fn close(&self) -> Result<()> {
        let plan = {
            let mut tracker = self.tracker.lock();
            if tracker.closing {
                debug!("connection already closing");
                return Ok(());
            }
            tracker.closing = true;
            ShutdownPlan {
                receivers: std::mem::take(&mut tracker.receivers),
                ephemeral: std::mem::take(&mut tracker.ephemeral),
            }
        };

        debug!(
            receivers = plan.receivers.len(),
            ephemeral_subscriptions = plan.ephemeral.len(),
            topics = self.resolver.cache().len(),
            "closing broker connection"
        );

        let failures = Shutdown::new(
            self.broker.as_ref(),
            self.resolver.cache(),
            self.timeouts,
            RECEIVE_GRACE_PERIOD,
        )
        .run(plan)
        .await;
        self.lifetime.cancel();

        if failures.is_empty() {
            info!("broker connection closed successfully");
            Ok(())
        } else {
            error!(failures = failures.len(), "broker connection closed with errors");
            Err(PubSubError::Teardown { failures })
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(PubSubError::Closed)
        } else {
            Ok(())
        }
    }

    /// Resolves `name` through the cache. When `close` started meanwhile the
    /// result is `Closed`, and a topic resolved here is stopped, since the
    /// shutdown may already be past its topic phase.
    async fn resolve_topic(&self, name: &str) -> Result<TopicHandle> {
        let resolved = self.resolver.get_or_create_topic(name).await;
        if !self.is_closed() {
            return resolved;
        }
        if let Ok(topic) = &resolved {
            self.abandon_topic(topic).await;
        }
        Err(PubSubError::Closed)
    }

    /// Subscription counterpart of `resolve_topic`. A subscription created
    /// during close is handled by `start_receive`.
    async fn resolve_subscription(&self, name: &str, topic: &str) -> Result<SubscriptionHandle> {
        match self.resolver.get_or_create_subscription(name, topic).await {
            Err(_) if self.is_closed() => Err(PubSubError::Closed),
            resolved => resolved,
        }
    }

    async fn start_receive(
        &self,
        subscription: SubscriptionHandle,
        ephemeral: bool,
    ) -> Result<MessageChannel> {
        let channel = {
            let mut tracker = self.tracker.lock();
            if tracker.closing {
                None
            } else {
                if ephemeral {
                    tracker.ephemeral.push(subscription.clone());
                }
                tracker.receivers.retain(|receiver| !receiver.is_finished());
                let (receive_loop, channel) = ReceiveLoop::spawn(
                    self.broker.clone(),
                    subscription.clone(),
                    self.lifetime.child_token(),
                );
                tracker.receivers.push(receive_loop);
                Some(channel)
            }
        };

        match channel {
            Some(channel) => Ok(channel),
            None => {
                if ephemeral {
                    self.discard(&subscription).await;
                }
                Err(PubSubError::Closed)
            }
        }
    }

    /// Deletes an ephemeral subscription that lost the race with `close`.
    async fn discard(&self, subscription: &SubscriptionHandle) {
        let limit = self.timeouts.subscription_delete;
        if let Err(err) = within(limit, self.broker.delete_subscription(subscription)).await {
            warn!(
                subscription = subscription.name(),
                error = %err,
                "could not delete subscription created during close"
            );
        }
    }

    /// Stops a topic cached after `close` began.
    async fn abandon_topic(&self, topic: &TopicHandle) {
        let limit = self.timeouts.publish;
        if let Err(err) = within(limit, self.broker.stop_topic(topic)).await {
            warn!(
                topic = topic.name(),
                error = %err,
                "could not stop topic resolved during close"
            );
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.lifetime.cancel();
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tracker = self.tracker.lock();
        f.debug_struct("Connection")
            .field("timeouts", &self.timeouts)
            .field("topics", &self.resolver.cache().len())
            .field("receivers", &tracker.receivers.len())
            .field("ephemeral", &tracker.ephemeral.len())
            .field("closing", &tracker.closing)
            .finish()
    }
}
