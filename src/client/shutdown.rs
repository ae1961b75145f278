//! Ordered teardown of a connection.
//!
//! Phases run strictly in [`ShutdownPhase::ORDER`]. Each one finishes before
//! the next starts, failures are collected rather than returned, and no phase
//! is skipped because an earlier one failed. Receive loops stop before any
//! subscription is deleted so no pull ever races a delete of its own
//! subscription.

use std::fmt;
use std::time::Duration;

use futures_util::future::join_all;
use tracing::{error, info, warn};

use crate::broker::{Broker, SubscriptionHandle};
use crate::client::receiver::ReceiveLoop;
use crate::client::resolver::TopicCache;
use crate::client::within;
use crate::config::TimeoutSettings;
use crate::utils::error::TeardownFailure;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownPhase {
    CancelReceivers,
    DeleteEphemeralSubscriptions,
    StopTopics,
    CloseSession,
}

impl ShutdownPhase {
    pub const ORDER: [ShutdownPhase; 4] = [
        ShutdownPhase::CancelReceivers,
        ShutdownPhase::DeleteEphemeralSubscriptions,
        ShutdownPhase::StopTopics,
        ShutdownPhase::CloseSession,
    ];
}

impl fmt::Display for ShutdownPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ShutdownPhase::CancelReceivers => "cancel-receivers",
            ShutdownPhase::DeleteEphemeralSubscriptions => "delete-ephemeral-subscriptions",
            ShutdownPhase::StopTopics => "stop-topics",
            ShutdownPhase::CloseSession => "close-session",
        };
        f.write_str(name)
    }
}

/// Snapshot of what the connection tracked when teardown began.
#[derive(Debug, Default)]
pub(crate) struct ShutdownPlan {
    pub receivers: Vec<ReceiveLoop>,
    pub ephemeral: Vec<SubscriptionHandle>,
}

pub(crate) struct Shutdown<'a> {
    broker: &'a dyn Broker,
    topics: &'a TopicCache,
    timeouts: TimeoutSettings,
    grace: Duration,
    failures: Vec<TeardownFailure>,
}

impl<'a> Shutdown<'a> {
    pub(crate) fn new(
        broker: &'a dyn Broker,
        topics: &'a TopicCache,
        timeouts: TimeoutSettings,
        grace: Duration,
    ) -> Self {
        Self {
            broker,
            topics,
            timeouts,
            grace,
            failures: Vec::new(),
        }
    }

    pub(crate) async fn run(mut self, mut plan: ShutdownPlan) -> Vec<TeardownFailure> {
        for phase in ShutdownPhase::ORDER {
            match phase {
                ShutdownPhase::CancelReceivers => {
                    self.cancel_receivers(std::mem::take(&mut plan.receivers))
                        .await
                }
                ShutdownPhase::DeleteEphemeralSubscriptions => {
                    self.delete_subscriptions(std::mem::take(&mut plan.ephemeral))
                        .await
                }
                ShutdownPhase::StopTopics => self.stop_topics().await,
                ShutdownPhase::CloseSession => self.close_session().await,
            }
            info!(%phase, failures = self.failures.len(), "shutdown phase complete");
        }
        self.failures
    }

    async fn cancel_receivers(&mut self, receivers: Vec<ReceiveLoop>) {
        for receiver in &receivers {
            receiver.cancel();
        }

        let grace = self.grace;
        let stopped = join_all(receivers.into_iter().map(|r| r.stop(grace))).await;
        for failure in stopped.into_iter().filter_map(Result::err) {
            warn!(error = %failure, "receive loop did not stop in time");
            self.failures.push(failure);
        }
    }

    async fn delete_subscriptions(&mut self, subscriptions: Vec<SubscriptionHandle>) {
        let limit = self.timeouts.subscription_delete;
        for subscription in subscriptions {
            if let Err(source) = within(limit, self.broker.delete_subscription(&subscription)).await
            {
                error!(subscription = subscription.name(), error = %source, "error while deleting subscription");
                self.failures.push(TeardownFailure::DeleteSubscription {
                    subscription: subscription.name().to_string(),
                    source,
                });
            }
        }
    }

    async fn stop_topics(&mut self) {
        let limit = self.timeouts.publish;
        let broker = self.broker;
        let topics = self.topics.handles();

        let stopped = join_all(topics.iter().map(|topic| async move {
            within(limit, broker.stop_topic(topic))
                .await
                .map_err(|source| TeardownFailure::StopTopic {
                    topic: topic.name().to_string(),
                    source,
                })
        }))
        .await;

        for failure in stopped.into_iter().filter_map(Result::err) {
            error!(error = %failure, "error while stopping topic");
            self.failures.push(failure);
        }
    }

    async fn close_session(&mut self) {
        if let Err(err) = self.broker.close().await {
            error!(error = %err, "error while closing broker session");
            self.failures.push(TeardownFailure::CloseSession(err));
        }
    }
}
