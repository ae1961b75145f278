//! Receive loops
//!
//! One tokio task per consumed subscription pulls messages from the broker
//! and forwards them, in broker order, into a channel of capacity one. The
//! send waits for the consumer, so a slow consumer stalls the pull instead
//! of buffering undelivered messages.
//!
//! Both the pull and the send race the loop's cancellation token, biased
//! towards cancellation. A message pulled but not yet handed over when the
//! token fires is abandoned. The consumer side watches the same token, so
//! nothing is delivered once the loop is cancelled.
//!
//! A pull failure other than cancellation ends the loop. The consumer sees
//! the channel end and can ask [`MessageChannel::close_reason`] why.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::broker::{Broker, BrokerError, Message, SubscriptionHandle};
use crate::utils::error::TeardownFailure;

pub(crate) const CHANNEL_CAPACITY: usize = 1;

type Failure = Arc<Mutex<Option<BrokerError>>>;

/// Consumer end of a receive loop.
#[derive(Debug)]
pub struct MessageChannel {
    subscription: SubscriptionHandle,
    messages: mpsc::Receiver<Message>,
    cancel: CancellationToken,
    failure: Failure,
}

impl MessageChannel {
    pub fn subscription(&self) -> &SubscriptionHandle {
        &self.subscription
    }

    /// Next message, or `None` once the loop was cancelled or failed.
    pub async fn recv(&mut self) -> Option<Message> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            message = self.messages.recv() => message,
        }
    }

    /// The broker error that terminated the loop. `None` while the loop runs
    /// and after a clean cancellation.
    pub fn close_reason(&self) -> Option<BrokerError> {
        self.failure.lock().clone()
    }
}

/// Producer end, owned by the connection until shutdown.
#[derive(Debug)]
pub(crate) struct ReceiveLoop {
    subscription: SubscriptionHandle,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl ReceiveLoop {
    pub(crate) fn spawn(
        broker: Arc<dyn Broker>,
        subscription: SubscriptionHandle,
        cancel: CancellationToken,
    ) -> (Self, MessageChannel) {
        let (sender, messages) = mpsc::channel(CHANNEL_CAPACITY);
        let failure = Failure::default();

        let task = tokio::spawn(run(
            broker,
            subscription.clone(),
            sender,
            cancel.clone(),
            failure.clone(),
        ));

        let channel = MessageChannel {
            subscription: subscription.clone(),
            messages,
            cancel: cancel.clone(),
            failure,
        };
        let receive_loop = Self {
            subscription,
            cancel,
            task,
        };
        (receive_loop, channel)
    }

    /// True once the task ended on its own: consumer gone or pull failed.
    pub(crate) fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub(crate) fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Cancels the loop and waits for the task to finish. A task still
    /// running after `grace` is aborted and reported.
    pub(crate) async fn stop(self, grace: Duration) -> Result<(), TeardownFailure> {
        self.cancel.cancel();

        let mut task = self.task;
        match tokio::time::timeout(grace, &mut task).await {
            Ok(_) => Ok(()),
            Err(_) => {
                task.abort();
                Err(TeardownFailure::ReceiverStuck {
                    subscription: self.subscription.name().to_string(),
                    grace,
                })
            }
        }
    }
}

async fn run(
    broker: Arc<dyn Broker>,
    subscription: SubscriptionHandle,
    sender: mpsc::Sender<Message>,
    cancel: CancellationToken,
    failure: Failure,
) {
    debug!(subscription = subscription.name(), "receive loop started");

    loop {
        let pulled = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = sender.closed() => {
                debug!(subscription = subscription.name(), "consumer dropped channel");
                break;
            }
            pulled = broker.pull(&subscription) => pulled,
        };

        let message = match pulled {
            Ok(message) => message,
            Err(err) => {
                error!(subscription = subscription.name(), error = %err, "receive loop failed");
                *failure.lock() = Some(err);
                break;
            }
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            sent = sender.send(message) => {
                if sent.is_err() {
                    break;
                }
            }
        }
    }

    debug!(subscription = subscription.name(), "receive loop finished");
}
