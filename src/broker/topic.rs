//! Topic management
//!
//! A `Topic` holds the names of the subscriptions bound to it. Binding the
//! same subscription twice is a no-op.
//!
//! Concurrency note: callers must synchronize access to `Topic` (the engine
//! keeps all topics behind its state lock).

use std::collections::HashSet;

pub type SubscriptionName = String;

#[derive(Debug, Default)]
pub struct Topic {
    pub name: String,
    pub subscriptions: HashSet<SubscriptionName>,
}

impl Topic {
    /// Create a new topic with the given name.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            subscriptions: HashSet::new(),
        }
    }

    /// Bind a subscription to the topic. Duplicate binds are ignored.
    pub fn bind(&mut self, subscription: SubscriptionName) {
        self.subscriptions.insert(subscription);
    }

    /// Remove a subscription from the topic.
    pub fn unbind(&mut self, subscription: &str) {
        self.subscriptions.remove(subscription);
    }
}
