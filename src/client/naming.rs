use uuid::Uuid;

/// Produces names for ephemeral subscriptions.
///
/// Names must be unique per call: every `subscribe_to_topic` creates an
/// independent subscription, which is what gives each caller its own copy
/// of the stream.
pub trait SubscriptionNamer: Send + Sync {
    fn ephemeral_name(&self, topic: &str) -> String;
}

/// `"{topic}.{uuid-v4}"`
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidNamer;

impl SubscriptionNamer for UuidNamer {
    fn ephemeral_name(&self, topic: &str) -> String {
        format!("{topic}.{}", Uuid::new_v4())
    }
}
