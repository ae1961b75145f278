//! The `client` module is the messaging client built on a broker session.
//!
//! - `connection`: lifecycle, subscriptions and ordered shutdown.
//! - `resolver`: get-or-create for topics (cached) and subscriptions.
//! - `receiver`: receive loops and the channels they feed.
//! - `publisher`: fire-and-forget and acknowledged publishing.
//! - `naming`: ephemeral subscription names.

pub mod connection;
pub mod naming;
pub mod publisher;
pub mod receiver;
pub mod resolver;
pub mod shutdown;

use std::future::Future;
use std::time::Duration;

use crate::broker::BrokerError;

pub use connection::Connection;
pub use naming::{SubscriptionNamer, UuidNamer};
pub use publisher::Publisher;
pub use receiver::MessageChannel;
pub use shutdown::ShutdownPhase;

/// Bounds a broker request; an elapsed deadline becomes
/// [`BrokerError::DeadlineExceeded`].
pub(crate) async fn within<T>(
    limit: Duration,
    request: impl Future<Output = Result<T, BrokerError>>,
) -> Result<T, BrokerError> {
    tokio::time::timeout(limit, request)
        .await
        .unwrap_or(Err(BrokerError::DeadlineExceeded(limit)))
}
