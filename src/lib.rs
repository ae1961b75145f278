//! # topiclink
//!
//! `topiclink` is a client for managed publish/subscribe brokers. It resolves
//! topics and subscriptions on first use, runs one receive loop per consumed
//! subscription, publishes with or without waiting for acknowledgments, and
//! tears everything down in a fixed order on close.
//!
//! ## Core Modules
//!
//! - `broker`: the broker capability interface, plus an in-process broker.
//! - `client`: the connection, resolver, receive loops and publishers.
//! - `config`: loading connection and logging settings.
//! - `utils`: error types and logging setup.
//!
//! ```rust,no_run
//! use topiclink::broker::{InMemoryBroker, InMemoryConnector};
//! use topiclink::client::Connection;
//! use topiclink::config::PubSubSettings;
//!
//! # async fn demo() -> topiclink::utils::error::Result<()> {
//! let connector = InMemoryConnector::new(InMemoryBroker::new());
//! let connection = Connection::connect(&connector, &PubSubSettings::default()).await?;
//!
//! let publisher = connection.create_publisher("orders").await?;
//! let mut orders = connection.subscribe_to_topic("orders").await?;
//! publisher.publish(&serde_json::json!({"id": 1})).await?;
//!
//! if let Some(message) = orders.recv().await {
//!     println!("{}", String::from_utf8_lossy(&message.data));
//! }
//! connection.close().await
//! # }
//! ```

pub mod broker;
pub mod client;
pub mod config;
pub mod utils;
