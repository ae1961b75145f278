use anyhow::{Context, Result};
use serde_json::json;
use tracing::info;

use topiclink::broker::{InMemoryBroker, InMemoryConnector};
use topiclink::client::Connection;
use topiclink::config::load_config;
use topiclink::utils::logging;

#[tokio::main]
async fn main() -> Result<()> {
    let settings = load_config().context("failed to load configuration")?;
    logging::init(&settings.logging.level);

    let connector = InMemoryConnector::new(InMemoryBroker::new());
    let connection = Connection::connect(&connector, &settings.pubsub).await?;

    let publisher = connection.create_publisher("orders").await?;
    let mut orders = connection.subscribe_to_topic("orders").await?;

    let id = publisher.publish(&json!({"id": 1})).await?;
    info!(%id, "published order");

    if let Some(message) = orders.recv().await {
        let order: serde_json::Value = message.decode()?;
        info!(id = %message.id, %order, "received order");
    }

    connection.close().await?;
    Ok(())
}
