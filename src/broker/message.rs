//! Message definitions
//!
//! `Message` is one unit delivered by the broker. The payload is opaque
//! bytes; publishers in this crate always write JSON, so `decode` is the
//! usual way to read it back.
//!
//! Notes on fields:
//! - `id`: broker-assigned, unique per topic
//! - `data`: payload bytes
//! - `attributes`: optional string metadata set by the publisher
//! - `publish_time`: when the broker accepted the message

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub data: Vec<u8>,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
    pub publish_time: DateTime<Utc>,
}

impl Message {
    /// A message stamped with the current time and no attributes.
    pub fn new(id: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            id: id.into(),
            data,
            attributes: HashMap::new(),
            publish_time: Utc::now(),
        }
    }

    /// Deserializes the JSON payload.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.data)
    }
}
