//! Wire envelope handed to the delivery gateway.

use std::collections::HashMap;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use wagon_core::models::Message;

/// The payload object POSTed to subscriber webhooks.
///
/// The `data` field always carries the base64 encoding of the message
/// payload, even when the payload is already textual JSON; consumers must
/// decode. `attributes` ships with `publisher` and `version` pre-populated,
/// and `ordering_key` is present but unused (no ordering guarantee is made).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryEnvelope {
    /// Stringified message id.
    #[serde(rename = "messageID")]
    pub message_id: String,

    /// Publication timestamp. Always a concrete value on the wire;
    /// zero-valued (Unix epoch) when unpopulated.
    #[serde(rename = "publishTime")]
    pub publish_time: DateTime<Utc>,

    /// Reserved for ordered delivery; always empty.
    #[serde(rename = "orderingKey")]
    pub ordering_key: String,

    /// Message metadata key/value pairs.
    pub attributes: HashMap<String, String>,

    /// Base64-encoded message payload.
    pub data: String,

    /// Routing/filter key of the message.
    pub identifier: String,
}

impl DeliveryEnvelope {
    /// Builds the envelope for a message.
    pub fn from_message(message: &Message) -> Self {
        let mut attributes = HashMap::new();
        attributes.insert("publisher".to_string(), "wagon".to_string());
        attributes.insert("version".to_string(), "1.0".to_string());

        Self {
            message_id: message.id.to_string(),
            publish_time: DateTime::UNIX_EPOCH,
            ordering_key: String::new(),
            attributes,
            data: BASE64.encode(message.data.as_bytes()),
            identifier: message.identifier.clone(),
        }
    }
}
