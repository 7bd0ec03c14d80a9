//! Utility functions for the event bus

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::amqp::messages::QUEUE_SUFFIX;

/// Name of the durable queue shared by every instance of a service
pub fn queue_name(service_name: &str) -> String {
    format!("{}.{}", service_name, QUEUE_SUFFIX)
}

/// Generate a unique consumer tag for a service instance
pub fn generate_consumer_tag(service_name: &str) -> String {
    format!("{}-consumer-{}", service_name, Uuid::new_v4())
}

/// Generate a new unique message ID
pub fn generate_message_id() -> String {
    Uuid::new_v4().to_string()
}

/// Get the current UTC timestamp
pub fn current_timestamp() -> DateTime<Utc> {
    Utc::now()
}

/// Lossy preview of a message body for log lines
pub fn body_preview(content: &[u8], max_len: usize) -> String {
    let preview_len = std::cmp::min(max_len, content.len());
    String::from_utf8_lossy(&content[..preview_len]).into_owned()
}
