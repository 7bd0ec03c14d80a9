//! AMQP message definitions and serialization

use crate::error::{BusError, Result};
use serde_json::Value;

/// Shared topic exchange every service publishes to
pub const EVENTS_EXCHANGE: &str = "events";

/// Suffix appended to a service name to form its queue name
pub const QUEUE_SUFFIX: &str = "events";

/// Content type attached to every published event
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// AMQP delivery mode marking a message as persistent
pub const PERSISTENT_DELIVERY_MODE: u8 = 2;

/// Default number of unacknowledged deliveries per consumer
pub const DEFAULT_PREFETCH_COUNT: u16 = 10;

/// Routing keys for events exchanged between the league services
pub const MATCH_CREATED: &str = "match.created";
pub const MATCH_UPDATED: &str = "match.updated";
pub const MATCH_DELETED: &str = "match.deleted";
pub const TOURNAMENT_CREATED: &str = "tournament.created";
pub const TOURNAMENT_FINISHED: &str = "tournament.finished";
pub const SEASON_FINISHED: &str = "season.finished";
pub const TEAM_DELETED: &str = "team.deleted";
pub const COURSE_DELETED: &str = "course.deleted";
pub const RANKINGS_UPDATED: &str = "rankings.updated";

/// Payload encoding helpers
pub struct MessageUtils;

impl MessageUtils {
    /// Serialize an event payload to UTF-8 JSON bytes
    pub fn encode_payload(payload: &Value) -> Result<Vec<u8>> {
        serde_json::to_vec(payload).map_err(|e| {
            BusError::InternalError {
                message: format!("Failed to serialize payload: {}", e),
            }
            .into()
        })
    }

    /// Decode a delivery body into a JSON document
    pub fn decode_payload(bytes: &[u8]) -> Result<Value> {
        serde_json::from_slice(bytes).map_err(|e| {
            BusError::InvalidPayload {
                reason: format!("Failed to deserialize payload: {}", e),
            }
            .into()
        })
    }
}
