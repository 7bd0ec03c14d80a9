//! Core types for the event bus

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A named event travelling through the shared topic exchange.
///
/// `name` doubles as the routing key at publish time. The payload is an
/// arbitrary JSON document; no schema is enforced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub name: String,
    pub payload: Value,
}

impl Event {
    pub fn new(name: impl Into<String>, payload: Value) -> Self {
        Self {
            name: name.into(),
            payload,
        }
    }

    /// The routing key this event is published and delivered under
    pub fn routing_key(&self) -> &str {
        &self.name
    }
}

/// Lifecycle of the broker connection owned by a `ConnectionManager`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Uninitialized,
    Connected,
    Disconnected,
}

/// Consumer loop state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsumerState {
    Idle,
    Connected,
    Bound,
    Consuming,
    /// Nothing was registered, so the queue was never consumed
    Skipped,
    Stopped,
}

impl ConsumerState {
    /// Numeric encoding used by the consumer state gauge
    pub fn as_gauge(&self) -> i64 {
        match self {
            ConsumerState::Idle => 0,
            ConsumerState::Connected => 1,
            ConsumerState::Bound => 2,
            ConsumerState::Consuming => 3,
            ConsumerState::Skipped => 4,
            ConsumerState::Stopped => 5,
        }
    }
}

impl std::fmt::Display for ConsumerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ConsumerState::Idle => "idle",
            ConsumerState::Connected => "connected",
            ConsumerState::Bound => "bound",
            ConsumerState::Consuming => "consuming",
            ConsumerState::Skipped => "skipped",
            ConsumerState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// What the consumer reports back to the broker for one delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Remove the message permanently
    Ack,
    /// Reject the message, optionally putting it back on the queue
    Reject { requeue: bool },
    /// Report nothing; the message stays unacknowledged until the channel closes
    Leave,
}

impl Disposition {
    /// Label used in logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            Disposition::Ack => "ack",
            Disposition::Reject { requeue: true } => "requeue",
            Disposition::Reject { requeue: false } => "discard",
            Disposition::Leave => "leave",
        }
    }
}

/// What happens to a delivery whose routing key matches no registered pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnmatchedPolicy {
    /// Drain the message so unroutable keys cannot loop
    #[default]
    Acknowledge,
    /// Leave the message unacknowledged
    Ignore,
}

impl std::str::FromStr for UnmatchedPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "acknowledge" | "ack" => Ok(UnmatchedPolicy::Acknowledge),
            "ignore" | "leave" => Ok(UnmatchedPolicy::Ignore),
            other => Err(format!("Unknown unmatched policy: {}", other)),
        }
    }
}
