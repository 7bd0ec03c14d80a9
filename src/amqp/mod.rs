//! AMQP integration for the event bus
//!
//! This module handles the broker connection, topic matching, handler
//! registration, message dispatch and event publishing.

pub mod connection;
pub mod consumer;
pub mod dispatcher;
pub mod matcher;
pub mod messages;
pub mod publisher;
pub mod registry;

// Re-export commonly used types
pub use connection::{AmqpConfig, ConnectionManager};
pub use consumer::{EventConsumer, QueueSubscription};
pub use dispatcher::{DispatchReport, Dispatcher};
pub use matcher::matches;
pub use messages::*;
pub use publisher::{AmqpEventPublisher, EventPublisher, MockEventPublisher};
pub use registry::{handler_fn, sync_handler_fn, EventHandler, HandlerRegistry};
