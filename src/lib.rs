//! League Bus - shared event messaging core for the league microservices
//!
//! This crate provides durable per-service queue subscription on a topic
//! exchange, wildcard handler registration, topic matching, dispatch with
//! ack/requeue discipline, and persistent event publishing.

pub mod amqp;
pub mod config;
pub mod error;
pub mod metrics;
pub mod service;
pub mod types;
pub mod utils;

// Re-export commonly used types and traits
pub use error::{BusError, Result};
pub use types::*;

// Re-export key components
pub use amqp::connection::{AmqpConfig, ConnectionManager};
pub use amqp::publisher::EventPublisher;
pub use amqp::registry::{handler_fn, sync_handler_fn, EventHandler, HandlerRegistry};
pub use service::bus::EventService;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
