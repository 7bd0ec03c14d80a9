//! Service layer for league-bus
//!
//! This module contains the per-service event bus handle, the application
//! state used by the binary, and health reporting.

pub mod app;
pub mod bus;
pub mod health;

pub use app::{AppState, ServiceError};
pub use bus::EventService;
pub use health::{HealthCheck, HealthStatus};
