//! Error types for the event bus
//!
//! This module defines all error types using anyhow for consistent error handling
//! throughout the crate.

/// Result type alias for convenience
pub type Result<T> = anyhow::Result<T>;

/// Custom error types for specific messaging scenarios
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("AMQP connection failed: {message}")]
    AmqpConnectionFailed { message: String },

    #[error("Invalid event payload: {reason}")]
    InvalidPayload { reason: String },

    #[error("Failed to publish event '{event_name}': {message}")]
    PublishFailed { event_name: String, message: String },

    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    #[error("Internal service error: {message}")]
    InternalError { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = BusError::PublishFailed {
            event_name: "match.created".to_string(),
            message: "channel closed".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Failed to publish event 'match.created': channel closed"
        );

        let err: anyhow::Error = BusError::InvalidPayload {
            reason: "expected value".to_string(),
        }
        .into();
        assert!(err.downcast_ref::<BusError>().is_some());
    }
}
