//! AMQP event publisher for outbound events

use crate::amqp::connection::ConnectionManager;
use crate::amqp::messages::{MessageUtils, JSON_CONTENT_TYPE, PERSISTENT_DELIVERY_MODE};
use crate::error::{BusError, Result};
use crate::metrics::MetricsCollector;
use crate::types::Event;
use crate::utils::{current_timestamp, generate_message_id};
use amqprs::{channel::BasicPublishArguments, BasicProperties};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error};

/// Trait for publishing events onto the shared exchange
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish `payload` with `event_name` as routing key
    async fn publish(&self, event_name: &str, payload: Value) -> Result<()>;
}

/// AMQP-based event publisher implementation
pub struct AmqpEventPublisher {
    broker: Arc<ConnectionManager>,
    metrics: Option<Arc<MetricsCollector>>,
}

impl AmqpEventPublisher {
    pub fn new(broker: Arc<ConnectionManager>) -> Self {
        Self {
            broker,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Build persistent JSON message properties
    fn properties() -> BasicProperties {
        let mut properties = BasicProperties::default();
        properties
            .with_message_id(&generate_message_id())
            .with_timestamp(current_timestamp().timestamp() as u64)
            .with_content_type(JSON_CONTENT_TYPE)
            .with_delivery_mode(PERSISTENT_DELIVERY_MODE);
        properties
    }

    async fn try_publish(&self, event_name: &str, payload: &Value) -> Result<()> {
        let content = MessageUtils::encode_payload(payload)?;
        let channel = self.broker.connect().await?;

        let args = BasicPublishArguments::new(self.broker.exchange_name(), event_name);
        channel
            .basic_publish(Self::properties(), content, args)
            .await
            .map_err(|e| BusError::PublishFailed {
                event_name: event_name.to_string(),
                message: e.to_string(),
            })?;

        Ok(())
    }
}

#[async_trait]
impl EventPublisher for AmqpEventPublisher {
    async fn publish(&self, event_name: &str, payload: Value) -> Result<()> {
        let start_time = Instant::now();
        let result = self.try_publish(event_name, &payload).await;

        if let Some(metrics) = &self.metrics {
            metrics.record_publish(result.is_ok(), start_time.elapsed());
        }

        match &result {
            Ok(()) => debug!(
                "Published '{}' to exchange '{}'",
                event_name,
                self.broker.exchange_name()
            ),
            Err(e) => error!("Failed to publish '{}': {}", event_name, e),
        }

        result
    }
}

/// Mock event publisher for testing
#[derive(Debug, Default)]
pub struct MockEventPublisher {
    published_events: std::sync::Mutex<Vec<Event>>,
}

impl MockEventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all published events (for testing)
    pub fn get_published_events(&self) -> Vec<Event> {
        self.published_events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Count published events with the given name
    pub fn count_events_named(&self, event_name: &str) -> usize {
        self.get_published_events()
            .iter()
            .filter(|event| event.name == event_name)
            .count()
    }

    /// Clear published events (for testing)
    pub fn clear_events(&self) {
        if let Ok(mut events) = self.published_events.lock() {
            events.clear();
        }
    }
}

#[async_trait]
impl EventPublisher for MockEventPublisher {
    async fn publish(&self, event_name: &str, payload: Value) -> Result<()> {
        if let Ok(mut events) = self.published_events.lock() {
            events.push(Event::new(event_name, payload));
        }
        Ok(())
    }
}
