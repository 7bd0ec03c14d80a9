//! Per-service event bus handle
//!
//! An `EventService` is what a league microservice holds on to: it registers
//! handlers, owns the `<service>.events` queue subscription and publishes events
//! through the shared `ConnectionManager` it was constructed with.

use crate::amqp::connection::ConnectionManager;
use crate::amqp::consumer::QueueSubscription;
use crate::amqp::dispatcher::Dispatcher;
use crate::amqp::matcher::has_wildcards;
use crate::amqp::publisher::{AmqpEventPublisher, EventPublisher};
use crate::amqp::registry::{EventHandler, HandlerRegistry};
use crate::error::{BusError, Result};
use crate::metrics::MetricsCollector;
use crate::types::{ConsumerState, UnmatchedPolicy};
use crate::utils::{generate_consumer_tag, queue_name};
use amqprs::channel::{Channel, QueueBindArguments, QueueDeclareArguments};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

/// Event bus endpoint for one logical service
pub struct EventService {
    service_name: String,
    queue_name: String,
    broker: Arc<ConnectionManager>,
    registry: HandlerRegistry,
    publisher: AmqpEventPublisher,
    unmatched_policy: UnmatchedPolicy,
    metrics: Option<Arc<MetricsCollector>>,
    subscription: Option<QueueSubscription>,
    state: ConsumerState,
}

impl EventService {
    /// Create a service endpoint; nothing is declared until `start`
    pub fn new(service_name: impl Into<String>, broker: Arc<ConnectionManager>) -> Self {
        let service_name = service_name.into();
        let queue_name = queue_name(&service_name);

        Self {
            service_name,
            queue_name,
            publisher: AmqpEventPublisher::new(broker.clone()),
            broker,
            registry: HandlerRegistry::new(),
            unmatched_policy: UnmatchedPolicy::default(),
            metrics: None,
            subscription: None,
            state: ConsumerState::Idle,
        }
    }

    pub fn with_unmatched_policy(mut self, policy: UnmatchedPolicy) -> Self {
        self.unmatched_policy = policy;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.publisher = AmqpEventPublisher::new(self.broker.clone()).with_metrics(metrics.clone());
        self.metrics = Some(metrics);
        self
    }

    /// Register a handler for a topic pattern. Registrations made after
    /// `start` only take effect on the next start.
    pub fn on(
        &mut self,
        pattern: impl Into<String>,
        handler: Arc<dyn EventHandler>,
    ) -> Arc<dyn EventHandler> {
        self.registry.on(pattern, handler)
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Durable queue shared by every instance of this service
    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    pub fn state(&self) -> ConsumerState {
        self.state
    }

    pub fn broker(&self) -> Arc<ConnectionManager> {
        self.broker.clone()
    }

    /// Dispatcher over a snapshot of the current registrations
    pub fn dispatcher(&self) -> Dispatcher {
        let dispatcher = Dispatcher::new(Arc::new(self.registry.clone()))
            .with_unmatched_policy(self.unmatched_policy);

        match &self.metrics {
            Some(metrics) => dispatcher.with_metrics(metrics.clone()),
            None => dispatcher,
        }
    }

    fn transition(&mut self, state: ConsumerState) {
        self.state = state;
        if let Some(metrics) = &self.metrics {
            let bound = match state {
                ConsumerState::Bound | ConsumerState::Consuming => self.registry.len(),
                _ => 0,
            };
            metrics.update_consumer_state(state, bound);
        }
    }

    /// Connect, declare and bind the service queue, then start consuming.
    ///
    /// With nothing registered this logs a warning and ends in
    /// `ConsumerState::Skipped`. Calling it while already consuming is a no-op.
    pub async fn start(&mut self) -> Result<ConsumerState> {
        if self.state == ConsumerState::Consuming {
            return Ok(self.state);
        }

        let channel = self.broker.connect().await?;
        self.transition(ConsumerState::Connected);

        if self.registry.is_empty() {
            warn!(
                "Service '{}' has no registered handlers, not consuming '{}'",
                self.service_name, self.queue_name
            );
            self.transition(ConsumerState::Skipped);
            return Ok(self.state);
        }

        self.declare_and_bind(&channel).await?;
        self.transition(ConsumerState::Bound);

        let consumer_tag = generate_consumer_tag(&self.service_name);
        let subscription =
            QueueSubscription::start(channel, self.dispatcher(), &self.queue_name, &consumer_tag)
                .await?;
        self.subscription = Some(subscription);
        self.transition(ConsumerState::Consuming);

        info!(
            "Service '{}' consuming '{}' with {} patterns / {} handlers",
            self.service_name,
            self.queue_name,
            self.registry.len(),
            self.registry.handler_count()
        );
        Ok(self.state)
    }

    async fn declare_and_bind(&self, channel: &Channel) -> Result<()> {
        let args = QueueDeclareArguments::new(&self.queue_name)
            .durable(true)
            .auto_delete(false)
            .finish();

        channel
            .queue_declare(args)
            .await
            .map_err(|e| BusError::AmqpConnectionFailed {
                message: format!("Failed to declare queue {}: {}", self.queue_name, e),
            })?;

        for pattern in self.registry.patterns() {
            let args = QueueBindArguments::new(&self.queue_name, self.broker.exchange_name(), pattern);
            channel
                .queue_bind(args)
                .await
                .map_err(|e| BusError::AmqpConnectionFailed {
                    message: format!(
                        "Failed to bind {} to '{}': {}",
                        self.queue_name, pattern, e
                    ),
                })?;
            info!(
                "Bound queue '{}' with {} pattern '{}'",
                self.queue_name,
                if has_wildcards(pattern) { "wildcard" } else { "exact" },
                pattern
            );
        }

        Ok(())
    }

    /// Publish an event onto the shared exchange
    pub async fn publish(&self, event_name: &str, payload: Value) -> Result<()> {
        self.publisher.publish(event_name, payload).await
    }

    /// Cancel the subscription and close the broker connection
    pub async fn stop(&mut self) -> Result<()> {
        if let Some(subscription) = self.subscription.take() {
            if let Err(e) = subscription.cancel().await {
                warn!("Failed to cancel consumer for '{}': {}", self.queue_name, e);
            }
        }

        self.broker.disconnect().await?;
        self.transition(ConsumerState::Stopped);
        info!("Service '{}' stopped", self.service_name);
        Ok(())
    }
}
