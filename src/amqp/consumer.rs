//! AMQP consumer that feeds deliveries through the dispatcher
//!
//! `EventConsumer` is registered with `basic_consume` in manual-ack mode. Each
//! delivery is dispatched to completion before its disposition is reported, so a
//! single message's handlers never overlap.

use crate::amqp::dispatcher::Dispatcher;
use crate::error::{BusError, Result};
use crate::types::Disposition;
use amqprs::{
    channel::{
        BasicAckArguments, BasicCancelArguments, BasicConsumeArguments, BasicRejectArguments,
        Channel,
    },
    consumer::AsyncConsumer,
    BasicProperties, Deliver,
};
use async_trait::async_trait;
use tracing::{debug, error, info, warn};

/// Handle on a running subscription, used to cancel it
pub struct QueueSubscription {
    channel: Channel,
    consumer_tag: String,
    queue_name: String,
}

impl QueueSubscription {
    /// Start consuming `queue_name` with manual acknowledgements
    pub async fn start(
        channel: Channel,
        dispatcher: Dispatcher,
        queue_name: &str,
        consumer_tag: &str,
    ) -> Result<Self> {
        let args = BasicConsumeArguments::new(queue_name, consumer_tag);

        let consumer_tag = channel
            .basic_consume(EventConsumer::new(dispatcher), args)
            .await
            .map_err(|e| BusError::AmqpConnectionFailed {
                message: format!("Failed to start consuming '{}': {}", queue_name, e),
            })?;

        info!(
            "Started consuming messages from queue: {} (tag {})",
            queue_name, consumer_tag
        );

        Ok(Self {
            channel,
            consumer_tag,
            queue_name: queue_name.to_string(),
        })
    }

    pub fn consumer_tag(&self) -> &str {
        &self.consumer_tag
    }

    /// Stop consuming messages
    pub async fn cancel(&self) -> Result<()> {
        if !self.channel.is_open() {
            debug!("Channel already closed, nothing to cancel");
            return Ok(());
        }

        let args = BasicCancelArguments::new(&self.consumer_tag);
        self.channel.basic_cancel(args).await.map_err(|e| {
            BusError::AmqpConnectionFailed {
                message: format!("Failed to stop consuming: {}", e),
            }
        })?;

        info!("Stopped consuming messages from queue: {}", self.queue_name);
        Ok(())
    }
}

/// Internal consumer implementation
pub struct EventConsumer {
    dispatcher: Dispatcher,
}

impl EventConsumer {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self { dispatcher }
    }

    /// Report the dispatcher's verdict for one delivery back to the broker
    async fn settle(channel: &Channel, delivery_tag: u64, disposition: Disposition) -> Result<()> {
        match Settlement::for_delivery(delivery_tag, disposition) {
            Some(Settlement::Ack(args)) => {
                channel
                    .basic_ack(args)
                    .await
                    .map_err(|e| BusError::AmqpConnectionFailed {
                        message: format!("Failed to ack delivery {}: {}", delivery_tag, e),
                    })?
            }
            Some(Settlement::Reject(args)) => {
                channel
                    .basic_reject(args)
                    .await
                    .map_err(|e| BusError::AmqpConnectionFailed {
                        message: format!("Failed to reject delivery {}: {}", delivery_tag, e),
                    })?
            }
            None => {}
        }

        Ok(())
    }
}

/// Broker call that settles one delivery
pub enum Settlement {
    Ack(BasicAckArguments),
    Reject(BasicRejectArguments),
}

impl Settlement {
    /// Map a disposition onto the ack/reject frame; `Leave` sends nothing
    pub fn for_delivery(delivery_tag: u64, disposition: Disposition) -> Option<Self> {
        match disposition {
            Disposition::Ack => Some(Settlement::Ack(BasicAckArguments::new(delivery_tag, false))),
            Disposition::Reject { requeue } => Some(Settlement::Reject(
                BasicRejectArguments::new(delivery_tag, requeue),
            )),
            Disposition::Leave => None,
        }
    }
}

#[async_trait]
impl AsyncConsumer for EventConsumer {
    async fn consume(
        &mut self,
        channel: &Channel,
        deliver: Deliver,
        _basic_properties: BasicProperties,
        content: Vec<u8>,
    ) {
        let delivery_tag = deliver.delivery_tag();
        let routing_key = deliver.routing_key().to_string();

        debug!(
            "AMQP message received - delivery_tag: {}, routing_key: '{}', redelivered: {}, size: {} bytes",
            delivery_tag,
            routing_key,
            deliver.redelivered(),
            content.len()
        );

        let start_time = std::time::Instant::now();
        let report = self.dispatcher.dispatch(&routing_key, &content).await;

        if let Err(e) = Self::settle(channel, delivery_tag, report.disposition).await {
            error!("Failed to settle message '{}': {}", routing_key, e);
            return;
        }

        let processing_time = start_time.elapsed();
        match report.disposition {
            Disposition::Ack => debug!(
                "Message '{}' acknowledged - handlers: {}, processing_time: {:.2}ms",
                routing_key,
                report.handlers_succeeded,
                processing_time.as_secs_f64() * 1000.0
            ),
            disposition => warn!(
                "Message '{}' settled as {} - processing_time: {:.2}ms",
                routing_key,
                disposition.as_str(),
                processing_time.as_secs_f64() * 1000.0
            ),
        }
    }
}
