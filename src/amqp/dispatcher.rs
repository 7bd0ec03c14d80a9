//! Per-delivery dispatch logic
//!
//! The dispatcher knows nothing about channels: it takes a routing key and a raw
//! body, runs the matching handlers and returns the `Disposition` the consumer
//! must report to the broker. This keeps the acknowledgement rules testable
//! without a running broker.

use crate::amqp::messages::MessageUtils;
use crate::amqp::registry::HandlerRegistry;
use crate::metrics::MetricsCollector;
use crate::types::{Disposition, Event, UnmatchedPolicy};
use crate::utils::body_preview;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, warn};

/// Result of dispatching a single delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    pub disposition: Disposition,
    /// Patterns that matched the routing key
    pub matched_patterns: usize,
    /// Handlers that ran to completion successfully
    pub handlers_succeeded: usize,
    /// Pattern whose handler failed, if any
    pub failed_pattern: Option<String>,
}

impl DispatchReport {
    fn new(disposition: Disposition) -> Self {
        Self {
            disposition,
            matched_patterns: 0,
            handlers_succeeded: 0,
            failed_pattern: None,
        }
    }
}

/// Routes decoded deliveries to registered handlers
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<HandlerRegistry>,
    unmatched_policy: UnmatchedPolicy,
    metrics: Option<Arc<MetricsCollector>>,
}

impl Dispatcher {
    pub fn new(registry: Arc<HandlerRegistry>) -> Self {
        Self {
            registry,
            unmatched_policy: UnmatchedPolicy::default(),
            metrics: None,
        }
    }

    pub fn with_unmatched_policy(mut self, policy: UnmatchedPolicy) -> Self {
        self.unmatched_policy = policy;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Decode the body, run every matching handler and decide the outcome
    pub async fn dispatch(&self, routing_key: &str, content: &[u8]) -> DispatchReport {
        let start_time = Instant::now();
        let report = self.run(routing_key, content).await;

        if let Some(metrics) = &self.metrics {
            metrics.record_dispatch(report.disposition, start_time.elapsed());
        }

        report
    }

    async fn run(&self, routing_key: &str, content: &[u8]) -> DispatchReport {
        let payload = match MessageUtils::decode_payload(content) {
            Ok(payload) => payload,
            Err(e) => {
                error!(
                    "Discarding undecodable message - routing_key: '{}', error: {}, body: {:?}",
                    routing_key,
                    e,
                    body_preview(content, 100)
                );
                return DispatchReport::new(Disposition::Reject { requeue: false });
            }
        };

        let event = Event::new(routing_key, payload);
        let mut report = DispatchReport::new(Disposition::Ack);

        for (pattern, handlers) in self.registry.matching(routing_key) {
            report.matched_patterns += 1;
            debug!(
                "Routing key '{}' matched pattern '{}' ({} handlers)",
                routing_key,
                pattern,
                handlers.len()
            );

            for handler in handlers {
                let result = handler.handle(&event).await;

                if let Some(metrics) = &self.metrics {
                    metrics.record_handler_invocation(pattern, result.is_ok());
                }

                if let Err(e) = result {
                    warn!(
                        "Handler for pattern '{}' failed on '{}', requeueing: {:#}",
                        pattern, routing_key, e
                    );
                    report.disposition = Disposition::Reject { requeue: true };
                    report.failed_pattern = Some(pattern.to_string());
                    return report;
                }

                report.handlers_succeeded += 1;
            }
        }

        if report.matched_patterns == 0 {
            report.disposition = match self.unmatched_policy {
                UnmatchedPolicy::Acknowledge => {
                    debug!("No handler for '{}', acknowledging", routing_key);
                    Disposition::Ack
                }
                UnmatchedPolicy::Ignore => {
                    debug!("No handler for '{}', leaving unacknowledged", routing_key);
                    Disposition::Leave
                }
            };
        }

        report
    }
}
