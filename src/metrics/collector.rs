//! Metrics collection using Prometheus
//!
//! This module provides metrics collection for the event bus: delivery
//! outcomes, handler results, publishing and service health.

use crate::types::{ConsumerState, Disposition};
use anyhow::Result;
use prometheus::{
    Histogram, HistogramOpts, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry,
};
use std::sync::Arc;
use std::time::Duration;

/// Main metrics collector for the event bus
#[derive(Clone)]
pub struct MetricsCollector {
    /// Prometheus registry
    registry: Arc<Registry>,

    /// Service-level metrics
    service_metrics: ServiceMetrics,

    /// Inbound delivery metrics
    consumer_metrics: ConsumerMetrics,

    /// Outbound event metrics
    publisher_metrics: PublisherMetrics,
}

/// Service-level metrics
#[derive(Clone)]
pub struct ServiceMetrics {
    /// Service uptime in seconds
    pub uptime_seconds: IntGauge,

    /// Health check status (0=unhealthy, 1=degraded, 2=healthy)
    pub health_status: IntGauge,

    /// Component health status
    pub component_health: IntGaugeVec,

    /// Consumer loop state (see `ConsumerState::as_gauge`)
    pub consumer_state: IntGauge,

    /// Patterns the service queue is bound with
    pub bound_patterns: IntGauge,
}

/// Inbound delivery metrics
#[derive(Clone)]
pub struct ConsumerMetrics {
    /// Deliveries by final disposition
    pub messages_total: IntCounterVec,

    /// Handler invocations by pattern and result
    pub handler_invocations_total: IntCounterVec,

    /// Time from receipt to disposition
    pub dispatch_duration: Histogram,
}

/// Outbound event metrics
#[derive(Clone)]
pub struct PublisherMetrics {
    /// Publish attempts by result
    pub events_published_total: IntCounterVec,

    /// Publish call duration
    pub publish_duration: Histogram,
}

impl MetricsCollector {
    /// Create a new metrics collector with default registry
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());
        Self::with_registry(registry)
    }

    /// Create a new metrics collector with custom registry
    pub fn with_registry(registry: Arc<Registry>) -> Result<Self> {
        let service_metrics = ServiceMetrics::new(&registry)?;
        let consumer_metrics = ConsumerMetrics::new(&registry)?;
        let publisher_metrics = PublisherMetrics::new(&registry)?;

        Ok(Self {
            registry,
            service_metrics,
            consumer_metrics,
            publisher_metrics,
        })
    }

    /// Get the Prometheus registry
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    /// Get service metrics
    pub fn service(&self) -> &ServiceMetrics {
        &self.service_metrics
    }

    /// Get consumer metrics
    pub fn consumer(&self) -> &ConsumerMetrics {
        &self.consumer_metrics
    }

    /// Get publisher metrics
    pub fn publisher(&self) -> &PublisherMetrics {
        &self.publisher_metrics
    }

    /// Record the outcome of one delivery
    pub fn record_dispatch(&self, disposition: Disposition, duration: Duration) {
        self.consumer_metrics
            .messages_total
            .with_label_values(&[disposition.as_str()])
            .inc();

        self.consumer_metrics
            .dispatch_duration
            .observe(duration.as_secs_f64());
    }

    /// Record a single handler run
    pub fn record_handler_invocation(&self, pattern: &str, success: bool) {
        let status = if success { "success" } else { "error" };

        self.consumer_metrics
            .handler_invocations_total
            .with_label_values(&[pattern, status])
            .inc();
    }

    /// Record a publish attempt
    pub fn record_publish(&self, success: bool, duration: Duration) {
        let status = if success { "success" } else { "error" };

        self.publisher_metrics
            .events_published_total
            .with_label_values(&[status])
            .inc();

        self.publisher_metrics
            .publish_duration
            .observe(duration.as_secs_f64());
    }

    /// Update consumer state and binding count
    pub fn update_consumer_state(&self, state: ConsumerState, bound_patterns: usize) {
        self.service_metrics.consumer_state.set(state.as_gauge());
        self.service_metrics
            .bound_patterns
            .set(bound_patterns as i64);
    }

    /// Update health status
    pub fn update_health_status(&self, status: u8) {
        self.service_metrics.health_status.set(status as i64);
    }

    /// Update component health
    pub fn update_component_health(&self, component: &str, healthy: bool) {
        let status = if healthy { 1 } else { 0 };
        self.service_metrics
            .component_health
            .with_label_values(&[component])
            .set(status);
    }
}

impl ServiceMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let uptime_seconds =
            IntGauge::new("league_bus_uptime_seconds", "Service uptime in seconds")?;
        registry.register(Box::new(uptime_seconds.clone()))?;

        let health_status = IntGauge::new(
            "league_bus_health_status",
            "Health status (0=unhealthy, 1=degraded, 2=healthy)",
        )?;
        registry.register(Box::new(health_status.clone()))?;

        let component_health = IntGaugeVec::new(
            Opts::new("league_bus_component_health", "Component health status"),
            &["component"],
        )?;
        registry.register(Box::new(component_health.clone()))?;

        let consumer_state = IntGauge::new(
            "league_bus_consumer_state",
            "Consumer state (0=idle, 1=connected, 2=bound, 3=consuming, 4=skipped, 5=stopped)",
        )?;
        registry.register(Box::new(consumer_state.clone()))?;

        let bound_patterns = IntGauge::new(
            "league_bus_bound_patterns",
            "Patterns bound to the service queue",
        )?;
        registry.register(Box::new(bound_patterns.clone()))?;

        Ok(Self {
            uptime_seconds,
            health_status,
            component_health,
            consumer_state,
            bound_patterns,
        })
    }
}

impl ConsumerMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let messages_total = IntCounterVec::new(
            Opts::new(
                "league_bus_messages_total",
                "Deliveries processed by disposition",
            ),
            &["disposition"],
        )?;
        registry.register(Box::new(messages_total.clone()))?;

        let handler_invocations_total = IntCounterVec::new(
            Opts::new(
                "league_bus_handler_invocations_total",
                "Handler invocations by pattern",
            ),
            &["pattern", "status"],
        )?;
        registry.register(Box::new(handler_invocations_total.clone()))?;

        let dispatch_duration = Histogram::with_opts(
            HistogramOpts::new(
                "league_bus_dispatch_duration_seconds",
                "Time spent dispatching one delivery",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
        )?;
        registry.register(Box::new(dispatch_duration.clone()))?;

        Ok(Self {
            messages_total,
            handler_invocations_total,
            dispatch_duration,
        })
    }
}

impl PublisherMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let events_published_total = IntCounterVec::new(
            Opts::new("league_bus_events_published_total", "Events published"),
            &["status"],
        )?;
        registry.register(Box::new(events_published_total.clone()))?;

        let publish_duration = Histogram::with_opts(
            HistogramOpts::new(
                "league_bus_publish_duration_seconds",
                "Publish call duration",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]),
        )?;
        registry.register(Box::new(publish_duration.clone()))?;

        Ok(Self {
            events_published_total,
            publish_duration,
        })
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new().expect("Failed to create default metrics collector")
    }
}
