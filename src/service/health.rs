//! Health check endpoints and monitoring
//!
//! This module provides health check functionality for a league-bus service,
//! including readiness and liveness probes.

use crate::service::app::AppState;
use crate::types::{ConnectionState, ConsumerState};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Health check status
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "✅ healthy"),
            HealthStatus::Degraded => write!(f, "⚠️  degraded"),
            HealthStatus::Unhealthy => write!(f, "❌ unhealthy"),
        }
    }
}

impl HealthStatus {
    /// Combine two statuses, keeping the worse one
    fn worst(self, other: HealthStatus) -> HealthStatus {
        match (self, other) {
            (HealthStatus::Unhealthy, _) | (_, HealthStatus::Unhealthy) => HealthStatus::Unhealthy,
            (HealthStatus::Degraded, _) | (_, HealthStatus::Degraded) => HealthStatus::Degraded,
            _ => HealthStatus::Healthy,
        }
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheck {
    /// Overall service status
    pub status: HealthStatus,
    /// Service name
    pub service: String,
    /// Crate version
    pub version: String,
    /// Current timestamp
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Detailed component checks
    pub checks: Vec<ComponentCheck>,
    /// Service statistics
    pub stats: ServiceStats,
}

/// Individual component health check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentCheck {
    /// Component name
    pub name: String,
    /// Component status
    pub status: HealthStatus,
    /// Optional error message if unhealthy
    pub message: Option<String>,
    /// Check duration in milliseconds
    pub duration_ms: u64,
}

/// Service statistics for health reporting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceStats {
    pub queue_name: String,
    pub consumer_state: ConsumerState,
    pub connection_state: ConnectionState,
    pub bound_patterns: Vec<String>,
    pub registered_handlers: usize,
    pub messages_acked: u64,
    pub messages_requeued: u64,
    pub messages_discarded: u64,
    pub events_published: u64,
    pub uptime_seconds: u64,
}

impl HealthCheck {
    /// Perform a comprehensive health check of the service
    pub async fn check(app_state: Arc<AppState>) -> Result<Self> {
        let service_check = Self::check_service_running(&app_state).await;
        let amqp_check = Self::check_amqp_health(&app_state).await;
        let consumer_check = Self::check_consumer(&app_state).await;

        let status = service_check
            .status
            .clone()
            .worst(amqp_check.status.clone())
            .worst(consumer_check.status.clone());

        Ok(HealthCheck {
            status,
            service: app_state.config().service.name.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: chrono::Utc::now(),
            checks: vec![service_check, amqp_check, consumer_check],
            stats: Self::gather_service_stats(&app_state).await,
        })
    }

    /// Simple liveness check - just verify service is running
    pub async fn liveness_check(app_state: Arc<AppState>) -> Result<HealthStatus> {
        if app_state.is_running().await {
            Ok(HealthStatus::Healthy)
        } else {
            Ok(HealthStatus::Unhealthy)
        }
    }

    /// Readiness check - broker reachable and consumer settled
    pub async fn readiness_check(app_state: Arc<AppState>) -> Result<HealthStatus> {
        if !app_state.is_running().await {
            return Ok(HealthStatus::Unhealthy);
        }

        let amqp = Self::check_amqp_health(&app_state).await.status;
        let consumer = Self::check_consumer(&app_state).await.status;
        Ok(amqp.worst(consumer))
    }

    /// Check if service is running
    async fn check_service_running(app_state: &AppState) -> ComponentCheck {
        let start = std::time::Instant::now();

        let (status, message) = if app_state.is_running().await {
            (HealthStatus::Healthy, None)
        } else {
            (
                HealthStatus::Unhealthy,
                Some("Service is not running".to_string()),
            )
        };

        ComponentCheck {
            name: "service_running".to_string(),
            status,
            message,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    /// Check that connection and channel are open
    async fn check_amqp_health(app_state: &AppState) -> ComponentCheck {
        let start = std::time::Instant::now();
        let broker = app_state.broker();

        let (status, message) = if broker.is_connected().await {
            (HealthStatus::Healthy, None)
        } else {
            (
                HealthStatus::Unhealthy,
                Some(format!("Broker connection is {:?}", broker.state())),
            )
        };

        ComponentCheck {
            name: "amqp_connection".to_string(),
            status,
            message,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    /// Check the consumer loop state
    async fn check_consumer(app_state: &AppState) -> ComponentCheck {
        let start = std::time::Instant::now();

        let (status, message) = match app_state.event_service().try_read() {
            Ok(service) => match service.state() {
                ConsumerState::Consuming => (HealthStatus::Healthy, None),
                ConsumerState::Skipped => (
                    HealthStatus::Degraded,
                    Some("No handlers registered, queue not consumed".to_string()),
                ),
                other => (
                    HealthStatus::Unhealthy,
                    Some(format!("Consumer is {}", other)),
                ),
            },
            Err(_) => (
                HealthStatus::Degraded,
                Some("Event service busy".to_string()),
            ),
        };

        ComponentCheck {
            name: "consumer".to_string(),
            status,
            message,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    /// Gather current service statistics
    async fn gather_service_stats(app_state: &AppState) -> ServiceStats {
        let metrics = app_state.metrics_collector();
        let messages = &metrics.consumer().messages_total;
        let service = app_state.event_service().read().await;

        ServiceStats {
            queue_name: service.queue_name().to_string(),
            consumer_state: service.state(),
            connection_state: app_state.broker().state(),
            bound_patterns: service.registry().patterns().map(String::from).collect(),
            registered_handlers: service.registry().handler_count(),
            messages_acked: messages.with_label_values(&["ack"]).get(),
            messages_requeued: messages.with_label_values(&["requeue"]).get(),
            messages_discarded: messages.with_label_values(&["discard"]).get(),
            events_published: metrics
                .publisher()
                .events_published_total
                .with_label_values(&["success"])
                .get(),
            uptime_seconds: app_state.uptime().as_secs(),
        }
    }
}

/// Convert health check to JSON string
impl HealthCheck {
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| anyhow::anyhow!("Failed to serialize health check: {}", e))
    }
}
