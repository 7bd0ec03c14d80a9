//! Main application state and service coordination
//!
//! This module contains the AppState used by the `league-bus` binary: it wires
//! the broker connection, the listener's `EventService`, the metrics service and
//! background tasks together.

use crate::amqp::connection::ConnectionManager;
use crate::amqp::registry::{sync_handler_fn, EventHandler};
use crate::config::{validate_config, AppConfig};
use crate::metrics::{HealthServer, HealthServerConfig, MetricsCollector, MetricsService};
use crate::service::bus::EventService;
use crate::service::health::{HealthCheck, HealthStatus};
use crate::types::ConsumerState;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::{debug, info, warn};

/// Service-level errors
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("AMQP connection error: {message}")]
    AmqpConnection { message: String },

    #[error("Service initialization error: {message}")]
    Initialization { message: String },
}

/// Handler that logs every event it is given
pub fn event_logger(service_name: &str) -> Arc<dyn EventHandler> {
    let service_name = service_name.to_string();
    sync_handler_fn(move |event| {
        info!(
            service = %service_name,
            routing_key = %event.name,
            payload = %event.payload,
            "Event received"
        );
        Ok(())
    })
}

/// Main application state containing all service components
pub struct AppState {
    /// Application configuration
    config: AppConfig,

    /// Broker connection shared by consumer and publisher
    broker: Arc<ConnectionManager>,

    /// The listener's event bus endpoint
    event_service: RwLock<EventService>,

    /// Metrics collector shared with the dispatcher and publisher
    metrics_collector: Arc<MetricsCollector>,

    /// Health and metrics HTTP endpoints, present while running
    metrics_service: Mutex<Option<MetricsService>>,

    /// Background task handles
    background_tasks: Mutex<Vec<JoinHandle<()>>>,

    /// Service status
    is_running: Arc<RwLock<bool>>,

    started_at: Instant,
}

impl AppState {
    /// Build every component; nothing touches the network yet
    pub fn new(config: AppConfig) -> Result<Self, ServiceError> {
        info!(
            "Initializing league-bus service '{}' against {}",
            config.service.name,
            config.amqp_endpoint()
        );

        validate_config(&config).map_err(|e| ServiceError::Configuration {
            message: format!("{:#}", e),
        })?;

        let metrics_collector =
            Arc::new(
                MetricsCollector::new().map_err(|e| ServiceError::Initialization {
                    message: format!("Failed to create metrics collector: {}", e),
                })?,
            );

        let broker = Arc::new(ConnectionManager::new(config.amqp_config()));

        let mut event_service = EventService::new(config.service.name.clone(), broker.clone())
            .with_unmatched_policy(config.service.unmatched_policy)
            .with_metrics(metrics_collector.clone());

        let logger = event_logger(&config.service.name);
        for pattern in &config.service.bind_patterns {
            event_service.on(pattern.clone(), logger.clone());
        }

        Ok(Self {
            config,
            broker,
            event_service: RwLock::new(event_service),
            metrics_collector,
            metrics_service: Mutex::new(None),
            background_tasks: Mutex::new(Vec::new()),
            is_running: Arc::new(RwLock::new(false)),
            started_at: Instant::now(),
        })
    }

    /// Start consuming plus health endpoints and background tasks
    pub async fn start(self: &Arc<Self>) -> Result<ConsumerState, ServiceError> {
        info!("Starting league-bus service '{}'", self.config.service.name);

        let state = self
            .event_service
            .write()
            .await
            .start()
            .await
            .map_err(|e| ServiceError::AmqpConnection {
                message: format!("Failed to start consuming: {:#}", e),
            })?;

        *self.is_running.write().await = true;

        self.start_metrics_service().await;
        self.start_background_tasks().await;

        info!("✅ Service '{}' started ({})", self.config.service.name, state);
        Ok(state)
    }

    /// Perform graceful shutdown
    pub async fn shutdown(&self) -> Result<(), ServiceError> {
        info!("Starting graceful shutdown of '{}'", self.config.service.name);

        *self.is_running.write().await = false;

        self.event_service
            .write()
            .await
            .stop()
            .await
            .map_err(|e| ServiceError::AmqpConnection {
                message: format!("Failed to stop event service: {}", e),
            })?;

        if let Some(metrics_service) = self.metrics_service.lock().await.take() {
            if let Err(e) = metrics_service.stop().await {
                warn!("Failed to stop metrics service: {}", e);
            }
        }

        self.stop_background_tasks().await;

        info!("✅ league-bus shutdown completed");
        Ok(())
    }

    /// Get service configuration
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Check if service is running
    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }

    pub fn broker(&self) -> Arc<ConnectionManager> {
        self.broker.clone()
    }

    pub fn event_service(&self) -> &RwLock<EventService> {
        &self.event_service
    }

    pub fn metrics_collector(&self) -> Arc<MetricsCollector> {
        self.metrics_collector.clone()
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    async fn start_metrics_service(self: &Arc<Self>) {
        let health_config = HealthServerConfig {
            port: self.config.service.health_port,
            host: "0.0.0.0".to_string(),
        };
        let health_server = Arc::new(
            HealthServer::new(health_config, self.metrics_collector.clone())
                .with_app_state(self.clone()),
        );
        let metrics_service = MetricsService::new(self.metrics_collector.clone(), health_server);

        let server = metrics_service.clone();
        let handle = tokio::spawn(async move {
            if let Err(e) = server.start().await {
                warn!("Metrics service failed: {}", e);
            }
        });

        *self.metrics_service.lock().await = Some(metrics_service);
        self.background_tasks.lock().await.push(handle);
        info!(
            "Health endpoints listening on port {}",
            self.config.service.health_port
        );
    }

    async fn start_background_tasks(self: &Arc<Self>) {
        let app_state = Arc::downgrade(self);
        let is_running = self.is_running.clone();

        let health_task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(15));

            while *is_running.read().await {
                interval.tick().await;

                let Some(app_state) = app_state.upgrade() else {
                    break;
                };

                let collector = app_state.metrics_collector();
                collector
                    .service()
                    .uptime_seconds
                    .set(app_state.uptime().as_secs() as i64);

                match HealthCheck::check(app_state.clone()).await {
                    Ok(health) => {
                        let status = match health.status {
                            HealthStatus::Healthy => 2,
                            HealthStatus::Degraded => 1,
                            HealthStatus::Unhealthy => 0,
                        };
                        collector.update_health_status(status);
                        for check in &health.checks {
                            collector.update_component_health(
                                &check.name,
                                check.status != HealthStatus::Unhealthy,
                            );
                        }
                        debug!("Health check: {}", health.status);
                    }
                    Err(e) => warn!("Health check failed: {}", e),
                }
            }
        });

        self.background_tasks.lock().await.push(health_task);
    }

    async fn stop_background_tasks(&self) {
        let mut tasks = self.background_tasks.lock().await;
        let task_count = tasks.len();

        for task in tasks.drain(..) {
            task.abort();
        }

        debug!("Stopped {} background tasks", task_count);
    }
}
