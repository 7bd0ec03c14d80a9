//! Main application configuration
//!
//! This module defines the configuration structures for a league-bus service,
//! including environment variable loading, TOML files and validation.

use crate::amqp::connection::AmqpConfig;
use crate::amqp::messages::{DEFAULT_PREFETCH_COUNT, EVENTS_EXCHANGE};
use crate::types::UnmatchedPolicy;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub service: ServiceSettings,
    pub amqp: AmqpSettings,
}

/// Service-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// Service name; also names the `<name>.events` queue
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Port for health and metrics endpoints
    pub health_port: u16,
    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_seconds: u64,
    /// Patterns the listener binds its queue with
    pub bind_patterns: Vec<String>,
    /// What to do with deliveries no pattern matches
    pub unmatched_policy: UnmatchedPolicy,
}

/// AMQP connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AmqpSettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub vhost: String,
    /// Shared topic exchange
    pub exchange_name: String,
    /// Unacknowledged deliveries allowed per consumer
    pub prefetch_count: u16,
    /// Extra connection attempts after the first failure
    pub max_retries: u32,
    /// Initial retry delay in milliseconds
    pub retry_delay_ms: u64,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            name: "league-bus".to_string(),
            log_level: "info".to_string(),
            health_port: 8080,
            shutdown_timeout_seconds: 30,
            bind_patterns: vec!["#".to_string()],
            unmatched_policy: UnmatchedPolicy::default(),
        }
    }
}

impl Default for AmqpSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5672,
            username: "guest".to_string(),
            password: "guest".to_string(),
            vhost: "/".to_string(),
            exchange_name: EVENTS_EXCHANGE.to_string(),
            prefetch_count: DEFAULT_PREFETCH_COUNT,
            max_retries: 0,
            retry_delay_ms: 1000,
        }
    }
}

impl AmqpSettings {
    /// Replace connection details with the ones in an `amqp://` URL
    pub fn apply_url(&mut self, url: &str) -> Result<()> {
        let parsed = AmqpConfig::from_url(url)?;
        self.host = parsed.host;
        self.port = parsed.port;
        self.username = parsed.username;
        self.password = parsed.password;
        self.vhost = parsed.vhost;
        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| anyhow!("Invalid {} value: {}", name, value))
}

impl AppConfig {
    /// Load configuration from environment variables with fallback to defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        validate_config(&config)?;
        Ok(config)
    }

    /// Load configuration from a TOML file, then apply environment overrides
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config = Self::from_toml_str(&contents)?;
        config.apply_env()?;
        validate_config(&config)?;
        Ok(config)
    }

    /// Parse a TOML document; missing keys fall back to defaults
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents).context("Failed to parse TOML configuration")
    }

    fn apply_env(&mut self) -> Result<()> {
        // Service settings
        if let Ok(name) = env::var("SERVICE_NAME") {
            self.service.name = name;
        }
        if let Ok(log_level) = env::var("LOG_LEVEL") {
            self.service.log_level = log_level;
        }
        if let Ok(port) = env::var("HEALTH_PORT") {
            self.service.health_port = parse_var("HEALTH_PORT", &port)?;
        }
        if let Ok(timeout) = env::var("SHUTDOWN_TIMEOUT_SECONDS") {
            self.service.shutdown_timeout_seconds =
                parse_var("SHUTDOWN_TIMEOUT_SECONDS", &timeout)?;
        }
        if let Ok(patterns) = env::var("BIND_PATTERNS") {
            self.service.bind_patterns = patterns
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(String::from)
                .collect();
        }
        if let Ok(policy) = env::var("UNMATCHED_POLICY") {
            self.service.unmatched_policy = policy.parse().map_err(|e: String| anyhow!(e))?;
        }

        // AMQP settings; a full URL is applied first so individual vars win
        if let Ok(url) = env::var("AMQP_URL") {
            self.amqp.apply_url(&url)?;
        }
        if let Ok(host) = env::var("AMQP_HOST") {
            self.amqp.host = host;
        }
        if let Ok(port) = env::var("AMQP_PORT") {
            self.amqp.port = parse_var("AMQP_PORT", &port)?;
        }
        if let Ok(username) = env::var("AMQP_USERNAME") {
            self.amqp.username = username;
        }
        if let Ok(password) = env::var("AMQP_PASSWORD") {
            self.amqp.password = password;
        }
        if let Ok(vhost) = env::var("AMQP_VHOST") {
            self.amqp.vhost = vhost;
        }
        if let Ok(exchange) = env::var("AMQP_EXCHANGE_NAME") {
            self.amqp.exchange_name = exchange;
        }
        if let Ok(prefetch) = env::var("AMQP_PREFETCH_COUNT") {
            self.amqp.prefetch_count = parse_var("AMQP_PREFETCH_COUNT", &prefetch)?;
        }
        if let Ok(retries) = env::var("AMQP_MAX_RETRIES") {
            self.amqp.max_retries = parse_var("AMQP_MAX_RETRIES", &retries)?;
        }
        if let Ok(delay) = env::var("AMQP_RETRY_DELAY_MS") {
            self.amqp.retry_delay_ms = parse_var("AMQP_RETRY_DELAY_MS", &delay)?;
        }

        Ok(())
    }

    /// Connection-level configuration for `ConnectionManager`
    pub fn amqp_config(&self) -> AmqpConfig {
        AmqpConfig {
            host: self.amqp.host.clone(),
            port: self.amqp.port,
            username: self.amqp.username.clone(),
            password: self.amqp.password.clone(),
            vhost: self.amqp.vhost.clone(),
            exchange_name: self.amqp.exchange_name.clone(),
            prefetch_count: self.amqp.prefetch_count,
            max_retries: self.amqp.max_retries,
            retry_delay_ms: self.amqp.retry_delay_ms,
        }
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.service.shutdown_timeout_seconds)
    }

    /// Broker address without credentials, for logging
    pub fn amqp_endpoint(&self) -> String {
        format!(
            "amqp://{}:{}/{}",
            self.amqp.host,
            self.amqp.port,
            self.amqp.vhost.trim_start_matches('/')
        )
    }
}

/// Validate configuration values
pub fn validate_config(config: &AppConfig) -> Result<()> {
    // Validate log level
    match config.service.log_level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => {}
        _ => return Err(anyhow!("Invalid log level: {}", config.service.log_level)),
    }

    if config.service.name.is_empty() {
        return Err(anyhow!("Service name cannot be empty"));
    }
    if config.service.health_port == 0 {
        return Err(anyhow!("Health port cannot be 0"));
    }
    if config.service.shutdown_timeout_seconds == 0 {
        return Err(anyhow!("Shutdown timeout must be greater than 0"));
    }
    if config.service.bind_patterns.iter().any(|p| p.is_empty()) {
        return Err(anyhow!("Bind patterns cannot be empty strings"));
    }

    // Validate AMQP settings
    if config.amqp.host.is_empty() {
        return Err(anyhow!("AMQP host cannot be empty"));
    }
    if config.amqp.port == 0 {
        return Err(anyhow!("AMQP port cannot be 0"));
    }
    if config.amqp.exchange_name.is_empty() {
        return Err(anyhow!("AMQP exchange name cannot be empty"));
    }
    if config.amqp.prefetch_count == 0 {
        return Err(anyhow!("AMQP prefetch count must be greater than 0"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(validate_config(&config).is_ok());
        assert_eq!(config.amqp.host, "localhost");
        assert_eq!(config.amqp.port, 5672);
        assert_eq!(config.amqp.username, "guest");
        assert_eq!(config.amqp.password, "guest");
        assert_eq!(config.amqp.exchange_name, "events");
        assert_eq!(config.amqp.prefetch_count, 10);
        assert_eq!(config.service.bind_patterns, vec!["#"]);
    }

    #[test]
    fn test_toml_overrides_defaults() {
        let config = AppConfig::from_toml_str(
            r#"
            [service]
            name = "ranking"
            bind_patterns = ["match.*", "season.finished"]
            unmatched_policy = "ignore"

            [amqp]
            host = "rabbitmq"
            prefetch_count = 25
            "#,
        )
        .unwrap();

        assert_eq!(config.service.name, "ranking");
        assert_eq!(config.service.bind_patterns.len(), 2);
        assert_eq!(config.service.unmatched_policy, UnmatchedPolicy::Ignore);
        assert_eq!(config.service.health_port, 8080);
        assert_eq!(config.amqp.host, "rabbitmq");
        assert_eq!(config.amqp.prefetch_count, 25);
        assert_eq!(config.amqp.port, 5672);
    }

    #[test]
    fn test_invalid_toml_is_rejected() {
        assert!(AppConfig::from_toml_str("[amqp]\nport = \"many\"").is_err());
    }

    #[test]
    fn test_validation_failures() {
        let mut config = AppConfig::default();
        config.service.log_level = "verbose".to_string();
        assert!(validate_config(&config).is_err());

        let mut config = AppConfig::default();
        config.amqp.prefetch_count = 0;
        assert!(validate_config(&config).is_err());

        let mut config = AppConfig::default();
        config.service.bind_patterns = vec![String::new()];
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_amqp_config_conversion() {
        let mut config = AppConfig::default();
        config
            .amqp
            .apply_url("amqp://league:pw@broker:5673/%2f")
            .unwrap();

        let amqp = config.amqp_config();
        assert_eq!(amqp.host, "broker");
        assert_eq!(amqp.port, 5673);
        assert_eq!(amqp.username, "league");
        assert_eq!(amqp.vhost, "/");
        assert_eq!(amqp.exchange_name, "events");
        assert_eq!(config.amqp_endpoint(), "amqp://broker:5673/");
    }
}
