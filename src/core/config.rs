//! # Configuration Module
//!
//! Configuration structures and loading for the discovery service.
//!
//! ## Key Features
//! - YAML configuration parsing with serde
//! - Environment variable override support (`DISCOVERY_*`)
//! - Human readable durations (`1m`, `30s`) via `humantime_serde`
//! - Validation with detailed error messages

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::error::{DiscoveryError, DiscoveryResult};
use crate::core::types::InstanceEndpoint;

/// Environment variable holding the configuration file path
pub const CONFIG_PATH_ENV: &str = "DISCOVERY_CONFIG_PATH";

/// Configuration file used when `DISCOVERY_CONFIG_PATH` is not set
pub const DEFAULT_CONFIG_PATH: &str = "config/discovery.yaml";

/// Main service configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Listener configuration for the redirect and admin servers
    pub server: ServerConfig,

    /// Host resource usage sampling
    pub host_usage: HostUsageConfig,

    /// Log output configuration
    pub logging: LoggingConfig,

    /// Metrics exporter configuration
    pub metrics: MetricsConfig,

    /// Broker instances used to seed the registry
    pub instances: Vec<InstanceEndpoint>,
}

impl ServiceConfig {
    /// Load configuration from a YAML file
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> DiscoveryResult<Self> {
        let content = tokio::fs::read_to_string(path).await?;

        let mut config = Self::from_yaml(&content)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load the configuration file if it exists, otherwise start from defaults
    ///
    /// Environment overrides and validation apply in both cases.
    pub async fn load_or_default<P: AsRef<Path>>(path: P) -> DiscoveryResult<Self> {
        let path = path.as_ref();
        if tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Self::load_from_file(path).await;
        }

        tracing::info!(path = %path.display(), "Configuration file not found, using defaults");
        let mut config = Self::default();
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a YAML string without overrides or validation
    pub fn from_yaml(content: &str) -> DiscoveryResult<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Apply environment variable overrides to configuration
    ///
    /// Environment variables follow the pattern: DISCOVERY_<FIELD>
    /// For example: DISCOVERY_WEB_SERVICE_PORT=8080
    pub fn apply_env_overrides(&mut self) -> DiscoveryResult<()> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> DiscoveryResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(addr) = lookup("DISCOVERY_BIND_ADDRESS") {
            self.server.bind_address = addr;
        }

        if let Some(port) = lookup("DISCOVERY_WEB_SERVICE_PORT") {
            self.server.web_service_port = port.parse()
                .map_err(|e| DiscoveryError::config(format!("Invalid DISCOVERY_WEB_SERVICE_PORT: {}", e)))?;
        }

        if let Some(port) = lookup("DISCOVERY_ADMIN_PORT") {
            self.server.admin_port = port.parse()
                .map_err(|e| DiscoveryError::config(format!("Invalid DISCOVERY_ADMIN_PORT: {}", e)))?;
        }

        if let Some(interval) = lookup("DISCOVERY_HOST_USAGE_INTERVAL") {
            self.host_usage.check_interval = humantime::parse_duration(&interval)
                .map_err(|e| DiscoveryError::config(format!("Invalid DISCOVERY_HOST_USAGE_INTERVAL: {}", e)))?;
        }

        if let Some(level) = lookup("DISCOVERY_LOG_LEVEL") {
            self.logging.level = level;
        }

        if let Some(format) = lookup("DISCOVERY_LOG_FORMAT") {
            self.logging.format = format;
        }

        Ok(())
    }

    /// Configuration validation with detailed error messages
    pub fn validate(&self) -> DiscoveryResult<()> {
        let mut errors = Vec::new();

        if self.server.bind_address.is_empty() {
            errors.push("bind_address cannot be empty".to_string());
        }

        if self.server.web_service_port == 0 {
            errors.push("web_service_port must be greater than 0".to_string());
        }

        if self.server.admin_port == 0 {
            errors.push("admin_port must be greater than 0".to_string());
        }

        if self.server.web_service_port == self.server.admin_port {
            errors.push(format!(
                "web_service_port and admin_port must differ (both {})",
                self.server.admin_port
            ));
        }

        if self.host_usage.enabled && self.host_usage.check_interval.is_zero() {
            errors.push("host_usage.check_interval must be greater than 0".to_string());
        }

        match self.logging.format.as_str() {
            "json" | "pretty" => {}
            other => errors.push(format!("Unknown log format: {}", other)),
        }

        for (index, instance) in self.instances.iter().enumerate() {
            if instance.id.is_empty() {
                errors.push(format!("Instance {} has empty id", index));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(DiscoveryError::config(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

/// Listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address both listeners bind to
    pub bind_address: String,

    /// Port serving the redirect surface
    pub web_service_port: u16,

    /// Port serving health, usage and metrics endpoints
    pub admin_port: u16,

    /// Treat every inbound request as encrypted (TLS terminated in front of us)
    ///
    /// Applies to the whole redirect listener. Deployments that front the same
    /// port with both plain and TLS traffic leave this off and rely on
    /// `X-Forwarded-Proto` instead.
    pub tls_fronted: bool,

    /// Status code used for redirects
    pub redirect_status: RedirectStatus,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            web_service_port: 8080,
            admin_port: 8081,
            tls_fronted: false,
            redirect_status: RedirectStatus::Temporary,
        }
    }
}

/// Redirect flavour sent to clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RedirectStatus {
    /// `307 Temporary Redirect`, method and body are preserved
    Temporary,
    /// `302 Found`
    Found,
}

impl RedirectStatus {
    pub fn status_code(self) -> StatusCode {
        match self {
            Self::Temporary => StatusCode::TEMPORARY_REDIRECT,
            Self::Found => StatusCode::FOUND,
        }
    }
}

/// Host resource usage sampling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HostUsageConfig {
    /// Run the sampler at all
    pub enabled: bool,

    /// Interval between sampling cycles
    #[serde(with = "humantime_serde")]
    pub check_interval: Duration,

    /// Cycles taking longer than this are logged
    #[serde(with = "humantime_serde")]
    pub slow_cycle_warning: Duration,

    /// Root of the proc filesystem
    pub proc_root: PathBuf,

    /// Directory listing network interfaces
    pub net_root: PathBuf,
}

impl Default for HostUsageConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            check_interval: Duration::from_secs(60),
            slow_cycle_warning: Duration::from_secs(10),
            proc_root: PathBuf::from("/proc"),
            net_root: PathBuf::from("/sys/class/net"),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG`
    pub level: String,

    /// Output format: `json` or `pretty`
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "json".to_string(),
        }
    }
}

/// Metrics exporter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Install the Prometheus recorder and expose `/metrics` on the admin port
    pub prometheus_enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            prometheus_enabled: true,
        }
    }
}
