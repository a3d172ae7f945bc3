//! # Broker Discovery - Main Entry Point
//!
//! Loads configuration, starts the host usage sampler, seeds the instance
//! registry and serves the redirect and admin listeners until SIGINT/SIGTERM.

use anyhow::Context;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

use broker_discovery::core::config::{ServiceConfig, CONFIG_PATH_ENV, DEFAULT_CONFIG_PATH};
use broker_discovery::observability::{init_logging, metrics};
use broker_discovery::{DiscoveryServer, HostUsageSampler, RoundRobinRouter, StaticRegistry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let config = ServiceConfig::load_or_default(&config_path)
        .await
        .with_context(|| format!("loading configuration from {}", config_path))?;

    init_logging(&config.logging)?;

    info!("🚀 Starting broker discovery service");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!(config_path = %config_path, "📋 Configuration loaded");

    let prometheus = if config.metrics.prometheus_enabled {
        Some(metrics::install_prometheus_recorder()?)
    } else {
        None
    };

    let registry = Arc::new(StaticRegistry::with_instances(config.instances.clone()));
    if registry.is_empty() {
        warn!("⚠️  No broker instances configured, every request will get 503");
    }
    let router = Arc::new(RoundRobinRouter::new(registry));

    let (host_usage, sampler_task) = if config.host_usage.enabled {
        let sampler = HostUsageSampler::linux(&config.host_usage);
        let handle = sampler.handle();
        let task = sampler.spawn(config.host_usage.check_interval, config.host_usage.slow_cycle_warning);
        (Some(handle), Some(task))
    } else {
        info!("Host usage sampling disabled");
        (None, None)
    };

    let server = DiscoveryServer::new(&config.server, router, host_usage, prometheus)?;
    info!("🌐 Discovery redirects on {}", server.bind_addr());
    info!("⚙️  Admin interface on {}", server.admin_bind_addr());

    let result = tokio::select! {
        result = server.start() => result.context("server terminated"),
        result = shutdown_signal() => {
            info!("🛑 Shutdown signal received");
            result
        }
    };

    if let Some(task) = sampler_task {
        task.abort();
    }

    match &result {
        Ok(()) => info!("✅ Broker discovery shutdown complete"),
        Err(e) => error!("🚨 Broker discovery stopped with error: {:#}", e),
    }
    result
}

/// Wait for SIGINT or SIGTERM
async fn shutdown_signal() -> anyhow::Result<()> {
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
        .context("installing SIGTERM handler")?;

    tokio::select! {
        result = signal::ctrl_c() => result.context("listening for SIGINT")?,
        _ = sigterm.recv() => {}
    }
    Ok(())
}
