//! # Metrics
//!
//! Prometheus exporter setup and the metrics emitted by the sampler and the
//! redirect path. Until a recorder is installed every macro call is a no-op,
//! which keeps unit tests free of global state.

use metrics::{counter, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::core::error::{DiscoveryError, DiscoveryResult};
use crate::host_usage::ResourceSnapshot;

/// Install the global Prometheus recorder
///
/// Can only succeed once per process.
pub fn install_prometheus_recorder() -> DiscoveryResult<PrometheusHandle> {
    PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| DiscoveryError::internal(format!("Failed to install Prometheus recorder: {}", e)))
}

/// Publish a sampled snapshot as gauges
pub fn record_host_usage(snapshot: &ResourceSnapshot) {
    gauge!("host_cpu_usage").set(snapshot.cpu.usage);
    gauge!("host_cpu_limit").set(snapshot.cpu.limit);
    gauge!("host_memory_usage_mb").set(snapshot.memory.usage);
    gauge!("host_memory_limit_mb").set(snapshot.memory.limit);
    gauge!("host_bandwidth_in_kbps").set(snapshot.bandwidth_in.usage);
    gauge!("host_bandwidth_out_kbps").set(snapshot.bandwidth_out.usage);
    gauge!("host_bandwidth_limit_kbps").set(snapshot.bandwidth_in.limit);
    gauge!("host_max_resource_usage_percent").set(snapshot.max_resource_usage());
}

/// Count a successful redirect
pub fn record_redirect(instance_id: &str) {
    counter!("discovery_redirects_total", "instance" => instance_id.to_string()).increment(1);
}

/// Count a failed redirect by error type
pub fn record_redirect_failure(error: &DiscoveryError) {
    counter!("discovery_redirect_failures_total", "reason" => error.error_type()).increment(1);
}
