//! Immutable resource usage readings published by the sampler.

use serde::Serialize;

/// A single used/limit pair
///
/// `usage <= limit` is not enforced: counter noise between two cycles can
/// push a rate slightly above the link or CPU capacity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ResourceUsage {
    pub usage: f64,
    pub limit: f64,
}

impl ResourceUsage {
    pub fn new(usage: f64, limit: f64) -> Self {
        Self { usage, limit }
    }

    /// Usage as a percentage of the limit, zero when there is no limit
    pub fn percent_usage(&self) -> f64 {
        if self.limit > 0.0 {
            (self.usage / self.limit) * 100.0
        } else {
            0.0
        }
    }
}

/// Host resource usage for one sampling cycle
///
/// Units:
/// - `cpu`: 100 per available processor
/// - `memory`: megabytes
/// - `bandwidth_in` / `bandwidth_out`: kilobits per second, summed over all
///   physical interfaces
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ResourceSnapshot {
    pub cpu: ResourceUsage,
    pub memory: ResourceUsage,
    pub bandwidth_in: ResourceUsage,
    pub bandwidth_out: ResourceUsage,
}

impl ResourceSnapshot {
    /// Highest percentage usage across all tracked resources
    pub fn max_resource_usage(&self) -> f64 {
        [self.cpu, self.memory, self.bandwidth_in, self.bandwidth_out]
            .iter()
            .map(ResourceUsage::percent_usage)
            .fold(0.0, f64::max)
    }
}
