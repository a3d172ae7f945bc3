//! Host resource usage sampling: CPU, memory and network interface
//! utilization measured from OS counters.

pub mod counters;
pub mod sampler;
pub mod snapshot;

pub use counters::{CpuStat, HostCounters, LinuxHostCounters, MemoryInfo};
pub use sampler::{HostUsageHandle, HostUsageSampler};
pub use snapshot::{ResourceSnapshot, ResourceUsage};
