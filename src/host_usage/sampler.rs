//! # Host Usage Sampler
//!
//! Turns two successive readings of cumulative OS counters into utilization
//! rates and publishes them as an immutable [`ResourceSnapshot`].
//!
//! ## Concurrency
//!
//! - The sampler owns its previous-cycle counters outright. It is moved into a
//!   single tokio task and each cycle runs on the blocking pool, so cycles
//!   never overlap and the counter state needs no lock.
//! - The published snapshot lives in an `ArcSwap` inside [`HostUsageHandle`].
//!   Readers get an `Arc` to a complete snapshot without taking a lock, and a
//!   cycle never waits on a reader.
//!
//! ## Limitations
//!
//! Counter deltas use saturating `u64` subtraction: a counter that goes
//! backwards (NIC reset, 64-bit wraparound on a very long-lived host) yields
//! a zero rate for that cycle rather than a corrected one. A counter path that
//! becomes permanently unreadable contributes zero every cycle; it is logged
//! each time but otherwise understates usage.

use arc_swap::ArcSwap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::core::config::HostUsageConfig;
use crate::host_usage::counters::{CpuStat, HostCounters, LinuxHostCounters};
use crate::host_usage::snapshot::{ResourceSnapshot, ResourceUsage};
use crate::observability::metrics;

/// Read side of the sampler
///
/// Cheap to clone behind an `Arc` and safe to read from any number of tasks.
#[derive(Debug, Default)]
pub struct HostUsageHandle {
    snapshot: ArcSwap<ResourceSnapshot>,
}

impl HostUsageHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Most recently published snapshot; zeroed until the first cycle completes
    pub fn current_usage(&self) -> Arc<ResourceSnapshot> {
        self.snapshot.load_full()
    }

    fn publish(&self, snapshot: ResourceSnapshot) {
        self.snapshot.store(Arc::new(snapshot));
    }
}

/// Previous cycle's cumulative counters
#[derive(Debug, Default, Clone, Copy)]
struct CounterState {
    /// `None` until the first cycle has run
    last_collection_ms: Option<i64>,
    last_tx_bytes: u64,
    last_rx_bytes: u64,
    last_cpu: Option<CpuStat>,
}

/// Aggregated counters over all physical NICs for one cycle
#[derive(Debug, Default, Clone, Copy)]
struct NicTotals {
    speed_mbps: f64,
    tx_bytes: u64,
    rx_bytes: u64,
}

/// Periodic host resource usage sampler
pub struct HostUsageSampler {
    counters: Arc<dyn HostCounters>,
    cpu_limit: f64,
    state: CounterState,
    handle: Arc<HostUsageHandle>,
}

impl HostUsageSampler {
    /// Create a sampler over the given counter source
    ///
    /// CPU capacity is fixed here at 100 per available processor.
    pub fn new(counters: Arc<dyn HostCounters>) -> Self {
        let cpu_limit = 100.0 * counters.available_processors() as f64;
        Self {
            counters,
            cpu_limit,
            state: CounterState::default(),
            handle: Arc::new(HostUsageHandle::new()),
        }
    }

    /// Create a sampler reading procfs/sysfs at the configured roots
    pub fn linux(config: &HostUsageConfig) -> Self {
        Self::new(Arc::new(LinuxHostCounters::new(
            config.proc_root.clone(),
            config.net_root.clone(),
        )))
    }

    /// Handle for reading published snapshots
    pub fn handle(&self) -> Arc<HostUsageHandle> {
        self.handle.clone()
    }

    pub fn cpu_limit(&self) -> f64 {
        self.cpu_limit
    }

    /// Run one sampling cycle stamped with the current wall-clock time
    pub fn run_cycle(&mut self) -> ResourceSnapshot {
        self.run_cycle_at(chrono::Utc::now().timestamp_millis())
    }

    /// Run one sampling cycle stamped with `now_ms` (milliseconds since epoch)
    ///
    /// Always publishes a snapshot. Individual read failures are logged and
    /// replaced by zero, or for CPU by the previous figure.
    pub fn run_cycle_at(&mut self, now_ms: i64) -> ResourceSnapshot {
        let nics = self.counters.list_nics().unwrap_or_else(|e| {
            error!(error = %e, "Failed to find NICs");
            Vec::new()
        });
        let nics = self.read_nic_totals(&nics);
        let nic_limit = nics.speed_mbps * 1024.0;
        let cpu = match self.counters.cpu_stat() {
            Ok(stat) => Some(stat),
            Err(e) => {
                error!(error = %e, "Failed to read CPU usage");
                None
            }
        };
        let memory = self.read_memory();

        let snapshot = match self.state.last_collection_ms {
            None => ResourceSnapshot {
                cpu: ResourceUsage::new(0.0, self.cpu_limit),
                memory,
                bandwidth_in: ResourceUsage::new(0.0, nic_limit),
                bandwidth_out: ResourceUsage::new(0.0, nic_limit),
            },
            Some(last_ms) => {
                let elapsed_secs = (now_ms - last_ms) as f64 / 1000.0;
                let tx_rate = kilobits_per_second(self.state.last_tx_bytes, nics.tx_bytes, elapsed_secs);
                let rx_rate = kilobits_per_second(self.state.last_rx_bytes, nics.rx_bytes, elapsed_secs);

                // Two CPU samples are needed for a rate; otherwise keep the last figure.
                let cpu_usage = match (self.state.last_cpu, cpu) {
                    (Some(previous), Some(current)) => ResourceUsage::new(
                        cpu_usage(previous, current, self.cpu_limit),
                        self.cpu_limit,
                    ),
                    _ => self.handle.current_usage().cpu,
                };

                ResourceSnapshot {
                    cpu: cpu_usage,
                    memory,
                    bandwidth_in: ResourceUsage::new(rx_rate, nic_limit),
                    bandwidth_out: ResourceUsage::new(tx_rate, nic_limit),
                }
            }
        };

        self.state = CounterState {
            last_collection_ms: Some(now_ms),
            last_tx_bytes: nics.tx_bytes,
            last_rx_bytes: nics.rx_bytes,
            last_cpu: cpu,
        };
        self.handle.publish(snapshot);
        metrics::record_host_usage(&snapshot);

        debug!(
            cpu = snapshot.cpu.usage,
            memory_mb = snapshot.memory.usage,
            bandwidth_in_kbps = snapshot.bandwidth_in.usage,
            bandwidth_out_kbps = snapshot.bandwidth_out.usage,
            max_usage_percent = snapshot.max_resource_usage(),
            "Host usage sampled"
        );

        snapshot
    }

    fn read_nic_totals(&self, nics: &[String]) -> NicTotals {
        let mut totals = NicTotals::default();
        for nic in nics {
            match self.counters.nic_speed_mbps(nic) {
                // Kernel reports -1 while the link is down
                Ok(speed) => totals.speed_mbps += speed.max(0.0),
                Err(e) => warn!(nic = %nic, error = %e, "Failed to read speed for NIC"),
            }
            match self.counters.nic_tx_bytes(nic) {
                Ok(bytes) => totals.tx_bytes = totals.tx_bytes.saturating_add(bytes),
                Err(e) => warn!(nic = %nic, error = %e, "Failed to read tx_bytes for NIC"),
            }
            match self.counters.nic_rx_bytes(nic) {
                Ok(bytes) => totals.rx_bytes = totals.rx_bytes.saturating_add(bytes),
                Err(e) => warn!(nic = %nic, error = %e, "Failed to read rx_bytes for NIC"),
            }
        }
        totals
    }

    fn read_memory(&self) -> ResourceUsage {
        match self.counters.memory() {
            Ok(info) => ResourceUsage::new(info.used_mb(), info.total_mb()),
            Err(e) => {
                error!(error = %e, "Failed to read memory usage");
                ResourceUsage::default()
            }
        }
    }

    /// Move the sampler into a background task sampling every `interval`
    ///
    /// The first cycle runs immediately. Cycles run one at a time on the
    /// blocking pool; a cycle slower than `slow_cycle_warning` is logged.
    /// Abort the returned handle to stop sampling.
    pub fn spawn(self, interval: Duration, slow_cycle_warning: Duration) -> JoinHandle<()> {
        info!(interval = ?interval, cpu_limit = self.cpu_limit, "Starting host usage sampler");

        tokio::spawn(async move {
            let mut sampler = self;
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                let started = Instant::now();

                sampler = match tokio::task::spawn_blocking(move || {
                    sampler.run_cycle();
                    sampler
                })
                .await
                {
                    Ok(sampler) => sampler,
                    Err(e) => {
                        error!(error = %e, "Host usage sampling cycle failed, sampler stopped");
                        return;
                    }
                };

                let took = started.elapsed();
                if took > slow_cycle_warning {
                    warn!(took = ?took, threshold = ?slow_cycle_warning, "Slow host usage sampling cycle");
                }
            }
        })
    }
}

/// Rate in kbit/s for a cumulative byte counter over `elapsed_secs`
///
/// Zero when no time has elapsed or the counter did not advance.
pub fn kilobits_per_second(previous_bytes: u64, current_bytes: u64, elapsed_secs: f64) -> f64 {
    if elapsed_secs <= 0.0 {
        return 0.0;
    }
    let delta = current_bytes.saturating_sub(previous_bytes);
    delta as f64 * 8.0 / 1024.0 / elapsed_secs
}

/// Busy fraction between two CPU samples scaled to `cpu_limit`
pub fn cpu_usage(previous: CpuStat, current: CpuStat, cpu_limit: f64) -> f64 {
    let total_delta = current.total.saturating_sub(previous.total);
    if total_delta == 0 {
        return 0.0;
    }
    let busy_delta = current.busy.saturating_sub(previous.busy);
    (busy_delta as f64 / total_delta as f64) * cpu_limit
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host_usage::counters::MemoryInfo;
    use std::collections::HashMap;
    use std::io;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeState {
        nics: HashMap<String, (f64, u64, u64)>,
        cpu: Option<CpuStat>,
        memory: Option<MemoryInfo>,
        fail_enumeration: bool,
    }

    #[derive(Default)]
    struct FakeCounters {
        state: Mutex<FakeState>,
    }

    impl FakeCounters {
        fn set_nic(&self, name: &str, speed: f64, tx: u64, rx: u64) {
            self.state.lock().unwrap().nics.insert(name.to_string(), (speed, tx, rx));
        }

        fn set_cpu(&self, cpu: Option<CpuStat>) {
            self.state.lock().unwrap().cpu = cpu;
        }

        fn set_memory(&self, total_kb: u64, free_kb: u64) {
            self.state.lock().unwrap().memory = Some(MemoryInfo { total_kb, free_kb });
        }

        fn nic(&self, nic: &str) -> io::Result<(f64, u64, u64)> {
            self.state.lock().unwrap().nics.get(nic).copied()
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, nic.to_string()))
        }
    }

    impl HostCounters for FakeCounters {
        fn list_nics(&self) -> io::Result<Vec<String>> {
            let state = self.state.lock().unwrap();
            if state.fail_enumeration {
                return Err(io::Error::new(io::ErrorKind::PermissionDenied, "denied"));
            }
            let mut nics: Vec<String> = state.nics.keys().cloned().collect();
            nics.sort();
            Ok(nics)
        }

        fn nic_speed_mbps(&self, nic: &str) -> io::Result<f64> {
            self.nic(nic).map(|(speed, _, _)| speed)
        }

        fn nic_tx_bytes(&self, nic: &str) -> io::Result<u64> {
            self.nic(nic).map(|(_, tx, _)| tx)
        }

        fn nic_rx_bytes(&self, nic: &str) -> io::Result<u64> {
            self.nic(nic).map(|(_, _, rx)| rx)
        }

        fn cpu_stat(&self) -> io::Result<CpuStat> {
            self.state.lock().unwrap().cpu
                .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "no cpu line"))
        }

        fn memory(&self) -> io::Result<MemoryInfo> {
            self.state.lock().unwrap().memory
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no meminfo"))
        }

        fn available_processors(&self) -> usize {
            4
        }
    }

    fn sampler() -> (Arc<FakeCounters>, HostUsageSampler) {
        let counters = Arc::new(FakeCounters::default());
        let sampler = HostUsageSampler::new(counters.clone());
        (counters, sampler)
    }

    #[test]
    fn test_rate_formula() {
        assert_eq!(kilobits_per_second(0, 125_000, 1.0), 976.5625);
        assert_eq!(kilobits_per_second(1_000, 1_000 + 1024 * 60, 60.0), 8.0);
        assert_eq!(kilobits_per_second(0, 125_000, 0.0), 0.0);
        assert_eq!(kilobits_per_second(500, 100, 1.0), 0.0);
    }

    #[test]
    fn test_cpu_usage_formula() {
        let previous = CpuStat { total: 1_000, busy: 200 };
        let current = CpuStat { total: 2_000, busy: 700 };
        assert_eq!(cpu_usage(previous, current, 400.0), 200.0);
        assert_eq!(cpu_usage(previous, previous, 400.0), 0.0);
    }

    #[test]
    fn test_initial_snapshot_is_zeroed() {
        let (_, sampler) = sampler();
        assert_eq!(*sampler.handle().current_usage(), ResourceSnapshot::default());
        assert_eq!(sampler.cpu_limit(), 400.0);
    }

    #[test]
    fn test_first_cycle_reports_zero_rates() {
        let (counters, mut sampler) = sampler();
        counters.set_nic("eth0", 1000.0, 9_999_999, 8_888_888);
        counters.set_cpu(Some(CpuStat { total: 50_000, busy: 40_000 }));
        counters.set_memory(8 * 1024 * 1024, 2 * 1024 * 1024);

        let snapshot = sampler.run_cycle_at(1_000);

        assert_eq!(snapshot.cpu, ResourceUsage::new(0.0, 400.0));
        assert_eq!(snapshot.bandwidth_in, ResourceUsage::new(0.0, 1_024_000.0));
        assert_eq!(snapshot.bandwidth_out, ResourceUsage::new(0.0, 1_024_000.0));
        assert_eq!(snapshot.memory, ResourceUsage::new(6_144.0, 8_192.0));
        assert_eq!(*sampler.handle().current_usage(), snapshot);
    }

    #[test]
    fn test_second_cycle_computes_rates() {
        let (counters, mut sampler) = sampler();
        counters.set_nic("eth0", 1000.0, 0, 0);
        counters.set_cpu(Some(CpuStat { total: 1_000, busy: 100 }));
        sampler.run_cycle_at(10_000);

        counters.set_nic("eth0", 1000.0, 125_000, 250_000);
        counters.set_cpu(Some(CpuStat { total: 2_000, busy: 600 }));
        let snapshot = sampler.run_cycle_at(11_000);

        assert_eq!(snapshot.bandwidth_out.usage, 976.5625);
        assert_eq!(snapshot.bandwidth_in.usage, 1953.125);
        assert_eq!(snapshot.bandwidth_out.limit, 1_024_000.0);
        assert_eq!(snapshot.cpu, ResourceUsage::new(200.0, 400.0));
    }

    #[test]
    fn test_rates_sum_across_nics() {
        let (counters, mut sampler) = sampler();
        counters.set_nic("eth0", 1000.0, 0, 0);
        counters.set_nic("eth1", 10_000.0, 0, 0);
        sampler.run_cycle_at(1_000);

        counters.set_nic("eth0", 1000.0, 1024, 0);
        counters.set_nic("eth1", 10_000.0, 1024, 0);
        let snapshot = sampler.run_cycle_at(3_000);

        assert_eq!(snapshot.bandwidth_out.limit, 11_000.0 * 1024.0);
        assert_eq!(snapshot.bandwidth_out.usage, 8.0);
    }

    #[test]
    fn test_missing_cpu_sample_keeps_previous_cpu() {
        let (counters, mut sampler) = sampler();
        counters.set_nic("eth0", 1000.0, 0, 0);
        counters.set_memory(4096, 1024);
        counters.set_cpu(Some(CpuStat { total: 1_000, busy: 100 }));
        sampler.run_cycle_at(1_000);

        counters.set_cpu(Some(CpuStat { total: 2_000, busy: 350 }));
        let known = sampler.run_cycle_at(2_000);
        assert_eq!(known.cpu.usage, 100.0);

        // Current sample unavailable
        counters.set_cpu(None);
        counters.set_nic("eth0", 1000.0, 1024, 0);
        counters.set_memory(4096, 2048);
        let snapshot = sampler.run_cycle_at(3_000);
        assert_eq!(snapshot.cpu, known.cpu);
        assert_eq!(snapshot.bandwidth_out.usage, 8.0);
        assert_eq!(snapshot.memory.usage, 2.0);

        // Previous sample unavailable
        counters.set_cpu(Some(CpuStat { total: 9_000, busy: 9_000 }));
        let snapshot = sampler.run_cycle_at(4_000);
        assert_eq!(snapshot.cpu, known.cpu);
        assert_eq!(snapshot.bandwidth_out.usage, 0.0);

        // Both available again
        counters.set_cpu(Some(CpuStat { total: 10_000, busy: 9_500 }));
        let snapshot = sampler.run_cycle_at(5_000);
        assert_eq!(snapshot.cpu.usage, 200.0);
    }

    #[test]
    fn test_zero_elapsed_yields_zero_rate() {
        let (counters, mut sampler) = sampler();
        counters.set_nic("eth0", 1000.0, 0, 0);
        sampler.run_cycle_at(5_000);

        counters.set_nic("eth0", 1000.0, 1_000_000, 1_000_000);
        let snapshot = sampler.run_cycle_at(5_000);
        assert_eq!(snapshot.bandwidth_in.usage, 0.0);
        assert_eq!(snapshot.bandwidth_out.usage, 0.0);
    }

    #[test]
    fn test_read_failures_degrade_to_zero() {
        let (counters, mut sampler) = sampler();
        counters.state.lock().unwrap().fail_enumeration = true;

        let snapshot = sampler.run_cycle_at(1_000);
        assert_eq!(snapshot.bandwidth_in, ResourceUsage::default());
        assert_eq!(snapshot.memory, ResourceUsage::default());
        assert_eq!(snapshot.cpu, ResourceUsage::new(0.0, 400.0));

        let snapshot = sampler.run_cycle_at(2_000);
        assert_eq!(snapshot.cpu, ResourceUsage::new(0.0, 400.0));
    }

    #[test]
    fn test_link_down_speed_contributes_no_capacity() {
        let (counters, mut sampler) = sampler();
        counters.set_nic("eth0", 1000.0, 0, 0);
        counters.set_nic("eth1", -1.0, 0, 0);
        let snapshot = sampler.run_cycle_at(1_000);
        assert_eq!(snapshot.bandwidth_in.limit, 1_024_000.0);
    }

    #[tokio::test]
    async fn test_spawned_sampler_publishes_immediately() {
        let (counters, sampler) = sampler();
        counters.set_memory(2048, 1024);
        let handle = sampler.handle();

        let task = sampler.spawn(Duration::from_secs(3600), Duration::from_secs(10));
        for _ in 0..100 {
            if handle.current_usage().memory.limit > 0.0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        task.abort();

        assert_eq!(handle.current_usage().memory, ResourceUsage::new(1.0, 2.0));
    }
}
