//! # Host Counter Sources
//!
//! Raw operating-system counters consumed by the sampler. The [`HostCounters`]
//! trait is the seam between the rate arithmetic and the OS, so the sampler can
//! be driven by a fake source in tests and by [`LinuxHostCounters`] in
//! production.
//!
//! ## Linux sources
//!
//! - `/proc/stat`, first line:
//!   ```text
//!   cpu  user   nice system idle    iowait irq softirq steal guest guest_nice
//!   cpu  317808 128  58637  2503692 7634   0   13472   0     0     0
//!   ```
//!   The sum of every field is the total number of cycles so far. Busy time is
//!   the total minus idle, so iowait, irq and steal count as busy.
//! - `/proc/meminfo`: `MemTotal` and `MemFree`, in kB.
//! - `/sys/class/net/<nic>/speed` (Mbit/s) and
//!   `/sys/class/net/<nic>/statistics/{tx,rx}_bytes`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Cumulative CPU cycle counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuStat {
    /// Sum of all per-mode counters
    pub total: u64,
    /// Total minus idle
    pub busy: u64,
}

/// Physical memory totals in kilobytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryInfo {
    pub total_kb: u64,
    pub free_kb: u64,
}

impl MemoryInfo {
    pub fn total_mb(&self) -> f64 {
        self.total_kb as f64 / 1024.0
    }

    pub fn used_mb(&self) -> f64 {
        self.total_kb.saturating_sub(self.free_kb) as f64 / 1024.0
    }
}

/// Source of raw host counters
///
/// Every method reports failure through `io::Result`; the sampler decides how
/// a failed read degrades.
pub trait HostCounters: Send + Sync {
    /// Names of the physical network interfaces
    fn list_nics(&self) -> io::Result<Vec<String>>;

    /// Configured link speed in Mbit/s
    fn nic_speed_mbps(&self, nic: &str) -> io::Result<f64>;

    /// Cumulative transmitted bytes
    fn nic_tx_bytes(&self, nic: &str) -> io::Result<u64>;

    /// Cumulative received bytes
    fn nic_rx_bytes(&self, nic: &str) -> io::Result<u64>;

    /// System-wide CPU counters
    fn cpu_stat(&self) -> io::Result<CpuStat>;

    /// Physical memory totals
    fn memory(&self) -> io::Result<MemoryInfo>;

    /// Number of processors available to this process
    fn available_processors(&self) -> usize {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }
}

/// Counter source reading procfs and sysfs
#[derive(Debug, Clone)]
pub struct LinuxHostCounters {
    proc_root: PathBuf,
    net_root: PathBuf,
}

impl Default for LinuxHostCounters {
    fn default() -> Self {
        Self::new("/proc", "/sys/class/net")
    }
}

impl LinuxHostCounters {
    /// Create a counter source rooted at the given procfs and net class directories
    pub fn new<P: Into<PathBuf>, N: Into<PathBuf>>(proc_root: P, net_root: N) -> Self {
        Self {
            proc_root: proc_root.into(),
            net_root: net_root.into(),
        }
    }

    /// A NIC is physical when its device link does not point under
    /// `/virtual/` and it reports a link speed. Wireless NICs don't report
    /// speed and are skipped.
    fn is_physical_nic(path: &Path) -> bool {
        let target = match fs::symlink_metadata(path) {
            Ok(meta) if meta.file_type().is_symlink() => match fs::read_link(path) {
                Ok(target) => target,
                Err(e) => {
                    warn!(nic = %path.display(), error = %e, "Failed to read link target for NIC");
                    return false;
                }
            },
            Ok(_) => path.to_path_buf(),
            Err(e) => {
                warn!(nic = %path.display(), error = %e, "Failed to stat NIC entry");
                return false;
            }
        };

        if target.to_string_lossy().contains("/virtual/") {
            return false;
        }

        read_trimmed(&path.join("speed"))
            .and_then(|raw| parse_number::<f64>(&raw))
            .is_ok()
    }

    fn nic_path(&self, nic: &str) -> PathBuf {
        self.net_root.join(nic)
    }
}

impl HostCounters for LinuxHostCounters {
    fn list_nics(&self) -> io::Result<Vec<String>> {
        let mut nics = Vec::new();
        for entry in fs::read_dir(&self.net_root)? {
            let entry = entry?;
            if Self::is_physical_nic(&entry.path()) {
                nics.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        nics.sort();
        debug!(?nics, "Enumerated physical NICs");
        Ok(nics)
    }

    fn nic_speed_mbps(&self, nic: &str) -> io::Result<f64> {
        parse_number(&read_trimmed(&self.nic_path(nic).join("speed"))?)
    }

    fn nic_tx_bytes(&self, nic: &str) -> io::Result<u64> {
        parse_number(&read_trimmed(&self.nic_path(nic).join("statistics/tx_bytes"))?)
    }

    fn nic_rx_bytes(&self, nic: &str) -> io::Result<u64> {
        parse_number(&read_trimmed(&self.nic_path(nic).join("statistics/rx_bytes"))?)
    }

    fn cpu_stat(&self) -> io::Result<CpuStat> {
        let content = fs::read_to_string(self.proc_root.join("stat"))?;
        let first_line = content
            .lines()
            .next()
            .ok_or_else(|| invalid_data("empty /proc/stat"))?;
        parse_cpu_line(first_line)
    }

    fn memory(&self) -> io::Result<MemoryInfo> {
        parse_meminfo(&fs::read_to_string(self.proc_root.join("meminfo"))?)
    }
}

/// Parse the aggregate `cpu` line of `/proc/stat`
pub fn parse_cpu_line(line: &str) -> io::Result<CpuStat> {
    let values = line
        .split_whitespace()
        .filter(|word| !word.contains("cpu"))
        .map(parse_number::<u64>)
        .collect::<io::Result<Vec<u64>>>()?;

    // user nice system idle ...
    let idle = *values
        .get(3)
        .ok_or_else(|| invalid_data(format!("too few fields in cpu line: {:?}", line)))?;
    let total = values.iter().fold(0u64, |acc, v| acc.saturating_add(*v));

    Ok(CpuStat {
        total,
        busy: total.saturating_sub(idle),
    })
}

/// Parse `MemTotal` and `MemFree` out of `/proc/meminfo`
pub fn parse_meminfo(content: &str) -> io::Result<MemoryInfo> {
    let mut total_kb = None;
    let mut free_kb = None;

    for line in content.lines() {
        let mut parts = line.split_whitespace();
        let slot = match parts.next() {
            Some("MemTotal:") => &mut total_kb,
            Some("MemFree:") => &mut free_kb,
            _ => continue,
        };
        if let Some(value) = parts.next() {
            *slot = Some(parse_number::<u64>(value)?);
        }
    }

    match (total_kb, free_kb) {
        (Some(total_kb), Some(free_kb)) => Ok(MemoryInfo { total_kb, free_kb }),
        _ => Err(invalid_data("MemTotal or MemFree missing from meminfo")),
    }
}

fn read_trimmed(path: &Path) -> io::Result<String> {
    Ok(fs::read_to_string(path)?.trim().to_string())
}

fn parse_number<T>(raw: &str) -> io::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse::<T>()
        .map_err(|e| invalid_data(format!("invalid counter value {:?}: {}", raw, e)))
}

fn invalid_data<S: Into<String>>(message: S) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message.into())
}
