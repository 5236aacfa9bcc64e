//! Concrete record types: system/process CPU, memory, disk, network
//! and pressure measurements.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{round3, Arithmetic, Record};

fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Process identity: `(pid, name, command, start_time)`. Two values
/// are equal iff all four components match, so the same pid reused
/// with a different start time is a distinct key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Process {
    pub pid: u32,
    pub name: String,
    pub command: String,
    pub start_time: String,
}

impl Record for Process {}

/// Basic memory figures, kibibytes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Memory {
    pub total: u64,
    pub used: u64,
    pub free: u64,
}

/// Memory figures with the extra accounting Linux's `/proc/meminfo`
/// provides.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ExtendedMemory {
    pub total: u64,
    pub used: u64,
    pub free: u64,
    pub shared: u64,
    pub buff_cache: u64,
    pub available: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum MemoryKind {
    Extended(ExtendedMemory),
    Basic(Memory),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SystemMemory {
    pub mem: MemoryKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub swap: Option<Memory>,
    pub timestamp: DateTime<Utc>,
}

impl Record for SystemMemory {}

impl SystemMemory {
    pub fn new(mem: MemoryKind, swap: Option<Memory>) -> Self {
        Self {
            mem,
            swap,
            timestamp: now(),
        }
    }
}

/// Per-mode CPU tick breakdown; fields sum to ~100.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ModeUsage {
    pub user: f64,
    pub nice: f64,
    pub system: f64,
    pub idle: f64,
    pub iowait: f64,
    pub irq: f64,
    pub softirq: f64,
    pub steal: f64,
    pub guest: f64,
    pub guest_nice: f64,
}

impl ModeUsage {
    pub fn zero() -> Self {
        Self {
            user: 0.0,
            nice: 0.0,
            system: 0.0,
            idle: 100.0,
            iowait: 0.0,
            irq: 0.0,
            softirq: 0.0,
            steal: 0.0,
            guest: 0.0,
            guest_nice: 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CpuUsage {
    pub load: f64,
    pub cores: HashMap<String, f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode_usage: Option<ModeUsage>,
    pub timestamp: DateTime<Utc>,
}

impl Record for CpuUsage {}

impl CpuUsage {
    pub fn new(load: f64, cores: HashMap<String, f64>, mode_usage: Option<ModeUsage>) -> Self {
        Self {
            load: round3(load),
            cores: cores.into_iter().map(|(k, v)| (k, round3(v))).collect(),
            mode_usage: mode_usage.map(|m| ModeUsage {
                user: round3(m.user),
                nice: round3(m.nice),
                system: round3(m.system),
                idle: round3(m.idle),
                iowait: round3(m.iowait),
                irq: round3(m.irq),
                softirq: round3(m.softirq),
                steal: round3(m.steal),
                guest: round3(m.guest),
                guest_nice: round3(m.guest_nice),
            }),
            timestamp: now(),
        }
    }
}

pub type QnxCpuUsageInfo = CpuUsage;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CpuSample {
    pub cpu_load: f64,
    pub timestamp: DateTime<Utc>,
}

impl Record for CpuSample {}

impl Arithmetic for CpuSample {
    fn add(&self, other: &Self) -> Self {
        Self {
            cpu_load: self.cpu_load + other.cpu_load,
            timestamp: self.timestamp.max(other.timestamp),
        }
    }
    fn div_scalar(&self, scalar: f64) -> Self {
        Self {
            cpu_load: round3(self.cpu_load / scalar),
            timestamp: self.timestamp,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct MemorySample {
    pub mem_usage: f64,
    pub timestamp: DateTime<Utc>,
}

impl Record for MemorySample {}

impl Arithmetic for MemorySample {
    fn add(&self, other: &Self) -> Self {
        Self {
            mem_usage: self.mem_usage + other.mem_usage,
            timestamp: self.timestamp.max(other.timestamp),
        }
    }
    fn div_scalar(&self, scalar: f64) -> Self {
        Self {
            mem_usage: round3(self.mem_usage / scalar),
            timestamp: self.timestamp,
        }
    }
}

/// Joint CPU+memory sample, Linux-only.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ResourceSample {
    pub cpu_load: f64,
    pub mem_usage: f64,
    pub timestamp: DateTime<Utc>,
}

impl Record for ResourceSample {}

impl ResourceSample {
    pub fn cpu_projection(&self) -> CpuSample {
        CpuSample {
            cpu_load: self.cpu_load,
            timestamp: self.timestamp,
        }
    }
    pub fn mem_projection(&self) -> MemorySample {
        MemorySample {
            mem_usage: self.mem_usage,
            timestamp: self.timestamp,
        }
    }
}

impl Arithmetic for ResourceSample {
    fn add(&self, other: &Self) -> Self {
        Self {
            cpu_load: self.cpu_load + other.cpu_load,
            mem_usage: self.mem_usage + other.mem_usage,
            timestamp: self.timestamp.max(other.timestamp),
        }
    }
    fn div_scalar(&self, scalar: f64) -> Self {
        Self {
            cpu_load: round3(self.cpu_load / scalar),
            mem_usage: round3(self.mem_usage / scalar),
            timestamp: self.timestamp,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiskInfo {
    pub filesystem: String,
    pub mounted_on: String,
    pub total: u64,
    pub used: u64,
    pub available: u64,
    pub use_percent: f64,
    pub timestamp: DateTime<Utc>,
}

impl Record for DiskInfo {}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct DiskIOInfo {
    pub reads_completed: u64,
    pub reads_merged: u64,
    pub sectors_read: u64,
    pub time_reading_ms: u64,
    pub writes_completed: u64,
    pub writes_merged: u64,
    pub sectors_written: u64,
    pub time_writing_ms: u64,
    pub io_in_progress: u64,
    pub time_io_ms: u64,
    pub weighted_time_io_ms: u64,
    pub timestamp: DateTime<Utc>,
}

impl Record for DiskIOInfo {}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct DiskIOProcessSample {
    pub rchar: u64,
    pub wchar: u64,
    pub syscr: u64,
    pub syscw: u64,
    pub read_bytes: u64,
    pub write_bytes: u64,
    pub cancelled_write_bytes: i64,
    pub timestamp: DateTime<Utc>,
}

impl Record for DiskIOProcessSample {}

impl Arithmetic for DiskIOProcessSample {
    fn add(&self, other: &Self) -> Self {
        Self {
            rchar: self.rchar + other.rchar,
            wchar: self.wchar + other.wchar,
            syscr: self.syscr + other.syscr,
            syscw: self.syscw + other.syscw,
            read_bytes: self.read_bytes + other.read_bytes,
            write_bytes: self.write_bytes + other.write_bytes,
            cancelled_write_bytes: self.cancelled_write_bytes + other.cancelled_write_bytes,
            timestamp: self.timestamp.max(other.timestamp),
        }
    }
    fn div_scalar(&self, scalar: f64) -> Self {
        Self {
            rchar: (self.rchar as f64 / scalar) as u64,
            wchar: (self.wchar as f64 / scalar) as u64,
            syscr: (self.syscr as f64 / scalar) as u64,
            syscw: (self.syscw as f64 / scalar) as u64,
            read_bytes: (self.read_bytes as f64 / scalar) as u64,
            write_bytes: (self.write_bytes as f64 / scalar) as u64,
            cancelled_write_bytes: (self.cancelled_write_bytes as f64 / scalar) as i64,
            timestamp: self.timestamp,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkInterfaceSample {
    pub interface: String,
    pub rx_bytes: f64,
    pub rx_packets: u64,
    pub rx_errs: u64,
    pub rx_drop: u64,
    pub tx_bytes: f64,
    pub tx_packets: u64,
    pub tx_errs: u64,
    pub tx_drop: u64,
    pub timestamp: DateTime<Utc>,
}

impl Record for NetworkInterfaceSample {}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkInterfaceDeltaSample {
    pub interface: String,
    pub rx_bytes: f64,
    pub rx_packets: f64,
    pub rx_errs: f64,
    pub rx_drop: f64,
    pub tx_bytes: f64,
    pub tx_packets: f64,
    pub tx_errs: f64,
    pub tx_drop: f64,
    pub elapsed_seconds: f64,
    pub timestamp: DateTime<Utc>,
}

impl Record for NetworkInterfaceDeltaSample {}

impl NetworkInterfaceDeltaSample {
    /// Bytes/sec for both directions combined, the `rate` property
    /// from §3.
    pub fn rate(&self) -> f64 {
        if self.elapsed_seconds <= 0.0 {
            return 0.0;
        }
        round3((self.rx_bytes + self.tx_bytes) / self.elapsed_seconds)
    }

    pub fn is_active(&self) -> bool {
        self.rx_bytes > 0.0 || self.tx_bytes > 0.0
    }

    /// Computes a per-field delta divided by the elapsed time between
    /// two cumulative snapshots of the same interface.
    pub fn from_delta(
        before: &NetworkInterfaceSample,
        after: &NetworkInterfaceSample,
        elapsed_seconds: f64,
    ) -> Self {
        let div = |a: f64, b: f64| -> f64 {
            if elapsed_seconds <= 0.0 {
                0.0
            } else {
                round3((b - a) / elapsed_seconds)
            }
        };
        Self {
            interface: after.interface.clone(),
            rx_bytes: div(before.rx_bytes, after.rx_bytes),
            rx_packets: div(before.rx_packets as f64, after.rx_packets as f64),
            rx_errs: div(before.rx_errs as f64, after.rx_errs as f64),
            rx_drop: div(before.rx_drop as f64, after.rx_drop as f64),
            tx_bytes: div(before.tx_bytes, after.tx_bytes),
            tx_packets: div(before.tx_packets as f64, after.tx_packets as f64),
            tx_errs: div(before.tx_errs as f64, after.tx_errs as f64),
            tx_drop: div(before.tx_drop as f64, after.tx_drop as f64),
            elapsed_seconds,
            timestamp: after.timestamp,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PressureStat {
    pub avg10: f64,
    pub avg60: f64,
    pub avg300: f64,
    pub total: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PressureCategory {
    pub some: PressureStat,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full: Option<PressureStat>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PressureInfo {
    pub cpu: PressureCategory,
    pub io: PressureCategory,
    pub memory: PressureCategory,
    pub timestamp: DateTime<Utc>,
}

impl Record for PressureInfo {}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct BootTimeInfo {
    pub boot_time_seconds: f64,
    pub timestamp: DateTime<Utc>,
}

impl Record for BootTimeInfo {}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SystemUptimeInfo {
    pub uptime_seconds: f64,
    pub timestamp: DateTime<Utc>,
}

impl Record for SystemUptimeInfo {}

/// A `Process` identity plus an ordered series of samples. The series
/// supports averaging and, for CPU/memory-shaped samples, picking the
/// peak sample.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProcessInfo<S> {
    pub pid: u32,
    pub name: String,
    pub command: String,
    pub start_time: String,
    pub samples: Vec<S>,
}

impl<S: Clone> ProcessInfo<S> {
    pub fn process(&self) -> Process {
        Process {
            pid: self.pid,
            name: self.name.clone(),
            command: self.command.clone(),
            start_time: self.start_time.clone(),
        }
    }

    pub fn from_process(process: &Process, samples: Vec<S>) -> Self {
        Self {
            pid: process.pid,
            name: process.name.clone(),
            command: process.command.clone(),
            start_time: process.start_time.clone(),
            samples,
        }
    }
}

impl<S: Arithmetic + Clone> ProcessInfo<S> {
    /// Sum of samples divided by count.
    pub fn avg(&self) -> Option<S> {
        let mut iter = self.samples.iter();
        let first = iter.next()?.clone();
        let summed = iter.fold(first, |acc, s| acc.add(s));
        Some(summed.div_scalar(self.samples.len() as f64))
    }
}

pub type CpuSampleProcessInfo = ProcessInfo<CpuSample>;
pub type MemorySampleProcessInfo = ProcessInfo<MemorySample>;
pub type ResourceSampleProcessInfo = ProcessInfo<ResourceSample>;

impl CpuSampleProcessInfo {
    pub fn max_cpu_load(&self) -> Option<CpuSample> {
        self.samples
            .iter()
            .copied()
            .max_by(|a, b| a.cpu_load.total_cmp(&b.cpu_load))
    }
}

impl MemorySampleProcessInfo {
    pub fn max_mem_usage(&self) -> Option<MemorySample> {
        self.samples
            .iter()
            .copied()
            .max_by(|a, b| a.mem_usage.total_cmp(&b.mem_usage))
    }
}

impl Record for CpuSampleProcessInfo {}
impl Record for MemorySampleProcessInfo {}
impl Record for ResourceSampleProcessInfo {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn process_identity_requires_all_four_fields() {
        let a = Process {
            pid: 1,
            name: "init".into(),
            command: "/sbin/init".into(),
            start_time: "30".into(),
        };
        let b = a.clone();
        assert_eq!(a, b);
        let mut c = a.clone();
        c.start_time = "31".into();
        assert_ne!(a, c);
    }

    #[test]
    fn cpu_usage_rounds_to_three_decimals() {
        let mut cores = HashMap::new();
        cores.insert("0".to_string(), 1.23456789);
        let usage = CpuUsage::new(1.23456789, cores, None);
        assert_eq!(usage.load, 1.235);
        assert_eq!(usage.cores["0"], 1.235);
    }

    #[test]
    fn network_delta_rate_is_zero_without_elapsed_time() {
        let s = NetworkInterfaceDeltaSample {
            interface: "eth0".into(),
            rx_bytes: 0.0,
            rx_packets: 0.0,
            rx_errs: 0.0,
            rx_drop: 0.0,
            tx_bytes: 0.0,
            tx_packets: 0.0,
            tx_errs: 0.0,
            tx_drop: 0.0,
            elapsed_seconds: 0.0,
            timestamp: now(),
        };
        assert_eq!(s.rate(), 0.0);
    }

    #[test]
    fn process_info_avg_divides_elementwise() {
        let process = Process {
            pid: 1,
            name: "x".into(),
            command: "/bin/x".into(),
            start_time: "1".into(),
        };
        let samples = vec![
            CpuSample {
                cpu_load: 10.0,
                timestamp: now(),
            },
            CpuSample {
                cpu_load: 20.0,
                timestamp: now(),
            },
        ];
        let info = ProcessInfo::from_process(&process, samples);
        assert_eq!(info.avg().unwrap().cpu_load, 15.0);
    }
}
