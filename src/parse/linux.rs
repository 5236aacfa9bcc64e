//! Parsers for the Linux and Android (a Linux variant) command
//! recipes in spec §4.4.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::ParsingError;
use crate::record::round3;
use crate::record::types::{
    DiskIOInfo, DiskIOProcessSample, DiskInfo, ExtendedMemory, Memory, MemoryKind, ModeUsage,
    NetworkInterfaceSample, PressureCategory, PressureInfo, PressureStat, Process, SystemMemory,
};

use super::generic::{convert_to_int, parse_header_table};

/// Raw `/proc/stat` cpu-line jiffy counters, before any differencing.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RawCpuTicks {
    pub user: u64,
    pub nice: u64,
    pub system: u64,
    pub idle: u64,
    pub iowait: u64,
    pub irq: u64,
    pub softirq: u64,
    pub steal: u64,
    pub guest: u64,
    pub guest_nice: u64,
}

impl RawCpuTicks {
    fn total(&self) -> u64 {
        self.user
            + self.nice
            + self.system
            + self.idle
            + self.iowait
            + self.irq
            + self.softirq
            + self.steal
            + self.guest
            + self.guest_nice
    }

    fn delta(&self, other: &Self) -> Self {
        Self {
            user: other.user.saturating_sub(self.user),
            nice: other.nice.saturating_sub(self.nice),
            system: other.system.saturating_sub(self.system),
            idle: other.idle.saturating_sub(self.idle),
            iowait: other.iowait.saturating_sub(self.iowait),
            irq: other.irq.saturating_sub(self.irq),
            softirq: other.softirq.saturating_sub(self.softirq),
            steal: other.steal.saturating_sub(self.steal),
            guest: other.guest.saturating_sub(self.guest),
            guest_nice: other.guest_nice.saturating_sub(self.guest_nice),
        }
    }
}

/// Parses every `cpu` / `cpuN` line of `/proc/stat` into its raw
/// jiffy counters, keyed by label (`"cpu"` for the aggregate line,
/// `"0"`, `"1"`, ... for individual cores).
pub fn parse_proc_stat_cpu_lines(text: &str) -> Result<HashMap<String, RawCpuTicks>, ParsingError> {
    let mut out = HashMap::new();
    for line in text.lines() {
        let line = line.trim();
        if !line.starts_with("cpu") {
            continue;
        }
        let mut fields = line.split_whitespace();
        let label = fields.next().unwrap();
        let key = label.strip_prefix("cpu").unwrap_or(label).to_string();
        let nums: Vec<u64> = fields.filter_map(|f| f.parse().ok()).collect();
        if nums.len() < 4 {
            continue;
        }
        let get = |i: usize| nums.get(i).copied().unwrap_or(0);
        out.insert(
            if key.is_empty() { "cpu".to_string() } else { key },
            RawCpuTicks {
                user: get(0),
                nice: get(1),
                system: get(2),
                idle: get(3),
                iowait: get(4),
                irq: get(5),
                softirq: get(6),
                steal: get(7),
                guest: get(8),
                guest_nice: get(9),
            },
        );
    }
    if out.is_empty() {
        return Err(ParsingError::new("no cpu lines found in /proc/stat", text));
    }
    Ok(out)
}

/// Differences two `/proc/stat` snapshots into a `(load, cores,
/// mode_usage)` triple. If the aggregate delta is zero (the device
/// was idle for the whole interval), reports all-zeros rather than
/// dividing (§4.4 tie-break).
pub fn diff_cpu_snapshots(
    prev: &HashMap<String, RawCpuTicks>,
    curr: &HashMap<String, RawCpuTicks>,
) -> (f64, HashMap<String, f64>, Option<ModeUsage>) {
    let mut cores = HashMap::new();
    let mut mode_usage = None;
    let mut load = 0.0;

    for (key, curr_ticks) in curr {
        let Some(prev_ticks) = prev.get(key) else {
            continue;
        };
        let delta = prev_ticks.delta(curr_ticks);
        let total = delta.total();
        let pct = |v: u64| if total == 0 { 0.0 } else { round3(v as f64 / total as f64 * 100.0) };
        let idle_pct = pct(delta.idle);
        let core_load = if total == 0 { 0.0 } else { round3(100.0 - idle_pct) };

        if key == "cpu" {
            load = core_load;
            mode_usage = Some(ModeUsage {
                user: pct(delta.user),
                nice: pct(delta.nice),
                system: pct(delta.system),
                idle: idle_pct,
                iowait: pct(delta.iowait),
                irq: pct(delta.irq),
                softirq: pct(delta.softirq),
                steal: pct(delta.steal),
                guest: pct(delta.guest),
                guest_nice: pct(delta.guest_nice),
            });
        } else {
            cores.insert(key.clone(), core_load);
        }
    }
    (load, cores, mode_usage)
}

static MEMINFO_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\w+):\s*(\d+)").unwrap());

/// Parses `/proc/meminfo` key/value-in-kB lines and computes `used`
/// as `total - free - (Cached + SReclaimable + Buffers)`.
pub fn parse_meminfo(text: &str) -> Result<SystemMemory, ParsingError> {
    let mut values: HashMap<String, u64> = HashMap::new();
    for line in text.lines() {
        if let Some(caps) = MEMINFO_LINE.captures(line) {
            let key = caps[1].to_string();
            let value: u64 = caps[2].parse().unwrap_or(0);
            values.insert(key, value);
        }
    }
    let get = |k: &str| values.get(k).copied().unwrap_or(0);
    let total = get("MemTotal");
    if total == 0 {
        return Err(ParsingError::new("MemTotal missing from /proc/meminfo", text));
    }
    let free = get("MemFree");
    let cached = get("Cached");
    let sreclaimable = get("SReclaimable");
    let buffers = get("Buffers");
    let buff_cache = cached + sreclaimable + buffers;
    let used = total.saturating_sub(free).saturating_sub(buff_cache);
    let shared = if values.contains_key("Shmem") {
        get("Shmem")
    } else {
        get("MemShared")
    };
    let available = if values.contains_key("MemAvailable") {
        get("MemAvailable")
    } else {
        free
    };

    let mem = MemoryKind::Extended(ExtendedMemory {
        total,
        used,
        free,
        shared,
        buff_cache,
        available,
    });

    let swap = if values.contains_key("SwapTotal") {
        let swap_total = get("SwapTotal");
        let swap_free = get("SwapFree");
        Some(Memory {
            total: swap_total,
            used: swap_total.saturating_sub(swap_free),
            free: swap_free,
        })
    } else {
        None
    };

    Ok(SystemMemory::new(mem, swap))
}

/// Parses `cat /proc/uptime | cut` output: the first whitespace field
/// is the uptime in seconds.
pub fn parse_proc_uptime(text: &str) -> Result<f64, ParsingError> {
    text.split_whitespace()
        .next()
        .and_then(|s| s.parse::<f64>().ok())
        .ok_or_else(|| ParsingError::new("could not parse /proc/uptime", text))
}

static SYSTEMD_ANALYZE_TOTAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"=\s*([\d.]+)\s*s\b").unwrap());

/// Parses `systemd-analyze` output, taking the total after the `=`.
pub fn parse_systemd_analyze(text: &str) -> Result<f64, ParsingError> {
    SYSTEMD_ANALYZE_TOTAL
        .captures_iter(text)
        .last()
        .and_then(|c| c[1].parse::<f64>().ok())
        .ok_or_else(|| ParsingError::new("could not parse systemd-analyze output", text))
}

static BOOTSTAT_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"boottime\.\S+=(\d+)").unwrap());

/// Parses `/system/bin/bootstat -p` output: sums the per-phase
/// `boottime.<phase>=<ms>` entries into a total in seconds.
pub fn parse_bootstat(text: &str) -> Result<f64, ParsingError> {
    let total_ms: u64 = BOOTSTAT_LINE
        .captures_iter(text)
        .filter_map(|c| c[1].parse::<u64>().ok())
        .sum();
    if total_ms == 0 && !BOOTSTAT_LINE.is_match(text) {
        return Err(ParsingError::new("no boottime entries found", text));
    }
    Ok(total_ms as f64 / 1000.0)
}

const DISKSTATS_FIELDS: &[&str] = &[
    "major",
    "minor",
    "device",
    "reads_completed",
    "reads_merged",
    "sectors_read",
    "time_reading_ms",
    "writes_completed",
    "writes_merged",
    "sectors_written",
    "time_writing_ms",
    "io_in_progress",
    "time_io_ms",
    "weighted_time_io_ms",
];

/// Parses `/proc/diskstats`, keyed by device name.
pub fn parse_diskstats(text: &str) -> Result<HashMap<String, DiskIOInfo>, ParsingError> {
    let mut out = HashMap::new();
    let timestamp = Utc::now();
    for line in text.lines() {
        let cols: Vec<&str> = line.split_whitespace().collect();
        if cols.len() < DISKSTATS_FIELDS.len() {
            continue;
        }
        let get = |i: usize| cols.get(i).and_then(|v| v.parse::<u64>().ok()).unwrap_or(0);
        out.insert(
            cols[2].to_string(),
            DiskIOInfo {
                reads_completed: get(3),
                reads_merged: get(4),
                sectors_read: get(5),
                time_reading_ms: get(6),
                writes_completed: get(7),
                writes_merged: get(8),
                sectors_written: get(9),
                time_writing_ms: get(10),
                io_in_progress: get(11),
                time_io_ms: get(12),
                weighted_time_io_ms: get(13),
                timestamp,
            },
        );
    }
    if out.is_empty() {
        return Err(ParsingError::new("no parsable lines in /proc/diskstats", text));
    }
    Ok(out)
}

/// Parses POSIX `df` output into `DiskInfo` records.
pub fn parse_df(text: &str) -> Result<Vec<DiskInfo>, ParsingError> {
    let known: std::collections::HashSet<&str> = [
        "Filesystem",
        "1K-blocks",
        "Used",
        "Available",
        "Use%",
        "Mounted",
        "on",
    ]
    .into_iter()
    .collect();
    let rows = parse_header_table(text, &known, &["Filesystem", "Used", "Available"])?;
    let timestamp = Utc::now();
    let mut out = Vec::new();
    for row in rows {
        let total: u64 = row
            .get("1K-blocks")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        let used: u64 = row.get("Used").and_then(|v| v.parse().ok()).unwrap_or(0);
        let available: u64 = row
            .get("Available")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        let use_percent: f64 = row
            .get("Use%")
            .map(|v| v.trim_end_matches('%'))
            .and_then(|v| v.parse().ok())
            .unwrap_or(0.0);
        let mounted_on = row
            .get("Mounted")
            .cloned()
            .unwrap_or_default()
            .trim_start_matches("on ")
            .to_string();
        out.push(DiskInfo {
            filesystem: row.get("Filesystem").cloned().unwrap_or_default(),
            mounted_on,
            total,
            used,
            available,
            use_percent,
            timestamp,
        });
    }
    Ok(out)
}

static NET_DEV_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^\s*([\w.:-]+):\s*(\d+)\s+(\d+)\s+(\d+)\s+(\d+)\s+\d+\s+\d+\s+\d+\s+\d+\s+(\d+)\s+(\d+)\s+(\d+)\s+(\d+)",
    )
    .unwrap()
});

/// Parses `date -Iseconds` followed by `/proc/net/dev`. The leading
/// line supplies the timestamp so rate computations never skew
/// against the local clock.
pub fn parse_net_dev(text: &str) -> Result<(DateTime<Utc>, Vec<NetworkInterfaceSample>), ParsingError> {
    let mut lines = text.lines();
    let first = lines
        .next()
        .ok_or_else(|| ParsingError::new("empty network sample", text))?;
    let timestamp = DateTime::parse_from_rfc3339(first.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| ParsingError::new(format!("invalid timestamp line: {e}"), text))?;

    let mut out = Vec::new();
    for line in lines {
        if let Some(caps) = NET_DEV_LINE.captures(line) {
            let get = |i: usize| caps[i].parse::<u64>().unwrap_or(0);
            out.push(NetworkInterfaceSample {
                interface: caps[1].to_string(),
                rx_bytes: get(2) as f64,
                rx_packets: get(3),
                rx_errs: get(4),
                rx_drop: get(5),
                tx_bytes: get(6) as f64,
                tx_packets: get(7),
                tx_errs: get(8),
                tx_drop: get(9),
                timestamp,
            });
        }
    }
    if out.is_empty() {
        return Err(ParsingError::new("no interfaces found in /proc/net/dev", text));
    }
    Ok((timestamp, out))
}

static PRESSURE_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(some|full)\s+avg10=([\d.]+)\s+avg60=([\d.]+)\s+avg300=([\d.]+)\s+total=(\d+)").unwrap()
});

fn parse_pressure_category(text: &str) -> Result<PressureCategory, ParsingError> {
    let mut some = None;
    let mut full = None;
    for caps in PRESSURE_LINE.captures_iter(text) {
        let stat = PressureStat {
            avg10: caps[2].parse().unwrap_or(0.0),
            avg60: caps[3].parse().unwrap_or(0.0),
            avg300: caps[4].parse().unwrap_or(0.0),
            total: caps[5].parse().unwrap_or(0),
        };
        if &caps[1] == "some" {
            some = Some(stat);
        } else {
            full = Some(stat);
        }
    }
    Ok(PressureCategory {
        some: some.ok_or_else(|| ParsingError::new("missing 'some' pressure line", text))?,
        full,
    })
}

/// Parses the concatenated contents of `/proc/pressure/{cpu,io,memory}`.
pub fn parse_pressure(cpu: &str, io: &str, memory: &str) -> Result<PressureInfo, ParsingError> {
    Ok(PressureInfo {
        cpu: parse_pressure_category(cpu)?,
        io: parse_pressure_category(io)?,
        memory: parse_pressure_category(memory)?,
        timestamp: Utc::now(),
    })
}

/// A single `/proc/<pid>/stat` row, decoded past the parenthesized
/// `comm` field (which may itself contain spaces).
#[derive(Debug, Clone, PartialEq)]
pub struct PidStat {
    pub pid: u32,
    pub comm: String,
    pub utime: u64,
    pub stime: u64,
    pub starttime: u64,
    pub rss_pages: i64,
}

pub fn parse_pid_stat_line(line: &str) -> Result<PidStat, ParsingError> {
    let open = line
        .find('(')
        .ok_or_else(|| ParsingError::new("malformed /proc/pid/stat: no comm field", line))?;
    let close = line
        .rfind(')')
        .ok_or_else(|| ParsingError::new("malformed /proc/pid/stat: no comm field", line))?;
    let pid: u32 = line[..open]
        .trim()
        .parse()
        .map_err(|e| ParsingError::new(format!("malformed pid: {e}"), line))?;
    let comm = line[open + 1..close].to_string();
    let rest: Vec<&str> = line[close + 1..].split_whitespace().collect();
    let field = |idx: usize| rest.get(idx).and_then(|s| s.parse().ok()).unwrap_or(0);
    Ok(PidStat {
        pid,
        comm,
        utime: field(11),
        stime: field(12),
        starttime: field(19),
        rss_pages: field(21) as i64,
    })
}

/// One chunk of combined `/proc/<pid>/stat` + `/proc/<pid>/cmdline`
/// output, already split apart by the reserved-token separator.
struct ProcChunk {
    stat: PidStat,
    cmdline: String,
}

static SEPARATOR_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^.*[Nn]o such file or directory.*$\n?").unwrap());

fn split_proc_chunks(text: &str) -> Vec<&str> {
    SEPARATOR_LINE
        .split(text)
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .collect()
}

fn parse_proc_chunk(chunk: &str) -> Result<ProcChunk, ParsingError> {
    let mut lines = chunk.lines();
    let stat_line = lines
        .next()
        .ok_or_else(|| ParsingError::new("empty per-process chunk", chunk))?;
    let stat = parse_pid_stat_line(stat_line)?;
    let cmdline = lines
        .collect::<Vec<_>>()
        .join(" ")
        .replace('\0', " ")
        .trim()
        .to_string();
    Ok(ProcChunk { stat, cmdline })
}

fn chunk_to_process(chunk: &ProcChunk) -> Process {
    let command = if chunk.cmdline.is_empty() {
        chunk.stat.comm.clone()
    } else {
        chunk.cmdline.clone()
    };
    Process {
        pid: chunk.stat.pid,
        name: chunk.stat.comm.clone(),
        command,
        start_time: chunk.stat.starttime.to_string(),
    }
}

/// A single read of the per-process CPU/memory recipe: `getconf
/// PAGESIZE` followed by per-pid `stat`+`cmdline` chunks separated by
/// the reserved-token error, followed by a trailing `/proc/stat`
/// dump supplying the system jiffy denominator.
#[derive(Debug, Clone)]
pub struct ProcWiseSnapshot {
    pub page_size: u64,
    pub processes: HashMap<Process, PidStat>,
    pub global_ticks: RawCpuTicks,
}

pub fn parse_proc_wise_snapshot(raw: &str) -> Result<ProcWiseSnapshot, ParsingError> {
    let mut lines = raw.splitn(2, '\n');
    let page_size_line = lines
        .next()
        .ok_or_else(|| ParsingError::new("empty proc-wise sample", raw))?;
    let page_size = convert_to_int(page_size_line)? as u64;
    let rest = lines.next().unwrap_or("");

    let chunks = split_proc_chunks(rest);
    let (tail, proc_chunks) = chunks
        .split_last()
        .ok_or_else(|| ParsingError::new("no trailing /proc/stat dump found", raw))?;
    let global = parse_proc_stat_cpu_lines(tail)?;
    let global_ticks = *global
        .get("cpu")
        .ok_or_else(|| ParsingError::new("trailing /proc/stat missing aggregate line", *tail))?;

    let mut processes = HashMap::new();
    for &chunk_text in proc_chunks {
        let chunk = parse_proc_chunk(chunk_text)?;
        processes.insert(chunk_to_process(&chunk), chunk.stat.clone());
    }

    Ok(ProcWiseSnapshot {
        page_size,
        processes,
        global_ticks,
    })
}

/// Extracts `{Process: mem_usage_kib}` from a single proc-wise
/// snapshot (memory needs no differencing).
pub fn proc_wise_memory(snapshot: &ProcWiseSnapshot) -> HashMap<Process, f64> {
    snapshot
        .processes
        .iter()
        .map(|(process, stat)| {
            let kib = (stat.rss_pages.max(0) as u64 * snapshot.page_size) / 1024;
            (process.clone(), kib as f64)
        })
        .collect()
}

/// Differences two proc-wise snapshots into per-process CPU load
/// percentages: `(utime+stime delta) / (system jiffy delta) × 100`.
/// Zero jiffy delta yields zero load rather than dividing.
pub fn proc_wise_cpu_delta(
    prev: &ProcWiseSnapshot,
    curr: &ProcWiseSnapshot,
) -> HashMap<Process, f64> {
    let jiffy_delta = curr.global_ticks.total().saturating_sub(prev.global_ticks.total());
    let mut out = HashMap::new();
    for (process, curr_stat) in &curr.processes {
        let Some(prev_stat) = prev.processes.get(process) else {
            continue;
        };
        let curr_ticks = curr_stat.utime + curr_stat.stime;
        let prev_ticks = prev_stat.utime + prev_stat.stime;
        let tick_delta = curr_ticks.saturating_sub(prev_ticks);
        let load = if jiffy_delta == 0 {
            0.0
        } else {
            round3(tick_delta as f64 / jiffy_delta as f64 * 100.0)
        };
        out.insert(process.clone(), load);
    }
    out
}

const PROC_IO_FIELDS: &[&str] = &[
    "rchar",
    "wchar",
    "syscr",
    "syscw",
    "read_bytes",
    "write_bytes",
    "cancelled_write_bytes",
];

/// Parses the 7-line `/proc/<pid>/io` block.
pub fn parse_proc_io(text: &str) -> Result<DiskIOProcessSample, ParsingError> {
    let mut values: HashMap<&str, i64> = HashMap::new();
    for line in text.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim();
        if PROC_IO_FIELDS.contains(&key) {
            if let Ok(v) = value.trim().parse::<i64>() {
                values.insert(key, v);
            }
        }
    }
    for field in PROC_IO_FIELDS {
        if !values.contains_key(field) {
            return Err(ParsingError::new(format!("missing /proc/pid/io field {field}"), text));
        }
    }
    Ok(DiskIOProcessSample {
        rchar: values["rchar"] as u64,
        wchar: values["wchar"] as u64,
        syscr: values["syscr"] as u64,
        syscw: values["syscw"] as u64,
        read_bytes: values["read_bytes"] as u64,
        write_bytes: values["write_bytes"] as u64,
        cancelled_write_bytes: values["cancelled_write_bytes"],
        timestamp: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cpu_stat(user: u64, idle: u64) -> String {
        format!("cpu  {user} 0 0 {idle} 0 0 0 0 0 0\ncpu0 {user} 0 0 {idle} 0 0 0 0 0 0\n")
    }

    #[test]
    fn cpu_diff_reports_zero_when_no_ticks_elapsed() {
        let snapshot = parse_proc_stat_cpu_lines(&cpu_stat(100, 900)).unwrap();
        let (load, cores, mode_usage) = diff_cpu_snapshots(&snapshot, &snapshot);
        assert_eq!(load, 0.0);
        assert_eq!(cores["0"], 0.0);
        assert_eq!(mode_usage.unwrap().idle, 0.0);
    }

    #[test]
    fn cpu_diff_computes_load_as_100_minus_idle() {
        let prev = parse_proc_stat_cpu_lines(&cpu_stat(100, 900)).unwrap();
        let curr = parse_proc_stat_cpu_lines(&cpu_stat(110, 990)).unwrap();
        let (load, cores, mode_usage) = diff_cpu_snapshots(&prev, &curr);
        // user delta=10, idle delta=90, total delta=100 -> idle 90%, load 10%
        assert_eq!(load, 10.0);
        assert_eq!(cores["0"], 10.0);
        assert_eq!(mode_usage.unwrap().idle, 90.0);
    }

    #[test]
    fn meminfo_computes_used_excluding_cache_and_buffers() {
        let text = "MemTotal:       1048576 kB\nMemFree:         200000 kB\nMemAvailable:    900000 kB\nBuffers:          10000 kB\nCached:           50000 kB\nSReclaimable:      5000 kB\nShmem:             1000 kB\n";
        let mem = parse_meminfo(text).unwrap();
        match mem.mem {
            MemoryKind::Extended(m) => {
                assert_eq!(m.total, 1048576);
                assert_eq!(m.free, 200000);
                assert_eq!(m.buff_cache, 65000);
                assert_eq!(m.used, 1048576 - 200000 - 65000);
                assert_eq!(m.available, 900000);
            }
            _ => panic!("expected extended memory"),
        }
    }

    #[test]
    fn uptime_parses_first_field() {
        assert_eq!(parse_proc_uptime("12345.67 54321.00\n").unwrap(), 12345.67);
    }

    #[test]
    fn systemd_analyze_extracts_total() {
        let text = "Startup finished in 3.266s (kernel) + 10.920s (userspace) = 14.187s\n";
        assert_eq!(parse_systemd_analyze(text).unwrap(), 14.187);
    }

    #[test]
    fn diskstats_keys_by_device_name() {
        let text = "   8       0 sda 100 10 2000 50 200 20 4000 60 0 100 110\n";
        let stats = parse_diskstats(text).unwrap();
        let sda = &stats["sda"];
        assert_eq!(sda.reads_completed, 100);
        assert_eq!(sda.writes_completed, 200);
    }

    #[test]
    fn net_dev_uses_leading_timestamp_line() {
        let text = "2024-01-01T00:00:00+00:00\nInter-|   Receive                                                |  Transmit\n face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed\n    lo:   100   10    0    0    0     0          0         0      100     10    0    0    0     0       0          0\n";
        let (timestamp, samples) = parse_net_dev(text).unwrap();
        assert_eq!(timestamp.to_rfc3339(), "2024-01-01T00:00:00+00:00");
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].interface, "lo");
        assert_eq!(samples[0].rx_bytes, 100.0);
    }

    #[test]
    fn proc_wise_memory_converts_rss_pages_to_kib() {
        let raw = format!(
            "4096\n1 (init) S 0 1 1 0 -1 0 0 0 0 0 0 0 0 0 0 0 0 0 30 0 0 1675 0\n/system/bin/initsecond_stage\0\ncat: /proc/e39f7761903b: No such file or directory\ncpu  100 0 0 900 0 0 0 0 0 0\n"
        );
        let snapshot = parse_proc_wise_snapshot(&raw).unwrap();
        let mem = proc_wise_memory(&snapshot);
        let process = Process {
            pid: 1,
            name: "init".into(),
            command: "/system/bin/initsecond_stage".into(),
            start_time: "30".into(),
        };
        assert_eq!(mem[&process], 6700.0);
    }

    #[test]
    fn proc_io_requires_all_seven_fields() {
        let text = "rchar: 1\nwchar: 2\nsyscr: 3\nsyscw: 4\nread_bytes: 5\nwrite_bytes: 6\n";
        assert!(parse_proc_io(text).is_err());
    }
}
