//! Parsers for the QNX command recipes in spec §4.4: `hogs`, `pidin`,
//! `/proc/vm/stats`, QNX `df`, `/dev/bmetrics`.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::ParsingError;
use crate::record::round3;
use crate::record::types::{BootTimeInfo, DiskInfo, Memory, MemoryKind, Process, SystemMemory, SystemUptimeInfo};

use super::generic::{convert_to_int, parse_header_table};

const QNX_PAGE_SIZE: u64 = 4096;

fn is_idle_name(name: &str) -> bool {
    name.eq_ignore_ascii_case("idle")
}

#[derive(Debug, Clone, PartialEq)]
struct HogsRow {
    pid: u32,
    tid: u32,
    name: String,
    percent: f64,
}

static HOGS_ROW: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(\d+)\s+(\d+)\s+(\S+)\s+([\d.]+)%\s*$").unwrap());

fn parse_hogs_rows(text: &str) -> Vec<HogsRow> {
    text.lines()
        .filter_map(|line| HOGS_ROW.captures(line))
        .map(|c| HogsRow {
            pid: c[1].parse().unwrap_or(0),
            tid: c[2].parse().unwrap_or(0),
            name: c[3].to_string(),
            percent: c[4].parse().unwrap_or(0.0),
        })
        .collect()
}

/// Parses `hogs -i 1 -s <n> -% 1000` output into `(load, cores)`,
/// using the idle-named rows (one per core) as the per-core idle
/// percentage.
pub fn parse_hogs_cpu_usage(
    text: &str,
    timestamp: DateTime<Utc>,
) -> Result<(f64, HashMap<String, f64>, DateTime<Utc>), ParsingError> {
    let rows = parse_hogs_rows(text);
    let idle_rows: Vec<&HogsRow> = rows.iter().filter(|r| is_idle_name(&r.name)).collect();
    if idle_rows.is_empty() {
        return Err(ParsingError::new("no idle-core rows found in hogs output", text));
    }
    let mut cores = HashMap::new();
    for (i, row) in idle_rows.iter().enumerate() {
        cores.insert(i.to_string(), round3(100.0 - row.percent));
    }
    let load = round3(cores.values().sum::<f64>() / cores.len() as f64);
    Ok((load, cores, timestamp))
}

static PIDIN_HEADER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s*PID\b").unwrap());

/// Splits a combined `hogs && pidin` command's output at the line
/// that starts the `pidin` table (its header begins with `PID`).
fn split_hogs_pidin(text: &str) -> Result<(&str, &str), ParsingError> {
    let idx = PIDIN_HEADER
        .find(text)
        .ok_or_else(|| ParsingError::new("no pidin table found after hogs output", text))?
        .start();
    Ok((&text[..idx], &text[idx..]))
}

#[derive(Debug, Clone, PartialEq)]
struct PidinRow {
    pid: u32,
    name: String,
    start_time: String,
}

fn parse_pidin_table(text: &str) -> Result<Vec<PidinRow>, ParsingError> {
    let known: HashSet<&str> = ["PID", "TID", "NAME", "START"].into_iter().collect();
    let rows = parse_header_table(text, &known, &["PID", "NAME"])?;
    Ok(rows
        .into_iter()
        .map(|row| PidinRow {
            pid: row.get("PID").and_then(|v| v.parse().ok()).unwrap_or(0),
            name: row.get("NAME").cloned().unwrap_or_default(),
            start_time: row.get("START").cloned().unwrap_or_default(),
        })
        .collect())
}

/// Parses `hogs -i 1 -s <n> && pidin -F "%a %t %n %A"`, cross
/// correlating by pid: each process's total SYS% (summed across its
/// threads, idle rows excluded) is divided by the idle-core count to
/// normalize against the number of cores.
pub fn parse_hogs_pidin_proc_wise(
    text: &str,
    timestamp: DateTime<Utc>,
) -> Result<HashMap<Process, f64>, ParsingError> {
    let (hogs_text, pidin_text) = split_hogs_pidin(text)?;
    let rows = parse_hogs_rows(hogs_text);
    let idle_count = rows.iter().filter(|r| is_idle_name(&r.name)).count().max(1);

    let mut totals: HashMap<u32, f64> = HashMap::new();
    for row in rows.iter().filter(|r| !is_idle_name(&r.name)) {
        *totals.entry(row.pid).or_insert(0.0) += row.percent;
    }

    let pidin_rows = parse_pidin_table(pidin_text)?;
    let mut out = HashMap::new();
    for row in pidin_rows {
        let Some(total) = totals.get(&row.pid) else {
            continue;
        };
        let process = Process {
            pid: row.pid,
            name: row.name.clone(),
            command: row.name,
            start_time: row.start_time,
        };
        out.insert(process, round3(total / idle_count as f64));
    }
    Ok(out)
}

static VM_STAT_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(page_count|pages_free)\s+(.+)").unwrap());

/// Parses `cat /proc/vm/stats | grep -E "(page_count|pages_free)"`.
pub fn parse_proc_vm_stat(text: &str) -> Result<SystemMemory, ParsingError> {
    let mut page_count = None;
    let mut pages_free = None;
    for caps in VM_STAT_LINE.captures_iter(text) {
        let value = convert_to_int(&caps[2])?;
        match &caps[1] {
            "page_count" => page_count = Some(value),
            "pages_free" => pages_free = Some(value),
            _ => {}
        }
    }
    let page_count = page_count.ok_or_else(|| ParsingError::new("missing page_count", text))?;
    let pages_free = pages_free.ok_or_else(|| ParsingError::new("missing pages_free", text))?;

    let total = (page_count as u64 * QNX_PAGE_SIZE) / 1024;
    let free = (pages_free as u64 * QNX_PAGE_SIZE) / 1024;
    let used = total.saturating_sub(free);

    Ok(SystemMemory::new(MemoryKind::Basic(Memory { total, used, free }), None))
}

/// Parses QNX `df` output (same tabular shape as POSIX `df`, with a
/// `1024-blocks` header instead of `1K-blocks`).
pub fn parse_df_qnx(text: &str) -> Result<Vec<DiskInfo>, ParsingError> {
    let known: HashSet<&str> = [
        "Filesystem",
        "1024-blocks",
        "Used",
        "Available",
        "Capacity",
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
            .get("1024-blocks")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        let used: u64 = row.get("Used").and_then(|v| v.parse().ok()).unwrap_or(0);
        let available: u64 = row
            .get("Available")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        let use_percent: f64 = row
            .get("Capacity")
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

const DATE_FORMAT: &str = "%a %b %e %H:%M:%S %Y";
static BOOT_TIME_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)boot\s*time:?\s*(.+)").unwrap());

/// Parses `pidin info` (for its boot-time line) and `date`, computing
/// uptime as their difference.
pub fn parse_uptime(pidin_info: &str, date_output: &str) -> Result<SystemUptimeInfo, ParsingError> {
    let boot_line = BOOT_TIME_LINE
        .captures(pidin_info)
        .ok_or_else(|| ParsingError::new("no boot time line in pidin info", pidin_info))?;
    let boot_time = NaiveDateTime::parse_from_str(boot_line[1].trim(), DATE_FORMAT)
        .map_err(|e| ParsingError::new(format!("unparsable boot time: {e}"), pidin_info))?;
    let now = NaiveDateTime::parse_from_str(date_output.trim(), DATE_FORMAT)
        .map_err(|e| ParsingError::new(format!("unparsable date output: {e}"), date_output))?;
    let uptime_seconds = (now - boot_time).num_seconds() as f64;
    Ok(SystemUptimeInfo {
        uptime_seconds,
        timestamp: Utc::now(),
    })
}

static BMETRICS_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"SYS_BOOT_LOADER_END\D*(\d+)").unwrap());

/// Parses `cat /dev/bmetrics | grep SYS_BOOT_LOADER_END`, interpreting
/// the value as microseconds since power-on.
pub fn parse_bmetrics_boot_time(text: &str) -> Result<BootTimeInfo, ParsingError> {
    let caps = BMETRICS_LINE
        .captures(text)
        .ok_or_else(|| ParsingError::new("no SYS_BOOT_LOADER_END entry", text))?;
    let micros: u64 = caps[1]
        .parse()
        .map_err(|e| ParsingError::new(format!("unparsable bmetrics value: {e}"), text))?;
    Ok(BootTimeInfo {
        boot_time_seconds: micros as f64 / 1_000_000.0,
        timestamp: Utc::now(),
    })
}

static RSS_PID_MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"rss_pid=(\d+)").unwrap());
static RSS_VALUE_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*rss\s+(\d+)").unwrap());

/// Parses the `rss_pid=<pid>` marker trick plus `pidin -f atnA`
/// output into `{Process: mem_usage_kib}`.
pub fn parse_mem_usage_from_proc_files(text: &str) -> Result<HashMap<Process, f64>, ParsingError> {
    let (rss_section, pidin_section) = text
        .split_once("PIDIN_SEPARATOR")
        .ok_or_else(|| ParsingError::new("missing PIDIN_SEPARATOR marker", text))?;

    let mut rss_by_pid: HashMap<u32, f64> = HashMap::new();
    let mut current_pid: Option<u32> = None;
    for line in rss_section.lines() {
        if let Some(caps) = RSS_PID_MARKER.captures(line) {
            current_pid = caps[1].parse().ok();
        } else if let Some(caps) = RSS_VALUE_LINE.captures(line) {
            if let Some(pid) = current_pid {
                if let Ok(v) = caps[1].parse::<f64>() {
                    rss_by_pid.insert(pid, v);
                }
            }
        }
    }

    let pidin_rows = parse_pidin_table(pidin_section)?;
    let mut out = HashMap::new();
    for row in pidin_rows {
        let Some(rss) = rss_by_pid.get(&row.pid) else {
            continue;
        };
        let process = Process {
            pid: row.pid,
            name: row.name.clone(),
            command: row.name,
            start_time: row.start_time,
        };
        out.insert(process, *rss);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hogs_cpu_usage_reports_load_as_100_minus_average_idle() {
        let text = "    1   1 Idle    80.0%\n 1001   1 Idle    60.0%\n 1002   1 worker  40.0%\n";
        let (load, cores, _) = parse_hogs_cpu_usage(text, Utc::now()).unwrap();
        assert_eq!(cores.len(), 2);
        // idle 80 and 60 -> core loads 20 and 40 -> average 30
        assert_eq!(load, 30.0);
    }

    #[test]
    fn vm_stat_converts_hex_pages_to_kib() {
        let text = "page_count 0x40000 (1.0GB)\npages_free 0x20000 (512.0MB)\n";
        let mem = parse_proc_vm_stat(text).unwrap();
        match mem.mem {
            MemoryKind::Basic(m) => {
                assert_eq!(m.total, 1048576);
                assert_eq!(m.free, 524288);
                assert_eq!(m.used, 1048576 - 524288);
            }
            _ => panic!("expected basic memory"),
        }
    }

    #[test]
    fn bmetrics_parses_microseconds_to_seconds() {
        let text = "SYS_BOOT_LOADER_END=2500000\n";
        let boot = parse_bmetrics_boot_time(text).unwrap();
        assert_eq!(boot.boot_time_seconds, 2.5);
    }

    #[test]
    fn hogs_pidin_proc_wise_normalizes_by_core_count() {
        let text = "    1   1 Idle    50.0%\n 1001   1 Idle    50.0%\n 2000   1 worker  100.0%\n    PID TID NAME START\n   2000   1 worker 12:00:00\n";
        let result = parse_hogs_pidin_proc_wise(text, Utc::now()).unwrap();
        let process = Process {
            pid: 2000,
            name: "worker".into(),
            command: "worker".into(),
            start_time: "12:00:00".into(),
        };
        assert_eq!(result[&process], 50.0);
    }
}
