//! Linux handler: desktop/server-shaped recipes (§4.4) — `/proc/stat`,
//! `/proc/meminfo`, `/proc/diskstats`, `df`, `/proc/net/dev`,
//! `/proc/pressure`, `systemd-analyze`, `/proc/<pid>/{stat,cmdline,io}`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::error::HandlerError;
use crate::parse::linux::{
    diff_cpu_snapshots, parse_bootstat, parse_diskstats, parse_meminfo, parse_net_dev,
    parse_pressure, parse_proc_io, parse_proc_stat_cpu_lines, parse_proc_uptime,
    parse_proc_wise_snapshot, parse_systemd_analyze, proc_wise_cpu_delta, proc_wise_memory,
    ProcWiseSnapshot, RawCpuTicks,
};
use crate::parse::DEFAULT_SEPARATOR_TOKEN;
use crate::record::list::{CpuList, DiskInfoList, MemoryList, NetworkInterfaceDeltaList};
use crate::record::types::{
    BootTimeInfo, CpuSample, CpuSampleProcessInfo, CpuUsage, DiskIOInfo, DiskIOProcessSample,
    DiskInfo, MemorySample, MemorySampleProcessInfo, NetworkInterfaceDeltaSample,
    NetworkInterfaceSample, PressureInfo, Process, SystemMemory, SystemUptimeInfo,
};
use crate::sampler::{differencing_fold, stateless_fold, SamplerRegistry};
use crate::transport::{Session, Transport};

use super::{group_process_samples, BaseHandler};

const PROC_WISE_RECIPE: &str = "getconf PAGESIZE; for p in /proc/[0-9]*; do pid=${p#/proc/}; cat \"$p/stat\" 2>/dev/null; cat \"$p/cmdline\" 2>/dev/null | tr '\\0' ' '; echo; cat /proc/SEPARATOR_TOKEN 2>&1; done; cat /proc/stat";

fn proc_wise_command() -> String {
    PROC_WISE_RECIPE.replace("SEPARATOR_TOKEN", DEFAULT_SEPARATOR_TOKEN)
}

pub struct LinuxHandler<T: Transport> {
    base: BaseHandler<T>,
    cpu_sampler: SamplerRegistry<HashMap<String, RawCpuTicks>, CpuUsage>,
    mem_sampler: SamplerRegistry<SystemMemory, SystemMemory>,
    cpu_proc_sampler: SamplerRegistry<ProcWiseSnapshot, HashMap<Process, CpuSample>>,
    mem_proc_sampler: SamplerRegistry<ProcWiseSnapshot, HashMap<Process, MemorySample>>,
}

impl<T: Transport + 'static> LinuxHandler<T> {
    pub fn new(session: Arc<Session<T>>, tmp_dir: impl Into<String>) -> Self {
        Self {
            base: BaseHandler::new(session, tmp_dir),
            cpu_sampler: SamplerRegistry::new(),
            mem_sampler: SamplerRegistry::new(),
            cpu_proc_sampler: SamplerRegistry::new(),
            mem_proc_sampler: SamplerRegistry::new(),
        }
    }

    /// Exposes the shared base handler to OS variants built on top of
    /// the same `/proc` recipes (e.g. [`super::android::AndroidHandler`]).
    pub fn base(&self) -> &BaseHandler<T> {
        &self.base
    }

    async fn read_cpu_ticks(&self) -> Result<HashMap<String, RawCpuTicks>, HandlerError> {
        let text = self.base.run("cat /proc/stat").await?;
        Ok(parse_proc_stat_cpu_lines(&text)?)
    }

    /// One-shot CPU usage: two `/proc/stat` reads `interval` apart.
    pub async fn get_cpu_usage(&self, interval: Duration) -> Result<CpuUsage, HandlerError> {
        let prev = self.read_cpu_ticks().await?;
        tokio::time::sleep(interval).await;
        let curr = self.read_cpu_ticks().await?;
        let (load, cores, mode_usage) = diff_cpu_snapshots(&prev, &curr);
        Ok(CpuUsage::new(load, cores, mode_usage))
    }

    pub async fn start_cpu_measurement(&self, interval: Duration) -> Result<(), HandlerError> {
        let session = self.base.session.clone();
        self.cpu_sampler
            .start(
                "cpu",
                interval,
                move || {
                    let session = session.clone();
                    async move {
                        let text = session.run_command("cat /proc/stat", None, None, None).await?;
                        parse_proc_stat_cpu_lines(&text).map_err(HandlerError::from)
                    }
                },
                differencing_fold(|prev, curr| {
                    let (load, cores, mode_usage) = diff_cpu_snapshots(prev, curr);
                    CpuUsage::new(load, cores, mode_usage)
                }),
            )
            .await?;
        Ok(())
    }

    pub async fn stop_cpu_measurement(&self) -> Result<CpuList, HandlerError> {
        let (_raw, processed) = self.cpu_sampler.stop("cpu").await?;
        Ok(processed.into())
    }

    async fn read_meminfo(&self) -> Result<SystemMemory, HandlerError> {
        let text = self.base.run("cat /proc/meminfo").await?;
        Ok(parse_meminfo(&text)?)
    }

    pub async fn get_mem_usage(&self) -> Result<SystemMemory, HandlerError> {
        self.read_meminfo().await
    }

    pub async fn start_mem_measurement(&self, interval: Duration) -> Result<(), HandlerError> {
        let session = self.base.session.clone();
        self.mem_sampler
            .start(
                "mem",
                interval,
                move || {
                    let session = session.clone();
                    async move {
                        let text = session.run_command("cat /proc/meminfo", None, None, None).await?;
                        parse_meminfo(&text).map_err(HandlerError::from)
                    }
                },
                stateless_fold(|m: &SystemMemory| m.clone()),
            )
            .await?;
        Ok(())
    }

    pub async fn stop_mem_measurement(&self) -> Result<MemoryList, HandlerError> {
        let (_raw, processed) = self.mem_sampler.stop("mem").await?;
        Ok(processed.into())
    }

    async fn read_proc_wise_snapshot(&self) -> Result<ProcWiseSnapshot, HandlerError> {
        let text = self.base.run(&proc_wise_command()).await?;
        Ok(parse_proc_wise_snapshot(&text)?)
    }

    pub async fn get_cpu_usage_proc_wise(
        &self,
        interval: Duration,
    ) -> Result<Vec<CpuSampleProcessInfo>, HandlerError> {
        let prev = self.read_proc_wise_snapshot().await?;
        tokio::time::sleep(interval).await;
        let curr = self.read_proc_wise_snapshot().await?;
        let deltas = proc_wise_cpu_delta(&prev, &curr);
        let timestamp = Utc::now();
        let tick: HashMap<Process, CpuSample> = deltas
            .into_iter()
            .map(|(p, cpu_load)| (p, CpuSample { cpu_load, timestamp }))
            .collect();
        Ok(group_process_samples(vec![tick]))
    }

    pub async fn start_cpu_measurement_proc_wise(&self, interval: Duration) -> Result<(), HandlerError> {
        let session = self.base.session.clone();
        self.cpu_proc_sampler
            .start(
                "cpu_proc",
                interval,
                move || {
                    let session = session.clone();
                    async move {
                        let text = session.run_command(&proc_wise_command(), None, None, None).await?;
                        parse_proc_wise_snapshot(&text).map_err(HandlerError::from)
                    }
                },
                differencing_fold(|prev, curr| {
                    let deltas = proc_wise_cpu_delta(prev, curr);
                    let timestamp = Utc::now();
                    deltas
                        .into_iter()
                        .map(|(p, cpu_load)| (p, CpuSample { cpu_load, timestamp }))
                        .collect()
                }),
            )
            .await?;
        Ok(())
    }

    pub async fn stop_cpu_measurement_proc_wise(&self) -> Result<Vec<CpuSampleProcessInfo>, HandlerError> {
        let (_raw, ticks) = self.cpu_proc_sampler.stop("cpu_proc").await?;
        Ok(group_process_samples(ticks))
    }

    pub async fn get_mem_usage_proc_wise(&self) -> Result<Vec<MemorySampleProcessInfo>, HandlerError> {
        let snapshot = self.read_proc_wise_snapshot().await?;
        let mem = proc_wise_memory(&snapshot);
        let timestamp = Utc::now();
        let tick: HashMap<Process, MemorySample> = mem
            .into_iter()
            .map(|(p, mem_usage)| (p, MemorySample { mem_usage, timestamp }))
            .collect();
        Ok(group_process_samples(vec![tick]))
    }

    pub async fn start_mem_measurement_proc_wise(&self, interval: Duration) -> Result<(), HandlerError> {
        let session = self.base.session.clone();
        self.mem_proc_sampler
            .start(
                "mem_proc",
                interval,
                move || {
                    let session = session.clone();
                    async move {
                        let text = session.run_command(&proc_wise_command(), None, None, None).await?;
                        parse_proc_wise_snapshot(&text).map_err(HandlerError::from)
                    }
                },
                stateless_fold(|snapshot: &ProcWiseSnapshot| {
                    let mem = proc_wise_memory(snapshot);
                    let timestamp = Utc::now();
                    mem.into_iter()
                        .map(|(p, mem_usage)| (p, MemorySample { mem_usage, timestamp }))
                        .collect()
                }),
            )
            .await?;
        Ok(())
    }

    pub async fn stop_mem_measurement_proc_wise(&self) -> Result<Vec<MemorySampleProcessInfo>, HandlerError> {
        let (_raw, ticks) = self.mem_proc_sampler.stop("mem_proc").await?;
        Ok(group_process_samples(ticks))
    }

    pub async fn get_diskinfo(&self) -> Result<DiskInfoList, HandlerError> {
        let text = self.base.run("df -k").await?;
        let disks: Vec<DiskInfo> = crate::parse::linux::parse_df(&text)?;
        Ok(disks.into())
    }

    async fn read_diskstats(&self) -> Result<HashMap<String, DiskIOInfo>, HandlerError> {
        let text = self.base.run("cat /proc/diskstats").await?;
        Ok(parse_diskstats(&text)?)
    }

    /// Per-device disk I/O counters, diffed over `interval`.
    pub async fn get_diskio(&self, interval: Duration) -> Result<HashMap<String, DiskIOInfo>, HandlerError> {
        let prev = self.read_diskstats().await?;
        tokio::time::sleep(interval).await;
        let curr = self.read_diskstats().await?;
        Ok(curr
            .into_iter()
            .filter_map(|(device, after)| {
                let before = prev.get(&device)?;
                Some((
                    device,
                    DiskIOInfo {
                        reads_completed: after.reads_completed.saturating_sub(before.reads_completed),
                        reads_merged: after.reads_merged.saturating_sub(before.reads_merged),
                        sectors_read: after.sectors_read.saturating_sub(before.sectors_read),
                        time_reading_ms: after.time_reading_ms.saturating_sub(before.time_reading_ms),
                        writes_completed: after.writes_completed.saturating_sub(before.writes_completed),
                        writes_merged: after.writes_merged.saturating_sub(before.writes_merged),
                        sectors_written: after.sectors_written.saturating_sub(before.sectors_written),
                        time_writing_ms: after.time_writing_ms.saturating_sub(before.time_writing_ms),
                        io_in_progress: after.io_in_progress,
                        time_io_ms: after.time_io_ms.saturating_sub(before.time_io_ms),
                        weighted_time_io_ms: after
                            .weighted_time_io_ms
                            .saturating_sub(before.weighted_time_io_ms),
                        timestamp: after.timestamp,
                    },
                ))
            })
            .collect())
    }

    /// Per-process I/O counters, diffed over `interval`, for the given
    /// `pids`.
    pub async fn get_diskio_proc_wise(
        &self,
        pids: &[u32],
        interval: Duration,
    ) -> Result<HashMap<u32, DiskIOProcessSample>, HandlerError> {
        let prev = self.read_proc_io_for(pids).await?;
        tokio::time::sleep(interval).await;
        let curr = self.read_proc_io_for(pids).await?;
        Ok(curr
            .into_iter()
            .filter_map(|(pid, after)| {
                let before = prev.get(&pid)?;
                Some((
                    pid,
                    DiskIOProcessSample {
                        rchar: after.rchar.saturating_sub(before.rchar),
                        wchar: after.wchar.saturating_sub(before.wchar),
                        syscr: after.syscr.saturating_sub(before.syscr),
                        syscw: after.syscw.saturating_sub(before.syscw),
                        read_bytes: after.read_bytes.saturating_sub(before.read_bytes),
                        write_bytes: after.write_bytes.saturating_sub(before.write_bytes),
                        cancelled_write_bytes: after.cancelled_write_bytes - before.cancelled_write_bytes,
                        timestamp: after.timestamp,
                    },
                ))
            })
            .collect())
    }

    async fn read_proc_io_for(&self, pids: &[u32]) -> Result<HashMap<u32, DiskIOProcessSample>, HandlerError> {
        let mut out = HashMap::new();
        for &pid in pids {
            let text = self.base.run(&format!("cat /proc/{pid}/io")).await?;
            out.insert(pid, parse_proc_io(&text)?);
        }
        Ok(out)
    }

    async fn read_net_dev(&self) -> Result<(chrono::DateTime<Utc>, Vec<NetworkInterfaceSample>), HandlerError> {
        let text = self.base.run("date -Iseconds && cat /proc/net/dev").await?;
        Ok(parse_net_dev(&text)?)
    }

    pub async fn get_network_usage(
        &self,
        interval: Duration,
    ) -> Result<NetworkInterfaceDeltaList, HandlerError> {
        let (_, before) = self.read_net_dev().await?;
        tokio::time::sleep(interval).await;
        let (after_ts, after) = self.read_net_dev().await?;
        let by_name: HashMap<&str, &NetworkInterfaceSample> =
            before.iter().map(|s| (s.interface.as_str(), s)).collect();

        let elapsed = interval.as_secs_f64();
        let deltas: Vec<NetworkInterfaceDeltaSample> = after
            .iter()
            .filter_map(|after_sample| {
                let before_sample = by_name.get(after_sample.interface.as_str())?;
                Some(NetworkInterfaceDeltaSample::from_delta(before_sample, after_sample, elapsed))
            })
            .map(|mut d| {
                d.timestamp = after_ts;
                d
            })
            .collect();
        Ok(deltas.into())
    }

    pub async fn get_network_usage_total(&self, interval: Duration) -> Result<f64, HandlerError> {
        let deltas = self.get_network_usage(interval).await?;
        Ok(deltas.iter().map(|d| d.rate()).sum())
    }

    pub async fn get_pressure(&self) -> Result<PressureInfo, HandlerError> {
        self.base.require_capability("cat").await?;
        let text = self
            .base
            .run("cat /proc/pressure/cpu; echo ---; cat /proc/pressure/io; echo ---; cat /proc/pressure/memory")
            .await?;
        let mut parts = text.split("---");
        let cpu = parts.next().unwrap_or_default();
        let io = parts.next().unwrap_or_default();
        let memory = parts.next().unwrap_or_default();
        Ok(parse_pressure(cpu, io, memory)?)
    }

    pub async fn get_boot_time(&self) -> Result<BootTimeInfo, HandlerError> {
        if self.base.has_capability("systemd-analyze").await? {
            let text = self.base.run("systemd-analyze").await?;
            let boot_time_seconds = parse_systemd_analyze(&text)?;
            return Ok(BootTimeInfo {
                boot_time_seconds,
                timestamp: Utc::now(),
            });
        }
        Err(crate::error::CapabilityMissingError("systemd-analyze".into()).into())
    }

    pub async fn get_system_uptime(&self) -> Result<SystemUptimeInfo, HandlerError> {
        let text = self.base.run("cat /proc/uptime").await?;
        let uptime_seconds = parse_proc_uptime(&text)?;
        Ok(SystemUptimeInfo {
            uptime_seconds,
            timestamp: Utc::now(),
        })
    }
}

/// Android's equivalent boot-time recipe (`bootstat`), reused by
/// [`super::android::AndroidHandler`] since the rest of the Linux
/// parsing recipes apply unchanged on an Android guest shell.
pub async fn android_boot_time<T: Transport>(base: &BaseHandler<T>) -> Result<BootTimeInfo, HandlerError> {
    let text = base.run("/system/bin/bootstat -p").await?;
    let boot_time_seconds = parse_bootstat(&text)?;
    Ok(BootTimeInfo {
        boot_time_seconds,
        timestamp: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::AttemptError;
    use async_trait::async_trait;
    use std::path::Path;

    #[test]
    fn proc_wise_command_substitutes_separator_token() {
        let cmd = proc_wise_command();
        assert!(cmd.contains(DEFAULT_SEPARATOR_TOKEN));
        assert!(!cmd.contains("SEPARATOR_TOKEN"));
    }

    /// Responds to whichever command the handler issues with a fixed
    /// canned output, keyed by a substring match (fast enough for unit
    /// tests and readable without a full shell).
    struct FakeTransport {
        responses: Vec<(&'static str, &'static str)>,
    }

    #[async_trait]
    impl Transport for FakeTransport {
        async fn connect(&self) -> Result<(), crate::error::TransportError> {
            Ok(())
        }
        async fn disconnect(&self) -> Result<(), crate::error::TransportError> {
            Ok(())
        }
        async fn is_connected(&self) -> bool {
            true
        }
        async fn run_command_once(&self, cmd: &str, _timeout: Duration) -> Result<String, AttemptError> {
            for (needle, output) in &self.responses {
                if cmd.contains(needle) {
                    return Ok(output.to_string());
                }
            }
            Err(AttemptError::Fatal(crate::error::TransportError::CommandFailed {
                command: cmd.to_string(),
                reason: "no canned response".into(),
            }))
        }
        async fn probe_alive(&self) -> bool {
            true
        }
        async fn pull_file_once(&self, _remote: &str, _local: &Path) -> Result<(), AttemptError> {
            unimplemented!("not exercised by these tests")
        }
        async fn push_file_once(&self, _local: &Path, _remote: &str) -> Result<(), AttemptError> {
            unimplemented!("not exercised by these tests")
        }
        fn host_label(&self) -> String {
            "fake".into()
        }
    }

    fn fake_session(responses: Vec<(&'static str, &'static str)>) -> Arc<Session<FakeTransport>> {
        Arc::new(Session::new(
            FakeTransport { responses },
            Duration::from_secs(5),
            0,
        ))
    }

    #[tokio::test]
    async fn get_mem_usage_reads_and_parses_proc_meminfo() {
        let meminfo = "MemTotal:        8000000 kB\n\
                        MemFree:         2000000 kB\n\
                        MemAvailable:    3000000 kB\n\
                        Buffers:          100000 kB\n\
                        Cached:           500000 kB\n\
                        SReclaimable:      50000 kB\n\
                        Shmem:             10000 kB\n";
        let session = fake_session(vec![("/proc/meminfo", meminfo)]);
        let handler = LinuxHandler::new(session, "/tmp");

        let mem = handler.get_mem_usage().await.unwrap();
        match mem.mem {
            crate::record::types::MemoryKind::Extended(extended) => {
                assert_eq!(extended.total, 8000000);
                assert_eq!(extended.available, 3000000);
            }
            other => panic!("expected Extended variant, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn get_diskinfo_parses_df_k_output() {
        let session = fake_session(vec![(
            "df -k",
            "Filesystem 1K-blocks Used Available Use% Mounted\n/dev/sda1 100 50 50 50% /\n",
        )]);
        let handler = LinuxHandler::new(session, "/tmp");
        let disks = handler.get_diskinfo().await.unwrap();
        assert_eq!(disks.len(), 1);
    }
}
