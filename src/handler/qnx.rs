//! QNX handler: `hogs`/`pidin`-based recipes (§4.4), including the
//! delegated-execution sampler for process-wise measurements and the
//! `rss_pid=`/`PIDIN_SEPARATOR` marker trick for process-wise memory.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::error::{CapabilityMissingError, HandlerError};
use crate::fs::RemoteFs;
use crate::parse::qnx::{
    parse_bmetrics_boot_time, parse_df_qnx, parse_hogs_cpu_usage, parse_hogs_pidin_proc_wise,
    parse_mem_usage_from_proc_files, parse_proc_vm_stat, parse_uptime,
};
use crate::record::list::DiskInfoList;
use crate::record::types::{
    BootTimeInfo, CpuSample, CpuSampleProcessInfo, CpuUsage, MemorySample, MemorySampleProcessInfo,
    ProcessInfo, SystemMemory, SystemUptimeInfo,
};
use crate::sampler::{stateless_fold, SamplerRegistry};
use crate::transport::{Session, Transport};

use super::BaseHandler;

const QNX_MIN_INTERVAL: Duration = Duration::from_secs(1);

/// QNX's `hogs` refuses sub-second sampling. An interval below
/// [`QNX_MIN_INTERVAL`] is rejected unless `force` is set, in which
/// case it is rounded up instead.
fn floor_interval(interval: Duration, force: bool) -> Result<Duration, HandlerError> {
    if interval >= QNX_MIN_INTERVAL {
        return Ok(interval);
    }
    if force {
        Ok(QNX_MIN_INTERVAL)
    } else {
        Err(HandlerError::Other(format!(
            "interval {interval:?} is below QNX's 1s sampling floor; pass force=true to round up"
        )))
    }
}

pub struct QnxHandler<T: Transport> {
    base: BaseHandler<T>,
    cpu_sampler: SamplerRegistry<CpuUsage, CpuUsage>,
    cpu_proc_sampler: SamplerRegistry<Vec<CpuSampleProcessInfo>, Vec<CpuSampleProcessInfo>>,
    mem_proc_sampler: SamplerRegistry<Vec<MemorySampleProcessInfo>, Vec<MemorySampleProcessInfo>>,
}

impl<T: Transport + 'static> QnxHandler<T> {
    pub fn new(session: Arc<Session<T>>, tmp_dir: impl Into<String>) -> Self {
        Self {
            base: BaseHandler::new(session, tmp_dir),
            cpu_sampler: SamplerRegistry::new(),
            cpu_proc_sampler: SamplerRegistry::new(),
            mem_proc_sampler: SamplerRegistry::new(),
        }
    }

    pub async fn get_cpu_usage(&self, interval: Duration, force: bool) -> Result<CpuUsage, HandlerError> {
        self.base.require_capability("hogs").await?;
        let interval = floor_interval(interval, force)?;
        let cmd = format!("hogs -i 1 -s {} -% 1000", interval.as_secs());
        let text = self.base.run(&cmd).await?;
        let (load, cores, timestamp) = parse_hogs_cpu_usage(&text, Utc::now())?;
        Ok(CpuUsage {
            load,
            cores,
            mode_usage: None,
            timestamp,
        })
    }

    pub async fn start_cpu_measurement(&self, interval: Duration, force: bool) -> Result<(), HandlerError> {
        self.base.require_capability("hogs").await?;
        let interval = floor_interval(interval, force)?;
        let session = self.base.session.clone();
        self.cpu_sampler
            .start(
                "cpu",
                interval,
                move || {
                    let session = session.clone();
                    async move {
                        let cmd = format!("hogs -i 1 -s {} -% 1000", interval.as_secs());
                        let text = session.run_command(&cmd, None, None, None).await?;
                        let (load, cores, timestamp) = parse_hogs_cpu_usage(&text, Utc::now())
                            .map_err(HandlerError::from)?;
                        Ok(CpuUsage {
                            load,
                            cores,
                            mode_usage: None,
                            timestamp,
                        })
                    }
                },
                stateless_fold(|u: &CpuUsage| u.clone()),
            )
            .await?;
        Ok(())
    }

    pub async fn stop_cpu_measurement(&self) -> Result<Vec<CpuUsage>, HandlerError> {
        let (_raw, processed) = self.cpu_sampler.stop("cpu").await?;
        Ok(processed)
    }

    async fn read_cpu_usage_proc_wise(
        &self,
        interval: Duration,
    ) -> Result<Vec<CpuSampleProcessInfo>, HandlerError> {
        let cmd = format!(
            "hogs -i 1 -s {} && pidin -F \"%a %t %n %A\"",
            interval.as_secs()
        );
        let text = self.base.run(&cmd).await?;
        let timestamp = Utc::now();
        let loads = parse_hogs_pidin_proc_wise(&text, timestamp)?;
        Ok(loads
            .into_iter()
            .map(|(process, cpu_load)| {
                ProcessInfo::from_process(
                    &process,
                    vec![CpuSample { cpu_load, timestamp }],
                )
            })
            .collect())
    }

    pub async fn get_cpu_usage_proc_wise(
        &self,
        interval: Duration,
        force: bool,
    ) -> Result<Vec<CpuSampleProcessInfo>, HandlerError> {
        self.base.require_capability("hogs").await?;
        self.read_cpu_usage_proc_wise(floor_interval(interval, force)?).await
    }

    pub async fn start_cpu_measurement_proc_wise(&self, interval: Duration, force: bool) -> Result<(), HandlerError> {
        self.base.require_capability("hogs").await?;
        let interval = floor_interval(interval, force)?;
        let session = self.base.session.clone();
        self.cpu_proc_sampler
            .start(
                "cpu_proc",
                interval,
                move || {
                    let session = session.clone();
                    async move {
                        let cmd = format!(
                            "hogs -i 1 -s {} && pidin -F \"%a %t %n %A\"",
                            interval.as_secs()
                        );
                        let text = session.run_command(&cmd, None, None, None).await?;
                        let timestamp = Utc::now();
                        let loads = parse_hogs_pidin_proc_wise(&text, timestamp).map_err(HandlerError::from)?;
                        Ok::<_, HandlerError>(
                            loads
                                .into_iter()
                                .map(|(process, cpu_load)| {
                                    ProcessInfo::from_process(
                                        &process,
                                        vec![CpuSample { cpu_load, timestamp }],
                                    )
                                })
                                .collect::<Vec<_>>(),
                        )
                    }
                },
                stateless_fold(|batch: &Vec<CpuSampleProcessInfo>| batch.clone()),
            )
            .await?;
        Ok(())
    }

    pub async fn stop_cpu_measurement_proc_wise(&self) -> Result<Vec<CpuSampleProcessInfo>, HandlerError> {
        let (_raw, batches) = self.cpu_proc_sampler.stop("cpu_proc").await?;
        Ok(merge_process_info_batches(batches))
    }

    pub async fn get_mem_usage(&self) -> Result<SystemMemory, HandlerError> {
        let text = self
            .base
            .run(r#"cat /proc/vm/stats | grep -E "(page_count|pages_free)""#)
            .await?;
        Ok(parse_proc_vm_stat(&text)?)
    }

    async fn read_mem_usage_proc_wise(&self) -> Result<Vec<MemorySampleProcessInfo>, HandlerError> {
        let cmd = r#"for p in /proc/*/as; do pid=$(basename $(dirname "$p")); echo "rss_pid=$pid"; pidin -p "$pid" -F "%R" 2>/dev/null | sed -n '1p' | awk '{print "rss", $1}'; done; echo PIDIN_SEPARATOR; pidin -F "%a %t %n %A""#;
        let text = self.base.run(cmd).await?;
        let timestamp = Utc::now();
        let usages = parse_mem_usage_from_proc_files(&text)?;
        Ok(usages
            .into_iter()
            .map(|(process, mem_usage)| {
                ProcessInfo::from_process(&process, vec![MemorySample { mem_usage, timestamp }])
            })
            .collect())
    }

    pub async fn get_mem_usage_proc_wise(&self) -> Result<Vec<MemorySampleProcessInfo>, HandlerError> {
        self.base.require_capability("pidin").await?;
        self.read_mem_usage_proc_wise().await
    }

    pub async fn start_mem_measurement_proc_wise(&self, interval: Duration, force: bool) -> Result<(), HandlerError> {
        self.base.require_capability("pidin").await?;
        let interval = floor_interval(interval, force)?;
        let session = self.base.session.clone();
        self.mem_proc_sampler
            .start(
                "mem_proc",
                interval,
                move || {
                    let session = session.clone();
                    async move {
                        let cmd = r#"for p in /proc/*/as; do pid=$(basename $(dirname "$p")); echo "rss_pid=$pid"; pidin -p "$pid" -F "%R" 2>/dev/null | sed -n '1p' | awk '{print "rss", $1}'; done; echo PIDIN_SEPARATOR; pidin -F "%a %t %n %A""#;
                        let text = session.run_command(cmd, None, None, None).await?;
                        let timestamp = Utc::now();
                        let usages = parse_mem_usage_from_proc_files(&text).map_err(HandlerError::from)?;
                        Ok::<_, HandlerError>(
                            usages
                                .into_iter()
                                .map(|(process, mem_usage)| {
                                    ProcessInfo::from_process(&process, vec![MemorySample { mem_usage, timestamp }])
                                })
                                .collect::<Vec<_>>(),
                        )
                    }
                },
                stateless_fold(|batch: &Vec<MemorySampleProcessInfo>| batch.clone()),
            )
            .await?;
        Ok(())
    }

    pub async fn stop_mem_measurement_proc_wise(&self) -> Result<Vec<MemorySampleProcessInfo>, HandlerError> {
        let (_raw, batches) = self.mem_proc_sampler.stop("mem_proc").await?;
        Ok(merge_process_info_batches(batches))
    }

    pub async fn get_diskinfo(&self) -> Result<DiskInfoList, HandlerError> {
        let text = self.base.run("df").await?;
        let disks = parse_df_qnx(&text)?;
        Ok(disks.into())
    }

    pub async fn get_boot_time(&self) -> Result<BootTimeInfo, HandlerError> {
        let fs = RemoteFs::new(&self.base.session, self.base.tmp_dir.clone());
        if fs.exists("/dev/bmetrics").await? {
            let text = self.base.run("cat /dev/bmetrics | grep SYS_BOOT_LOADER_END").await?;
            return Ok(parse_bmetrics_boot_time(&text)?);
        }
        Err(CapabilityMissingError("/dev/bmetrics".into()).into())
    }

    pub async fn get_system_uptime(&self) -> Result<SystemUptimeInfo, HandlerError> {
        let text = self.base.run("pidin info; echo QNX_DATE_SEP; date").await?;
        let (pidin_info, date_output) = text
            .split_once("QNX_DATE_SEP")
            .ok_or_else(|| crate::error::ParsingError::new("missing QNX_DATE_SEP marker", &text))?;
        Ok(parse_uptime(pidin_info, date_output)?)
    }
}

/// Flattens per-tick batches of [`ProcessInfo`] (one batch per `hogs`
/// invocation, already containing every process seen in that tick)
/// into one timeseries per process across all ticks.
fn merge_process_info_batches<S: Clone>(batches: Vec<Vec<ProcessInfo<S>>>) -> Vec<ProcessInfo<S>> {
    use std::collections::HashMap;
    let mut by_process: HashMap<crate::record::types::Process, Vec<S>> = HashMap::new();
    for batch in batches {
        for info in batch {
            by_process.entry(info.process()).or_default().extend(info.samples);
        }
    }
    by_process
        .into_iter()
        .map(|(process, samples)| ProcessInfo::from_process(&process, samples))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn floor_interval_rejects_sub_second_unless_forced() {
        assert!(floor_interval(Duration::from_millis(200), false).is_err());
        assert_eq!(
            floor_interval(Duration::from_millis(200), true).unwrap(),
            Duration::from_secs(1)
        );
        assert_eq!(
            floor_interval(Duration::from_secs(5), false).unwrap(),
            Duration::from_secs(5)
        );
    }
}
