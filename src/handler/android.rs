//! Android handler: the same `/proc` recipes as desktop Linux, reached
//! over an `adb shell`-flavored transport, with boot time read from
//! `bootstat` instead of `systemd-analyze` and no pressure-stall
//! surface (stock Android kernels rarely expose `/proc/pressure`).

use std::sync::Arc;
use std::time::Duration;

use crate::error::HandlerError;
use crate::record::list::{CpuList, DiskInfoList, MemoryList, NetworkInterfaceDeltaList};
use crate::record::types::{
    BootTimeInfo, CpuSampleProcessInfo, CpuUsage, MemorySampleProcessInfo, SystemMemory,
    SystemUptimeInfo,
};
use crate::transport::{Session, Transport};

use super::linux::{android_boot_time, LinuxHandler};

pub struct AndroidHandler<T: Transport> {
    inner: LinuxHandler<T>,
}

impl<T: Transport + 'static> AndroidHandler<T> {
    pub fn new(session: Arc<Session<T>>, tmp_dir: impl Into<String>) -> Self {
        Self {
            inner: LinuxHandler::new(session, tmp_dir),
        }
    }

    pub async fn get_cpu_usage(&self, interval: Duration) -> Result<CpuUsage, HandlerError> {
        self.inner.get_cpu_usage(interval).await
    }

    pub async fn start_cpu_measurement(&self, interval: Duration) -> Result<(), HandlerError> {
        self.inner.start_cpu_measurement(interval).await
    }

    pub async fn stop_cpu_measurement(&self) -> Result<CpuList, HandlerError> {
        self.inner.stop_cpu_measurement().await
    }

    pub async fn get_mem_usage(&self) -> Result<SystemMemory, HandlerError> {
        self.inner.get_mem_usage().await
    }

    pub async fn start_mem_measurement(&self, interval: Duration) -> Result<(), HandlerError> {
        self.inner.start_mem_measurement(interval).await
    }

    pub async fn stop_mem_measurement(&self) -> Result<MemoryList, HandlerError> {
        self.inner.stop_mem_measurement().await
    }

    pub async fn get_cpu_usage_proc_wise(
        &self,
        interval: Duration,
    ) -> Result<Vec<CpuSampleProcessInfo>, HandlerError> {
        self.inner.get_cpu_usage_proc_wise(interval).await
    }

    pub async fn start_cpu_measurement_proc_wise(&self, interval: Duration) -> Result<(), HandlerError> {
        self.inner.start_cpu_measurement_proc_wise(interval).await
    }

    pub async fn stop_cpu_measurement_proc_wise(&self) -> Result<Vec<CpuSampleProcessInfo>, HandlerError> {
        self.inner.stop_cpu_measurement_proc_wise().await
    }

    pub async fn get_mem_usage_proc_wise(&self) -> Result<Vec<MemorySampleProcessInfo>, HandlerError> {
        self.inner.get_mem_usage_proc_wise().await
    }

    pub async fn start_mem_measurement_proc_wise(&self, interval: Duration) -> Result<(), HandlerError> {
        self.inner.start_mem_measurement_proc_wise(interval).await
    }

    pub async fn stop_mem_measurement_proc_wise(&self) -> Result<Vec<MemorySampleProcessInfo>, HandlerError> {
        self.inner.stop_mem_measurement_proc_wise().await
    }

    pub async fn get_diskinfo(&self) -> Result<DiskInfoList, HandlerError> {
        self.inner.get_diskinfo().await
    }

    pub async fn get_network_usage(&self, interval: Duration) -> Result<NetworkInterfaceDeltaList, HandlerError> {
        self.inner.get_network_usage(interval).await
    }

    pub async fn get_network_usage_total(&self, interval: Duration) -> Result<f64, HandlerError> {
        self.inner.get_network_usage_total(interval).await
    }

    pub async fn get_boot_time(&self) -> Result<BootTimeInfo, HandlerError> {
        android_boot_time(self.inner.base()).await
    }

    pub async fn get_system_uptime(&self) -> Result<SystemUptimeInfo, HandlerError> {
        self.inner.get_system_uptime().await
    }
}
