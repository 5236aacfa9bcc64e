//! Handlers: the per-OS programmatic surface (§6) wiring a
//! [`crate::transport::Session`], the command recipes in §4.4, and the
//! sampling engine together into `get_*`/`start_*_measurement`/
//! `stop_*_measurement` methods.

pub mod android;
pub mod linux;
pub mod qnx;

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;

use crate::error::{CapabilityMissingError, HandlerError};
use crate::record::types::{Process, ProcessInfo};
use crate::transport::{Session, Transport};

/// Shared plumbing every OS-specific handler wraps: the session, a
/// scratch directory for delegated-execution output files, and a
/// capability cache so `command -v` is issued at most once per binary
/// name per handler lifetime.
pub struct BaseHandler<T: Transport> {
    pub session: Arc<Session<T>>,
    pub tmp_dir: String,
    capabilities: DashMap<String, bool>,
}

impl<T: Transport> BaseHandler<T> {
    pub fn new(session: Arc<Session<T>>, tmp_dir: impl Into<String>) -> Self {
        Self {
            session,
            tmp_dir: tmp_dir.into(),
            capabilities: DashMap::new(),
        }
    }

    /// Runs `command -v <name>` once per `name` and caches the result,
    /// the way `_has_capability` does in the source this was ported
    /// from.
    pub async fn has_capability(&self, name: &str) -> Result<bool, HandlerError> {
        if let Some(cached) = self.capabilities.get(name) {
            return Ok(*cached);
        }
        let cmd = format!("command -v {name}");
        let present = match self.session.run_command(&cmd, Some(0), None, None).await {
            Ok(output) => !output.trim().is_empty(),
            Err(_) => false,
        };
        self.capabilities.insert(name.to_string(), present);
        Ok(present)
    }

    pub async fn require_capability(&self, name: &str) -> Result<(), HandlerError> {
        if self.has_capability(name).await? {
            Ok(())
        } else {
            Err(CapabilityMissingError(name.to_string()).into())
        }
    }

    pub async fn run(&self, cmd: &str) -> Result<String, HandlerError> {
        Ok(self.session.run_command(cmd, None, None, None).await?)
    }
}

/// Groups a series of per-tick `{Process: sample}` snapshots into one
/// [`ProcessInfo`] timeseries per process, preserving tick order and
/// dropping a process from ticks where it was not observed (it either
/// hadn't started yet or had already exited).
pub fn group_process_samples<S: Clone>(ticks: Vec<HashMap<Process, S>>) -> Vec<ProcessInfo<S>> {
    let mut by_process: HashMap<Process, Vec<S>> = HashMap::new();
    for tick in ticks {
        for (process, sample) in tick {
            by_process.entry(process).or_default().push(sample);
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
    fn group_process_samples_preserves_tick_order_per_process() {
        let p1 = Process {
            pid: 1,
            name: "a".into(),
            command: "a".into(),
            start_time: "1".into(),
        };
        let p2 = Process {
            pid: 2,
            name: "b".into(),
            command: "b".into(),
            start_time: "1".into(),
        };
        let mut tick1 = HashMap::new();
        tick1.insert(p1.clone(), 10u32);
        tick1.insert(p2.clone(), 20u32);
        let mut tick2 = HashMap::new();
        tick2.insert(p1.clone(), 11u32);

        let grouped = group_process_samples(vec![tick1, tick2]);
        let p1_info = grouped.iter().find(|g| g.pid == 1).unwrap();
        assert_eq!(p1_info.samples, vec![10, 11]);
        let p2_info = grouped.iter().find(|g| g.pid == 2).unwrap();
        assert_eq!(p2_info.samples, vec![20]);
    }
}
