//! `ModelList<T>`: an ordered collection of records with filtering,
//! path-based sorting, index/slice access, and arithmetic/`highest_X`
//! specializations for the concrete record types.

use std::ops::{Index, Range};

use serde::Serialize;

use super::path::sort_by_path;
use super::types::{
    CpuSampleProcessInfo, CpuUsage, DiskInfo, MemorySampleProcessInfo, NetworkInterfaceDeltaSample,
    SystemMemory,
};
use super::Arithmetic;

/// An ordered collection of records. Slicing returns the same
/// concrete collection type; filtering is a pure projection.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelList<T>(Vec<T>);

impl<T> Default for ModelList<T> {
    fn default() -> Self {
        Self(Vec::new())
    }
}

impl<T> FromIterator<T> for ModelList<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<T> From<Vec<T>> for ModelList<T> {
    fn from(v: Vec<T>) -> Self {
        Self(v)
    }
}

impl<T> IntoIterator for ModelList<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;
    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a, T> IntoIterator for &'a ModelList<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;
    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl<T> Index<usize> for ModelList<T> {
    type Output = T;
    fn index(&self, idx: usize) -> &T {
        &self.0[idx]
    }
}

impl<T: Clone> ModelList<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self(items)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.0
    }

    /// Returns the same concrete collection type containing only
    /// elements for which `pred` returns true.
    pub fn filter(&self, pred: impl Fn(&T) -> bool) -> Self {
        Self(self.0.iter().filter(|item| pred(item)).cloned().collect())
    }

    /// A bracketed range slice, preserving the collection type.
    pub fn slice(&self, range: Range<usize>) -> Self {
        let end = range.end.min(self.0.len());
        let start = range.start.min(end);
        Self(self.0[start..end].to_vec())
    }

    pub fn sort_by_path(&self, path: &str, reverse: bool) -> Self
    where
        T: Serialize,
    {
        Self(sort_by_path(
            &self.0,
            |item| serde_json::to_value(item).expect("record always serializes"),
            path,
            reverse,
        ))
    }
}

impl<T: Arithmetic + Clone> ModelList<T> {
    /// Sum of elements divided by length, element-wise via the
    /// record's arithmetic implementation.
    pub fn avg(&self) -> Option<T> {
        let mut iter = self.0.iter();
        let first = iter.next()?.clone();
        let summed = iter.fold(first, |acc, item| acc.add(item));
        Some(summed.div_scalar(self.0.len() as f64))
    }
}

pub type CpuList = ModelList<CpuUsage>;
pub type MemoryList = ModelList<SystemMemory>;
pub type DiskInfoList = ModelList<DiskInfo>;
pub type ProcessCpuList = ModelList<CpuSampleProcessInfo>;
pub type ProcessMemoryList = ModelList<MemorySampleProcessInfo>;
pub type NetworkInterfaceDeltaList = ModelList<NetworkInterfaceDeltaSample>;

impl CpuList {
    /// Highest system load observed, at most `n` entries.
    pub fn highest_load(&self, n: usize) -> Self {
        let mut sorted = self.sort_by_path("load", true);
        sorted.0.truncate(n);
        sorted
    }
}

impl MemoryList {
    /// Highest memory used observed, at most `n` entries.
    pub fn highest_memory_used(&self, n: usize) -> Self {
        let mut items = self.0.clone();
        items.sort_by(|a, b| mem_used(b).cmp(&mem_used(a)));
        items.truncate(n);
        Self(items)
    }
}

fn mem_used(s: &SystemMemory) -> u64 {
    match &s.mem {
        super::types::MemoryKind::Basic(m) => m.used,
        super::types::MemoryKind::Extended(m) => m.used,
    }
}

impl ProcessCpuList {
    /// Highest average per-process CPU load, at most `n` entries.
    pub fn highest_average_cpu(&self, n: usize) -> Self {
        let mut items = self.0.clone();
        items.sort_by(|a, b| {
            let av = a.avg().map(|s| s.cpu_load).unwrap_or(0.0);
            let bv = b.avg().map(|s| s.cpu_load).unwrap_or(0.0);
            bv.total_cmp(&av)
        });
        items.truncate(n);
        Self(items)
    }

    /// Highest peak per-process CPU load, at most `n` entries.
    pub fn highest_peak_cpu(&self, n: usize) -> Self {
        let mut items = self.0.clone();
        items.sort_by(|a, b| {
            let av = a.max_cpu_load().map(|s| s.cpu_load).unwrap_or(0.0);
            let bv = b.max_cpu_load().map(|s| s.cpu_load).unwrap_or(0.0);
            bv.total_cmp(&av)
        });
        items.truncate(n);
        Self(items)
    }
}

impl ProcessMemoryList {
    /// Highest average per-process memory usage, at most `n` entries.
    pub fn highest_average_memory(&self, n: usize) -> Self {
        let mut items = self.0.clone();
        items.sort_by(|a, b| {
            let av = a.avg().map(|s| s.mem_usage).unwrap_or(0.0);
            let bv = b.avg().map(|s| s.mem_usage).unwrap_or(0.0);
            bv.total_cmp(&av)
        });
        items.truncate(n);
        Self(items)
    }

    /// Highest peak per-process memory usage, at most `n` entries.
    pub fn highest_peak_memory(&self, n: usize) -> Self {
        let mut items = self.0.clone();
        items.sort_by(|a, b| {
            let av = a.max_mem_usage().map(|s| s.mem_usage).unwrap_or(0.0);
            let bv = b.max_mem_usage().map(|s| s.mem_usage).unwrap_or(0.0);
            bv.total_cmp(&av)
        });
        items.truncate(n);
        Self(items)
    }
}

impl NetworkInterfaceDeltaList {
    /// Interfaces that moved any bytes in either direction.
    pub fn active(&self) -> Self {
        self.filter(|s| s.is_active())
    }

    /// Highest average read (rx) byte rate, at most `n` entries.
    pub fn highest_average_read_bytes(&self, n: usize) -> Self {
        let mut items = self.0.clone();
        items.sort_by(|a, b| b.rx_bytes.total_cmp(&a.rx_bytes));
        items.truncate(n);
        Self(items)
    }

    /// Highest average write (tx) byte rate, at most `n` entries.
    pub fn highest_average_write_bytes(&self, n: usize) -> Self {
        let mut items = self.0.clone();
        items.sort_by(|a, b| b.tx_bytes.total_cmp(&a.tx_bytes));
        items.truncate(n);
        Self(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_is_idempotent_for_total_predicates() {
        let list: ModelList<i32> = ModelList::new(vec![1, 2, 3, 4, 5]);
        let evens = list.filter(|v| v % 2 == 0);
        let evens_again = evens.filter(|v| v % 2 == 0);
        assert_eq!(evens, evens_again);
    }

    #[test]
    fn slice_preserves_collection_type() {
        let list: ModelList<i32> = ModelList::new(vec![1, 2, 3, 4, 5]);
        let sliced: ModelList<i32> = list.slice(1..3);
        assert_eq!(sliced.as_slice(), &[2, 3]);
    }
}
