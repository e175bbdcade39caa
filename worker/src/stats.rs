//! Host metrics collection
//!
//! Every stats tick the worker samples CPU, memory, root-filesystem disk and
//! load averages from the host and publishes the snapshot for the manager (or
//! an operator) to read via `GET /stats`. A metric that cannot be read
//! degrades to zero rather than failing the tick.

use std::path::Path;

use serde::{Deserialize, Serialize};
use sysinfo::{Disks, System};

/// Point-in-time snapshot of the worker host
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct WorkerStats {
    /// Name of the worker the snapshot came from
    pub worker: String,
    /// Aggregate CPU utilization percentage
    pub cpu_usage_percent: f64,
    /// Total physical memory in bytes
    pub mem_total_bytes: u64,
    /// Memory available to new work in bytes
    pub mem_available_bytes: u64,
    /// Memory in use in bytes
    pub mem_used_bytes: u64,
    /// Memory in use as a percentage of total
    pub mem_used_percent: f64,
    /// Root filesystem size in bytes
    pub disk_total_bytes: u64,
    /// Root filesystem free space in bytes
    pub disk_free_bytes: u64,
    /// Root filesystem used space in bytes
    pub disk_used_bytes: u64,
    /// One-minute load average
    pub load_avg_one: f64,
    /// Five-minute load average
    pub load_avg_five: f64,
    /// Fifteen-minute load average
    pub load_avg_fifteen: f64,
    /// Number of task records this worker holds
    pub task_count: usize,
}

/// Samples host metrics into [`WorkerStats`] snapshots.
///
/// Holds the `sysinfo` system handle across ticks so CPU utilization is
/// measured against the previous sample rather than reading as zero.
pub struct StatsCollector {
    worker_name: String,
    system: System,
}

impl StatsCollector {
    pub fn new(worker_name: String) -> Self {
        Self {
            worker_name,
            system: System::new(),
        }
    }

    /// Take one snapshot. `task_count` is supplied by the worker since the
    /// task DB is not a host metric.
    pub fn collect(&mut self, task_count: usize) -> WorkerStats {
        self.system.refresh_memory();
        self.system.refresh_cpu_usage();

        let mem_total_bytes = self.system.total_memory();
        let mem_available_bytes = self.system.available_memory();
        let mem_used_bytes = mem_total_bytes.saturating_sub(mem_available_bytes);
        // Computed in floating point: integer division here rounds every
        // realistic value down to zero.
        let mem_used_percent = if mem_total_bytes == 0 {
            0.0
        } else {
            mem_used_bytes as f64 * 100.0 / mem_total_bytes as f64
        };

        let (disk_total_bytes, disk_free_bytes) = root_disk_space();
        let load = System::load_average();

        WorkerStats {
            worker: self.worker_name.clone(),
            cpu_usage_percent: self.system.global_cpu_usage() as f64,
            mem_total_bytes,
            mem_available_bytes,
            mem_used_bytes,
            mem_used_percent,
            disk_total_bytes,
            disk_free_bytes,
            disk_used_bytes: disk_total_bytes.saturating_sub(disk_free_bytes),
            load_avg_one: load.one,
            load_avg_five: load.five,
            load_avg_fifteen: load.fifteen,
            task_count,
        }
    }
}

/// Total and available space of the root filesystem, or the first disk when
/// no root mount is listed. `(0, 0)` when nothing can be read.
fn root_disk_space() -> (u64, u64) {
    let disks = Disks::new_with_refreshed_list();
    disks
        .list()
        .iter()
        .find(|disk| disk.mount_point() == Path::new("/"))
        .or_else(|| disks.list().first())
        .map(|disk| (disk.total_space(), disk.available_space()))
        .unwrap_or((0, 0))
}
