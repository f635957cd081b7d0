//! System resource snapshot
//!
//! Probes memory, CPU and disk through `sysinfo`. Probing blocks for a short
//! CPU sampling interval, so async callers should run it on a blocking thread.

use std::path::Path;
use serde::{Deserialize, Serialize};
use sysinfo::{CpuExt, DiskExt, System, SystemExt};
use tracing::debug;

use common::utils::{bytes_to_gb, format_bytes};

/// Memory information
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryInfo {
    pub total_bytes: u64,
    pub available_bytes: u64,
    pub used_bytes: u64,
    pub usage_percent: f32,
}

impl MemoryInfo {
    /// Total memory in GB
    pub fn total_gb(&self) -> f64 {
        bytes_to_gb(self.total_bytes)
    }

    /// Available memory in GB
    pub fn available_gb(&self) -> f64 {
        bytes_to_gb(self.available_bytes)
    }
}

/// CPU information
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CpuInfo {
    pub logical_cores: usize,
    pub physical_cores: usize,
    pub usage_percent: f32,
}

/// Disk information for the volume holding the root mount point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiskInfo {
    pub total_bytes: u64,
    pub free_bytes: u64,
}

impl DiskInfo {
    /// Free space in GB
    pub fn free_gb(&self) -> f64 {
        bytes_to_gb(self.free_bytes)
    }
}

/// Point-in-time view of host resources
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemResources {
    pub memory: MemoryInfo,
    pub cpu: CpuInfo,
    pub disk: DiskInfo,
}

impl SystemResources {
    /// Probes the host
    pub fn probe() -> Self {
        let mut system = System::new();
        system.refresh_memory();
        system.refresh_cpu();
        std::thread::sleep(System::MINIMUM_CPU_UPDATE_INTERVAL);
        system.refresh_cpu();
        system.refresh_disks_list();

        let total = system.total_memory();
        let available = system.available_memory();
        let used = system.used_memory();
        let memory = MemoryInfo {
            total_bytes: total,
            available_bytes: available,
            used_bytes: used,
            usage_percent: if total > 0 {
                (used as f32 / total as f32) * 100.0
            } else {
                0.0
            },
        };

        let cpu = CpuInfo {
            logical_cores: num_cpus::get(),
            physical_cores: num_cpus::get_physical(),
            usage_percent: system.global_cpu_info().cpu_usage(),
        };

        // Prefer the root volume; fall back to the sum of all disks
        let disk = system
            .disks()
            .iter()
            .find(|disk| disk.mount_point() == Path::new("/"))
            .map(|disk| DiskInfo {
                total_bytes: disk.total_space(),
                free_bytes: disk.available_space(),
            })
            .unwrap_or_else(|| DiskInfo {
                total_bytes: system.disks().iter().map(|d| d.total_space()).sum(),
                free_bytes: system.disks().iter().map(|d| d.available_space()).sum(),
            });

        debug!(
            total_memory = %format_bytes(total),
            available_memory = %format_bytes(available),
            cores = cpu.logical_cores,
            "Probed system resources"
        );

        Self { memory, cpu, disk }
    }
}
