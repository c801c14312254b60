//! Host telemetry

use serde::{Deserialize, Serialize};
use sysinfo::{System, MINIMUM_CPU_UPDATE_INTERVAL};

const MIB: u64 = 1024 * 1024;

/// Host readings returned by the host info endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostInfo {
    /// CPU usage percentage (0-100)
    pub cpu_usage: f32,

    /// Used memory in MiB
    pub memory_used_mb: u64,

    /// Available memory in MiB
    pub memory_available_mb: u64,

    /// Total memory in MiB
    pub memory_total_mb: u64,

    /// Number of CPU cores
    pub cpu_count: usize,

    /// System uptime in seconds
    pub uptime_secs: u64,

    /// Hostname
    pub hostname: String,
}

/// Collect host readings. CPU usage needs two samples, so this waits for
/// sysinfo's minimum update interval.
pub async fn collect_host_info() -> HostInfo {
    let mut sys = System::new();
    sys.refresh_cpu_usage();
    tokio::time::sleep(MINIMUM_CPU_UPDATE_INTERVAL).await;
    sys.refresh_cpu_usage();
    sys.refresh_memory();

    HostInfo {
        cpu_usage: sys.global_cpu_usage(),
        memory_used_mb: sys.used_memory() / MIB,
        memory_available_mb: sys.available_memory() / MIB,
        memory_total_mb: sys.total_memory() / MIB,
        cpu_count: sys.cpus().len(),
        uptime_secs: System::uptime(),
        hostname: System::host_name().unwrap_or_else(|| "unknown".to_string()),
    }
}
