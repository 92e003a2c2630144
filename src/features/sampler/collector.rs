use crate::features::snapshot::models::is_percentage;
use crate::features::snapshot::{Bandwidth, Snapshot, SnapshotBuilder};
use crate::shared::config::AgentConfig;
use crate::shared::error::{CollectionError, Metric};
use crate::shared::traits::{DataCollector, MetricSource};
use log::debug;
use std::path::{Path, PathBuf};
use std::time::Duration;
#[cfg(unix)]
use nix::sys::statvfs::statvfs;
#[cfg(not(unix))]
use sysinfo::Disks;
use sysinfo::{CpuRefreshKind, MemoryRefreshKind, Networks, RefreshKind, System};

/// Reads host counters through sysinfo.
pub struct SystemMetricSource {
    sys: System,
}

impl SystemMetricSource {
    pub fn new() -> Self {
        let sys = System::new_with_specifics(
            RefreshKind::nothing()
                .with_cpu(CpuRefreshKind::nothing().with_cpu_usage())
                .with_memory(MemoryRefreshKind::nothing().with_ram()),
        );
        Self { sys }
    }
}

impl Default for SystemMetricSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricSource for SystemMetricSource {
    fn cpu_utilization(&mut self, window: Duration) -> Result<f64, CollectionError> {
        // sysinfo needs two refreshes at least MINIMUM_CPU_UPDATE_INTERVAL apart
        self.sys.refresh_cpu_usage();
        std::thread::sleep(window.max(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL));
        self.sys.refresh_cpu_usage();

        if self.sys.cpus().is_empty() {
            return Err(CollectionError::unavailable(Metric::Cpu, "no CPU information available"));
        }
        Ok(self.sys.global_cpu_usage() as f64)
    }

    fn memory_utilization(&mut self) -> Result<f64, CollectionError> {
        self.sys.refresh_memory();
        let total = self.sys.total_memory();
        if total == 0 {
            return Err(CollectionError::unavailable(Metric::Memory, "total memory reported as zero"));
        }
        Ok(self.sys.used_memory() as f64 / total as f64 * 100.0)
    }

    #[cfg(unix)]
    fn disk_usage(&mut self, mount: &Path) -> Result<f64, CollectionError> {
        let stat = statvfs(mount).map_err(|e| {
            CollectionError::unavailable(Metric::Disk, format!("statvfs {}: {}", mount.display(), e))
        })?;
        used_percent(
            u64::from(stat.blocks()),
            u64::from(stat.blocks_free()),
            u64::from(stat.blocks_available()),
        )
        .ok_or_else(|| {
            CollectionError::unavailable(
                Metric::Disk,
                format!("filesystem at {} reports zero size", mount.display()),
            )
        })
    }

    #[cfg(not(unix))]
    fn disk_usage(&mut self, mount: &Path) -> Result<f64, CollectionError> {
        let disks = Disks::new_with_refreshed_list();
        let disk = disks
            .list()
            .iter()
            .find(|disk| disk.mount_point() == mount)
            .ok_or_else(|| {
                CollectionError::unavailable(
                    Metric::Disk,
                    format!("no filesystem mounted at {}", mount.display()),
                )
            })?;

        // sysinfo has no separate free count here, so free == available
        let total = disk.total_space();
        let available = disk.available_space();
        used_percent(total, available, available).ok_or_else(|| {
            CollectionError::unavailable(
                Metric::Disk,
                format!("filesystem at {} reports zero size", mount.display()),
            )
        })
    }

    fn bandwidth(&mut self) -> Result<Bandwidth, CollectionError> {
        let networks = Networks::new_with_refreshed_list();
        if networks.list().is_empty() {
            return Err(CollectionError::unavailable(Metric::Bandwidth, "no network interfaces found"));
        }

        let mut bandwidth = Bandwidth::default();
        for data in networks.list().values() {
            bandwidth.bytes_sent = bandwidth.bytes_sent.saturating_add(data.total_transmitted());
            bandwidth.bytes_recv = bandwidth.bytes_recv.saturating_add(data.total_received());
        }
        Ok(bandwidth)
    }
}

/// Used share of the space visible to unprivileged users, as `df` reports it:
/// `used / (used + available)` with `used = total - free`. Blocks reserved for
/// root are counted as neither. `None` when the filesystem has no usable space.
pub(crate) fn used_percent(total: u64, free: u64, available: u64) -> Option<f64> {
    let used = total.saturating_sub(free);
    let usable = used.saturating_add(available);
    if usable == 0 {
        return None;
    }
    Some(used as f64 / usable as f64 * 100.0)
}

/// Turns four independent reads into one [`Snapshot`], or nothing at all.
pub struct Sampler<S> {
    source: S,
    mount_path: PathBuf,
    cpu_window: Duration,
}

impl<S: MetricSource> Sampler<S> {
    pub fn new(source: S, mount_path: impl Into<PathBuf>, cpu_window: Duration) -> Self {
        Self {
            source,
            mount_path: mount_path.into(),
            cpu_window,
        }
    }

    pub fn from_config(source: S, config: &AgentConfig) -> Self {
        Self::new(source, config.mount_path.clone(), config.cpu_window())
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    fn internal_validate(&self) -> Result<(), CollectionError> {
        if self.mount_path.is_absolute() {
            Ok(())
        } else {
            Err(CollectionError::unavailable(
                Metric::Disk,
                format!("mount path {} is not absolute", self.mount_path.display()),
            ))
        }
    }
}

fn percentage(metric: Metric, value: f64) -> Result<f64, CollectionError> {
    if is_percentage(value) {
        Ok(value)
    } else {
        Err(CollectionError::unavailable(
            metric,
            format!("reading {} is outside 0..=100", value),
        ))
    }
}

impl<S: MetricSource> DataCollector<Snapshot> for Sampler<S> {
    fn collect(&mut self) -> Result<Snapshot, CollectionError> {
        let cpu = percentage(Metric::Cpu, self.source.cpu_utilization(self.cpu_window)?)?;
        let memory = percentage(Metric::Memory, self.source.memory_utilization()?)?;
        let disk = percentage(Metric::Disk, self.source.disk_usage(&self.mount_path)?)?;
        let bandwidth = self.source.bandwidth()?;

        // every percentage is already checked, so the builder only confirms it
        let snapshot = SnapshotBuilder::new()
            .cpu_utilization(cpu)
            .memory_utilization(memory)
            .disk_usage(disk)
            .bandwidth_usage(bandwidth)
            .build()
            .map_err(|e| CollectionError::Aborted(format!("snapshot rejected: {}", e)))?;

        debug!(
            "Sampled cpu={:.1}% mem={:.1}% disk={:.1}% sent={} recv={}",
            snapshot.cpu_utilization,
            snapshot.memory_utilization,
            snapshot.disk_usage,
            snapshot.bandwidth_usage.bytes_sent,
            snapshot.bandwidth_usage.bytes_recv
        );
        Ok(snapshot)
    }

    fn validate(&self) -> Result<(), CollectionError> {
        self.internal_validate()
    }

    fn health_check(&self) -> bool {
        self.internal_validate().is_ok()
    }
}
