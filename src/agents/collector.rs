//! Per-host Collector: samples guest/host CPU consumption, mirrors a
//! sliding history to local files and the central store, and logs overload
//! transitions (§4.3/§4.4).

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tokio::fs;
use tokio::time::{self, Duration};

use crate::error::Result;
use crate::hypervisor::{DomainState, HypervisorLocal};
use crate::store::MetricStore;

pub struct CollectorConfig {
    pub local_data_directory: String,
    pub data_collector_interval: Duration,
    pub data_collector_data_length: usize,
    pub host_cpu_usable_by_vms: f64,
    pub host_cpu_overload_threshold: f64,
}

pub struct Collector<H: HypervisorLocal> {
    config: CollectorConfig,
    hypervisor: Arc<H>,
    store: MetricStore,
    hostname: String,
    physical_cpu_mhz_total: u32,
    core_mhz: u32,
    previous_cpu_time_ns: HashMap<String, u64>,
    previous_wall_time: Option<Instant>,
    previous_host_busy: u64,
    previous_host_total: u64,
    previous_overload: i8,
    first_tick: bool,
}

impl<H: HypervisorLocal> Collector<H> {
    fn vms_dir(&self) -> PathBuf {
        PathBuf::from(&self.config.local_data_directory).join("vms")
    }

    fn host_file(&self) -> PathBuf {
        PathBuf::from(&self.config.local_data_directory).join("host")
    }

    fn vm_file(&self, uuid: &str) -> PathBuf {
        self.vms_dir().join(uuid)
    }

    /// Opens the hypervisor connection, registers the host, and wipes all
    /// local history (per-VM files and the host file) per §4.3's startup
    /// lifecycle.
    pub async fn start(config: CollectorConfig, hypervisor: Arc<H>, store: MetricStore) -> Result<Self> {
        let info = hypervisor.host_info().await?;
        let physical_cpu_mhz_total = info.cores * info.core_mhz;
        store
            .update_host(
                &info.hostname,
                (physical_cpu_mhz_total as f64 * config.host_cpu_usable_by_vms).round() as u32,
                info.cores,
                info.ram_mb,
            )
            .await?;

        let mut collector = Self {
            config,
            hypervisor,
            store,
            hostname: info.hostname,
            physical_cpu_mhz_total,
            core_mhz: info.core_mhz,
            previous_cpu_time_ns: HashMap::new(),
            previous_wall_time: None,
            previous_host_busy: 0,
            previous_host_total: 0,
            previous_overload: -1,
            first_tick: true,
        };
        collector.wipe_local_history().await?;
        Ok(collector)
    }

    async fn wipe_local_history(&self) -> Result<()> {
        let vms_dir = self.vms_dir();
        if vms_dir.exists() {
            fs::remove_dir_all(&vms_dir).await?;
        }
        fs::create_dir_all(&vms_dir).await?;
        let host_file = self.host_file();
        if host_file.exists() {
            fs::remove_file(&host_file).await?;
        }
        Ok(())
    }

    /// Runs the periodic sampling loop forever, yielding the task between
    /// ticks so the scheduler stays responsive (§5).
    pub async fn run(&mut self) -> Result<()> {
        let mut interval = time::interval(self.config.data_collector_interval);
        loop {
            interval.tick().await;
            if let Err(e) = self.tick().await {
                log::error!(target: "terracotta::collector", "tick failed on {}: {e}", self.hostname);
                return Err(e);
            }
        }
    }

    async fn local_vm_uuids(&self) -> Result<Vec<String>> {
        let mut entries = fs::read_dir(self.vms_dir()).await?;
        let mut uuids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if let Some(name) = entry.file_name().to_str() {
                uuids.push(name.to_string());
            }
        }
        Ok(uuids)
    }

    async fn tick(&mut self) -> Result<()> {
        let previous_vms = self.local_vm_uuids().await?;
        let mut current_vms: HashMap<String, DomainState> = HashMap::new();
        for (uuid, state) in self.hypervisor.list_domains().await? {
            current_vms.insert(uuid, state);
        }

        let current_list: Vec<String> = current_vms.keys().cloned().collect();
        let added = crate::common::get_added_vms(&previous_vms, &current_list);
        let removed = crate::common::get_removed_vms(&previous_vms, &current_list);

        current_vms.retain(|uuid, state| *state == DomainState::Running || !added.contains(uuid));

        for uuid in &added {
            if current_vms.get(uuid) != Some(&DomainState::Running) {
                continue;
            }
            let history = self.store.select_cpu_mhz_for_vm(uuid, self.config.data_collector_data_length as u32).await?;
            let contents = history.iter().map(|v| v.to_string()).collect::<Vec<_>>().join("\n");
            fs::write(self.vm_file(uuid), contents).await?;
        }

        for uuid in &removed {
            let path = self.vm_file(uuid);
            if path.exists() {
                fs::remove_file(path).await?;
            }
            self.previous_cpu_time_ns.remove(uuid);
        }

        let now = Instant::now();
        let mut vm_mhz = HashMap::new();
        for uuid in current_vms.keys() {
            if current_vms.get(uuid) != Some(&DomainState::Running) {
                continue;
            }
            let stats = match self.hypervisor.cpu_stats(uuid).await {
                Ok(stats) => stats,
                Err(e) => {
                    log::warn!(target: "terracotta::collector", "cpu_stats lookup failed for {uuid}: {e}");
                    continue;
                }
            };
            let mhz = match (self.previous_cpu_time_ns.get(uuid), self.previous_wall_time) {
                (Some(&previous_ns), Some(previous_wall)) if stats.cpu_time_ns >= previous_ns => {
                    let delta_ns = (stats.cpu_time_ns - previous_ns) as f64;
                    let delta_wall_sec = now.duration_since(previous_wall).as_secs_f64();
                    (self.core_mhz as f64 * delta_ns / (delta_wall_sec * 1e9)).round() as u32
                }
                (Some(_), _) => {
                    // CPU-time counter reset: treated as a hypervisor reset, reuse
                    // the previous sample rather than computing a bogus delta.
                    vm_mhz.get(uuid).copied().unwrap_or(0)
                }
                _ => 0,
            };
            vm_mhz.insert(uuid.clone(), mhz);
            self.previous_cpu_time_ns.insert(uuid.clone(), stats.cpu_time_ns);
        }

        let (busy, total) = read_proc_stat().await?;
        let host_cpu_mhz = if self.previous_host_total == 0 {
            0
        } else {
            let delta_busy = busy.saturating_sub(self.previous_host_busy) as f64;
            let delta_total = (total.saturating_sub(self.previous_host_total)).max(1) as f64;
            let raw = (self.physical_cpu_mhz_total as f64 * delta_busy / delta_total).round();
            if raw < 0.0 {
                return Err(crate::error::TerracottaError::CounterAnomaly(format!("negative host mhz on {}", self.hostname)));
            }
            raw as u32
        };

        if !self.first_tick {
            let timestamp_sec = crate::common::unix_timestamp_sec();
            if !vm_mhz.is_empty() {
                self.store.insert_vm_cpu_mhz(&vm_mhz, timestamp_sec).await?;
            }
            for (uuid, mhz) in &vm_mhz {
                self.append_rotated(self.vm_file(uuid), *mhz).await?;
            }

            let vm_mhz_sum: u32 = vm_mhz.values().sum();
            let hypervisor_mhz = host_cpu_mhz.saturating_sub(vm_mhz_sum);
            self.append_rotated(self.host_file(), hypervisor_mhz).await?;
            self.store.insert_host_cpu_mhz(&self.hostname, hypervisor_mhz, timestamp_sec).await?;

            self.log_overload_edge(hypervisor_mhz + vm_mhz_sum, timestamp_sec).await?;
        }

        self.previous_host_busy = busy;
        self.previous_host_total = total;
        self.previous_wall_time = Some(now);
        self.first_tick = false;
        Ok(())
    }

    async fn append_rotated(&self, path: PathBuf, value: u32) -> Result<()> {
        let existing = fs::read_to_string(&path).await.unwrap_or_default();
        let mut lines: Vec<&str> = existing.lines().collect();
        let value_str = value.to_string();
        lines.push(&value_str);
        if lines.len() > self.config.data_collector_data_length {
            let drop = lines.len() - self.config.data_collector_data_length;
            lines.drain(0..drop);
        }
        fs::write(path, lines.join("\n")).await?;
        Ok(())
    }

    /// Inserts a `HostOverloadEvent` iff the overload state changed since the
    /// last tick (§4.4).
    async fn log_overload_edge(&mut self, current_total_mhz: u32, timestamp_sec: i64) -> Result<()> {
        let overloaded = self.config.host_cpu_overload_threshold * self.physical_cpu_mhz_total as f64 < current_total_mhz as f64;
        let overloaded_int = overloaded as i8;
        if self.previous_overload == -1 || self.previous_overload != overloaded_int {
            self.store.insert_host_overload(&self.hostname, overloaded, timestamp_sec).await?;
        }
        self.previous_overload = overloaded_int;
        Ok(())
    }
}

/// Reads `/proc/stat`'s first `cpu` line; returns `(busy, total)` where
/// `busy` sums the first three fields (user, nice, system) and `total` sums
/// all seven.
async fn read_proc_stat() -> Result<(u64, u64)> {
    let contents = fs::read_to_string("/proc/stat").await?;
    let first_line = contents.lines().next().unwrap_or_default();
    let fields: Vec<u64> = first_line.split_whitespace().skip(1).filter_map(|f| f.parse().ok()).take(7).collect();
    let busy = fields.iter().take(3).sum();
    let total = fields.iter().sum();
    Ok((busy, total))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overload_edge_fires_once_per_transition() {
        let mut previous = -1i8;
        let mut transitions = 0;
        for overloaded in [false, false, true, true, false] {
            let overloaded_int = overloaded as i8;
            if previous == -1 || previous != overloaded_int {
                transitions += 1;
            }
            previous = overloaded_int;
        }
        assert_eq!(transitions, 3);
    }
}
