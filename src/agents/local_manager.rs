//! Per-host Local Manager: classifies the host as underloaded, overloaded,
//! or normal via pluggable detectors, and on overload selects guests to
//! evict via a pluggable selector (§4.4 second occurrence).

use std::collections::HashMap;
use std::sync::Arc;

use tokio::fs;
use tokio::time::{self, Duration};

use crate::algorithms::overload::{overload_detector_resolver, OverloadDetector};
use crate::algorithms::underload::{underload_detector_resolver, UnderloadDetector};
use crate::algorithms::vm_selection::{vm_selector_resolver, VmSelector};
use crate::error::Result;
use crate::hypervisor::HypervisorLocal;
use crate::rpc::GlobalManagerHandle;

pub struct LocalManagerConfig {
    pub local_data_directory: String,
    pub local_manager_interval: Duration,
    pub data_collector_interval_sec: f64,
    pub host_cpu_usable_by_vms: f64,
    pub network_migration_bandwidth: f64,
    pub host_id: i32,
    pub underload_detection_config: String,
    pub overload_detection_config: String,
    pub vm_selection_config: String,
}

pub struct LocalManager<H: HypervisorLocal> {
    config: LocalManagerConfig,
    hypervisor: Arc<H>,
    rpc: GlobalManagerHandle,
    physical_cpu_mhz_total: f64,
    underload_detector: Option<Box<dyn UnderloadDetector>>,
    overload_detector: Option<Box<dyn OverloadDetector>>,
    vm_selector: Option<Box<dyn VmSelector>>,
}

impl<H: HypervisorLocal> LocalManager<H> {
    pub async fn new(config: LocalManagerConfig, hypervisor: Arc<H>, rpc: GlobalManagerHandle) -> Result<Self> {
        let info = hypervisor.host_info().await?;
        let physical_cpu_mhz_total = (info.cores * info.core_mhz) as f64 * config.host_cpu_usable_by_vms;
        Ok(Self {
            config,
            hypervisor,
            rpc,
            physical_cpu_mhz_total,
            underload_detector: None,
            overload_detector: None,
            vm_selector: None,
        })
    }

    pub async fn run(&mut self) -> Result<()> {
        let mut interval = time::interval(self.config.local_manager_interval);
        loop {
            interval.tick().await;
            if let Err(e) = self.tick().await {
                log::error!(target: "terracotta::local_manager", "tick failed: {e}");
                return Err(e);
            }
        }
    }

    async fn read_vm_histories(&self) -> Result<HashMap<String, Vec<u32>>> {
        let vms_dir = std::path::PathBuf::from(&self.config.local_data_directory).join("vms");
        let mut histories = HashMap::new();
        let mut entries = match fs::read_dir(&vms_dir).await {
            Ok(e) => e,
            Err(_) => return Ok(histories),
        };
        while let Some(entry) = entries.next_entry().await? {
            let Some(uuid) = entry.file_name().to_str().map(str::to_string) else { continue };
            let contents = fs::read_to_string(entry.path()).await.unwrap_or_default();
            let history: Vec<u32> = contents.lines().filter_map(|l| l.parse().ok()).collect();
            histories.insert(uuid, history);
        }
        Ok(histories)
    }

    async fn read_host_history(&self) -> Result<Vec<u32>> {
        let host_file = std::path::PathBuf::from(&self.config.local_data_directory).join("host");
        let contents = fs::read_to_string(host_file).await.unwrap_or_default();
        Ok(contents.lines().filter_map(|l| l.parse().ok()).collect())
    }

    fn ensure_algorithms(&mut self, vms_ram: &HashMap<String, u64>) {
        if self.underload_detector.is_some() {
            return;
        }
        let migration_time = crate::common::calculate_migration_time(vms_ram, self.config.network_migration_bandwidth);
        self.underload_detector = Some(underload_detector_resolver(&self.config.underload_detection_config));
        self.overload_detector = Some(overload_detector_resolver(
            &self.config.overload_detection_config,
            self.config.data_collector_interval_sec,
            migration_time,
        ));
        self.vm_selector = Some(vm_selector_resolver(&self.config.vm_selection_config));
    }

    async fn tick(&mut self) -> Result<()> {
        let vms_cpu = self.read_vm_histories().await?;
        if vms_cpu.is_empty() {
            return Ok(());
        }

        let mut vms_ram = HashMap::new();
        for uuid in vms_cpu.keys() {
            match self.hypervisor.max_memory_kb(uuid).await {
                Ok(kb) => {
                    vms_ram.insert(uuid.clone(), kb / 1024);
                }
                Err(e) => log::warn!(target: "terracotta::local_manager", "maxMemory lookup failed for {uuid}: {e}"),
            }
        }

        let host_history = self.read_host_history().await?;
        let vm_histories: Vec<Vec<u32>> = vms_cpu.values().cloned().collect();
        let utilization = crate::common::vm_mhz_to_percentage(&vm_histories, &host_history, self.physical_cpu_mhz_total as u64);
        if utilization.is_empty() {
            return Ok(());
        }

        self.ensure_algorithms(&vms_ram);

        if self.underload_detector.as_mut().unwrap().detect(&utilization) {
            self.rpc.underload(self.config.host_id).await;
            return Ok(());
        }

        if self.overload_detector.as_mut().unwrap().detect(&utilization) {
            if let Some(selected) = self.vm_selector.as_mut().unwrap().select(&vms_cpu, &vms_ram) {
                self.rpc.overload(self.config.host_id, vec![selected]).await;
            }
        }
        Ok(())
    }
}
