//! Cluster-wide Global Manager: on receipt of an `underload`/`overload`
//! signal, gathers cluster state, invokes the placement algorithm, and
//! orchestrates live migrations and host power transitions (§4.5).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::time::sleep;

use crate::algorithms::placement::{placement_algorithm_resolver, PlacementInputs, VmPlacementAlgorithm};
use crate::error::Result;
use crate::hypervisor::HypervisorCluster;
use crate::power;
use crate::rpc::GlobalManagerRequest;
use crate::store::models::HostState;
use crate::store::MetricStore;

/// Per-VM attempt counter bound (§9/§11): a VM stuck past this many retries
/// is dropped from the worklist and logged as a permanent failure rather
/// than retried forever.
const MAX_MIGRATION_ATTEMPTS: u32 = 3;
const BATCH_POLL_INTERVAL: Duration = Duration::from_secs(3);
const BATCH_INITIAL_DELAY: Duration = Duration::from_secs(10);
const BATCH_TIMEOUT: Duration = Duration::from_secs(300);
const VM_CPU_HISTORY_SAMPLES: u32 = 10;

pub struct GlobalManagerConfig {
    pub compute_hosts: Vec<String>,
    pub compute_user: String,
    pub compute_password: String,
    pub sleep_command: String,
    pub ether_wake_interface: String,
    pub ether_wake_binary: String,
    pub block_migration: bool,
    pub vm_placement_config: String,
    pub hypervisor_user: String,
    pub instance_dir_prefix: String,
}

struct RetryEntry {
    vm_uuid: String,
    destination: String,
    attempts: u32,
}

pub struct GlobalManager<C: HypervisorCluster> {
    config: GlobalManagerConfig,
    hypervisor: Arc<C>,
    store: MetricStore,
    placement: Option<Box<dyn VmPlacementAlgorithm>>,
    host_macs: HashMap<String, String>,
    powered_on_once: bool,
}

struct ClusterSnapshot {
    hosts_cpu_total: HashMap<String, u32>,
    hosts_ram_total: HashMap<String, u64>,
    hosts_cpu_usage: HashMap<String, u32>,
    hosts_ram_usage: HashMap<String, u64>,
    host_vms: HashMap<String, Vec<String>>,
    active_hosts: HashSet<String>,
    inactive_hosts: HashSet<String>,
    vms_cpu: HashMap<String, Vec<u32>>,
    vms_ram: HashMap<String, u64>,
}

impl<C: HypervisorCluster> GlobalManager<C> {
    pub async fn new(config: GlobalManagerConfig, hypervisor: Arc<C>, store: MetricStore) -> Result<Self> {
        let mut manager = Self {
            config,
            hypervisor,
            store,
            placement: None,
            host_macs: HashMap::new(),
            powered_on_once: false,
        };
        manager.power_on_configured_hosts().await?;
        Ok(manager)
    }

    pub async fn run(&mut self, mut rx: mpsc::Receiver<GlobalManagerRequest>) -> Result<()> {
        while let Some(request) = rx.recv().await {
            let result = match request {
                GlobalManagerRequest::Underload { host_id } => self.handle_underload(host_id).await,
                GlobalManagerRequest::Overload { host_id, vm_uuids } => self.handle_overload(host_id, vm_uuids).await,
            };
            if let Err(e) = result {
                log::warn!(target: "terracotta::global_manager", "request handler failed: {e}");
            }
        }
        Ok(())
    }

    fn placement(&mut self) -> &dyn VmPlacementAlgorithm {
        if self.placement.is_none() {
            self.placement = Some(placement_algorithm_resolver(&self.config.vm_placement_config));
        }
        self.placement.as_deref().unwrap()
    }

    async fn hostname_for(&self, host_id: i32) -> Result<Option<String>> {
        let ids = self.store.select_host_ids().await?;
        Ok(ids.into_iter().find(|(_, id)| *id == host_id as i64).map(|(name, _)| name))
    }

    async fn build_snapshot(&self) -> Result<ClusterSnapshot> {
        let (hosts_cpu_total, _cores, hosts_ram_total) = self.store.select_host_characteristics().await?;
        let vm_cpu_latest = self.store.select_last_cpu_mhz_for_vms().await?;
        let host_cpu_latest = self.store.select_last_cpu_mhz_for_hosts().await?;
        let active: HashSet<String> = self.store.select_active_hosts().await?.into_iter().collect();
        let inactive: HashSet<String> = self.store.select_inactive_hosts().await?.into_iter().collect();

        let servers = self.hypervisor.list_servers().await?;
        let mut host_vms: HashMap<String, Vec<String>> = HashMap::new();
        for server in &servers {
            host_vms.entry(server.host.clone()).or_default().push(server.uuid.clone());
        }

        let mut hosts_cpu_usage = HashMap::new();
        for host in hosts_cpu_total.keys() {
            let vm_sum: u32 = host_vms.get(host).into_iter().flatten().filter_map(|uuid| vm_cpu_latest.get(uuid)).sum();
            let host_own = host_cpu_latest.get(host).copied().unwrap_or(0);
            hosts_cpu_usage.insert(host.clone(), vm_sum + host_own);
        }

        let mut hosts_ram_usage = HashMap::new();
        for host in hosts_cpu_total.keys() {
            if let Ok(used) = self.hypervisor.host_used_ram_mb(host).await {
                hosts_ram_usage.insert(host.clone(), used);
            }
        }

        let mut vms_cpu = HashMap::new();
        let mut vms_ram = HashMap::new();
        for server in &servers {
            let history = self.store.select_cpu_mhz_for_vm(&server.uuid, VM_CPU_HISTORY_SAMPLES).await?;
            vms_cpu.insert(server.uuid.clone(), history);
            if let Ok(ram) = self.hypervisor.server_flavor_ram_mb(&server.uuid).await {
                vms_ram.insert(server.uuid.clone(), ram);
            }
        }

        Ok(ClusterSnapshot {
            hosts_cpu_total,
            hosts_ram_total,
            hosts_cpu_usage,
            hosts_ram_usage,
            host_vms,
            active_hosts: active,
            inactive_hosts: inactive,
            vms_cpu,
            vms_ram,
        })
    }

    async fn handle_underload(&mut self, host_id: i32) -> Result<()> {
        let Some(underloaded_host) = self.hostname_for(host_id).await? else {
            return Ok(());
        };
        let mut snapshot = self.build_snapshot().await?;

        // Hosts carrying a VM with no CPU history are too little-known to
        // safely evacuate; keep them active and excluded from placement.
        let mut keep_active = HashSet::new();
        for (host, vms) in snapshot.host_vms.iter() {
            if vms.iter().any(|v| snapshot.vms_cpu.get(v).map(|h| h.is_empty()).unwrap_or(true)) {
                keep_active.insert(host.clone());
            }
        }

        snapshot.hosts_cpu_total.remove(&underloaded_host);
        snapshot.hosts_ram_total.remove(&underloaded_host);
        snapshot.hosts_cpu_usage.remove(&underloaded_host);
        snapshot.hosts_ram_usage.remove(&underloaded_host);

        let vms_to_migrate: Vec<String> = snapshot
            .host_vms
            .get(&underloaded_host)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter(|v| !snapshot.vms_cpu.get(v).map(Vec::is_empty).unwrap_or(true) && snapshot.vms_ram.contains_key(v))
            .collect();
        if vms_to_migrate.is_empty() {
            return Ok(());
        }

        let inputs = PlacementInputs {
            hosts_cpu_usage: snapshot.hosts_cpu_usage.clone(),
            hosts_cpu_total: snapshot.hosts_cpu_total.clone(),
            hosts_ram_usage: snapshot.hosts_ram_usage.clone(),
            hosts_ram_total: snapshot.hosts_ram_total.clone(),
            inactive_hosts_cpu: HashMap::new(),
            inactive_hosts_ram: HashMap::new(),
            vms_cpu: vms_to_migrate.iter().filter_map(|v| snapshot.vms_cpu.get(v).map(|h| (v.clone(), h.clone()))).collect(),
            vms_ram: vms_to_migrate.iter().filter_map(|v| snapshot.vms_ram.get(v).map(|r| (v.clone(), *r))).collect(),
        };
        let plan = self.placement().place(&inputs);

        let mut hosts_to_deactivate: HashSet<String> = self
            .config
            .compute_hosts
            .iter()
            .filter(|h| !snapshot.active_hosts.contains(*h))
            .filter(|h| !snapshot.inactive_hosts.contains(*h))
            .filter(|h| !keep_active.contains(*h))
            .cloned()
            .collect();
        if plan.is_empty() {
            hosts_to_deactivate.remove(&underloaded_host);
        }

        self.migrate_all(plan).await?;
        self.power_off(&hosts_to_deactivate).await?;
        Ok(())
    }

    async fn handle_overload(&mut self, host_id: i32, vm_uuids: Vec<String>) -> Result<()> {
        let Some(overloaded_host) = self.hostname_for(host_id).await? else {
            return Ok(());
        };
        let mut snapshot = self.build_snapshot().await?;
        snapshot.hosts_cpu_total.remove(&overloaded_host);
        snapshot.hosts_ram_total.remove(&overloaded_host);
        snapshot.hosts_cpu_usage.remove(&overloaded_host);
        snapshot.hosts_ram_usage.remove(&overloaded_host);

        let vms_to_migrate: Vec<String> = vm_uuids
            .into_iter()
            .filter(|v| !snapshot.vms_cpu.get(v).map(Vec::is_empty).unwrap_or(true) && snapshot.vms_ram.contains_key(v))
            .collect();
        if vms_to_migrate.is_empty() {
            return Ok(());
        }

        let inactive_hosts_cpu: HashMap<String, u32> =
            snapshot.inactive_hosts.iter().filter_map(|h| snapshot.hosts_cpu_total.get(h).map(|c| (h.clone(), *c))).collect();
        let inactive_hosts_ram: HashMap<String, u64> =
            snapshot.inactive_hosts.iter().filter_map(|h| snapshot.hosts_ram_total.get(h).map(|c| (h.clone(), *c))).collect();

        let inputs = PlacementInputs {
            hosts_cpu_usage: snapshot.hosts_cpu_usage.clone(),
            hosts_cpu_total: snapshot.hosts_cpu_total.clone(),
            hosts_ram_usage: snapshot.hosts_ram_usage.clone(),
            hosts_ram_total: snapshot.hosts_ram_total.clone(),
            inactive_hosts_cpu,
            inactive_hosts_ram,
            vms_cpu: vms_to_migrate.iter().filter_map(|v| snapshot.vms_cpu.get(v).map(|h| (v.clone(), h.clone()))).collect(),
            vms_ram: vms_to_migrate.iter().filter_map(|v| snapshot.vms_ram.get(v).map(|r| (v.clone(), *r))).collect(),
        };
        let plan = self.placement().place(&inputs);

        let destinations: HashSet<String> = plan.values().cloned().collect();
        let to_power_on: HashSet<String> = destinations.intersection(&snapshot.inactive_hosts).cloned().collect();
        if !to_power_on.is_empty() {
            self.power_on(&to_power_on).await?;
        }

        self.migrate_all(plan).await?;
        Ok(())
    }

    /// Migrates in batches of 1, as an iterative worklist with a per-VM
    /// attempt counter bounded at [`MAX_MIGRATION_ATTEMPTS`] (§4.5.3, §9/§11
    /// — the replacement for the source's unbounded recursive retry).
    async fn migrate_all(&mut self, plan: HashMap<String, String>) -> Result<()> {
        let mut worklist: Vec<RetryEntry> =
            plan.into_iter().map(|(vm_uuid, destination)| RetryEntry { vm_uuid, destination, attempts: 0 }).collect();

        while !worklist.is_empty() {
            let mut retry_worklist = Vec::new();
            for entry in worklist.drain(..) {
                match self.migrate_one(&entry.vm_uuid, &entry.destination).await {
                    Ok(true) => {}
                    Ok(false) => {
                        let attempts = entry.attempts + 1;
                        if attempts >= MAX_MIGRATION_ATTEMPTS {
                            log::warn!(
                                target: "terracotta::global_manager",
                                "migration of {} to {} permanently failed after {} attempts",
                                entry.vm_uuid, entry.destination, attempts
                            );
                        } else {
                            retry_worklist.push(RetryEntry { attempts, ..entry });
                        }
                    }
                    Err(e) => log::warn!(target: "terracotta::global_manager", "migration of {} failed: {e}", entry.vm_uuid),
                }
            }
            worklist = retry_worklist;
        }
        Ok(())
    }

    /// Drives a single VM's migration through `chown` → live-migrate →
    /// confirmation poll. Returns `Ok(true)` on confirmed migration,
    /// `Ok(false)` on timeout (caller decides whether to retry).
    async fn migrate_one(&self, vm_uuid: &str, destination: &str) -> Result<bool> {
        let instance_dir = format!("{}/{}", self.config.instance_dir_prefix, vm_uuid);
        power::chown_instance_dir(destination, &self.config.compute_user, &self.config.compute_password, &instance_dir, &self.config.hypervisor_user)
            .await?;

        self.hypervisor.live_migrate(vm_uuid, destination, self.config.block_migration).await?;
        sleep(BATCH_INITIAL_DELAY).await;

        let start = Instant::now();
        loop {
            let servers = self.hypervisor.list_servers().await?;
            if let Some(server) = servers.iter().find(|s| s.uuid == vm_uuid) {
                if server.host == destination && server.status == "ACTIVE" {
                    self.store.insert_vm_migration(vm_uuid, destination, crate::common::unix_timestamp_sec()).await?;
                    return Ok(true);
                }
                if start.elapsed() > BATCH_TIMEOUT && server.host != destination && server.status == "ACTIVE" {
                    return Ok(false);
                }
            }
            sleep(BATCH_POLL_INTERVAL).await;
        }
    }

    async fn power_off(&self, hosts: &HashSet<String>) -> Result<()> {
        if hosts.is_empty() {
            return Ok(());
        }
        for host in hosts {
            power::suspend_host(host, &self.config.compute_user, &self.config.compute_password, &self.config.sleep_command).await?;
        }
        let states = hosts.iter().map(|h| (h.clone(), HostState::Asleep)).collect();
        self.store.insert_host_states(&states, crate::common::unix_timestamp_sec()).await?;
        Ok(())
    }

    async fn power_on(&mut self, hosts: &HashSet<String>) -> Result<()> {
        if hosts.is_empty() {
            return Ok(());
        }
        for host in hosts {
            if !self.host_macs.contains_key(host) {
                if let Some(mac) = power::resolve_mac_address(host).await? {
                    self.host_macs.insert(host.clone(), mac);
                }
            }
            if let Some(mac) = self.host_macs.get(host) {
                power::wake_on_lan(&self.config.ether_wake_binary, &self.config.ether_wake_interface, mac).await?;
            }
        }
        let states = hosts.iter().map(|h| (h.clone(), HostState::Active)).collect();
        self.store.insert_host_states(&states, crate::common::unix_timestamp_sec()).await?;
        Ok(())
    }

    async fn power_on_configured_hosts(&mut self) -> Result<()> {
        if self.powered_on_once || self.config.compute_hosts.is_empty() {
            self.powered_on_once = true;
            return Ok(());
        }
        let hosts: HashSet<String> = self.config.compute_hosts.iter().cloned().collect();
        self.power_on(&hosts).await?;
        self.powered_on_once = true;
        Ok(())
    }
}
