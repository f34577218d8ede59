//! Supervisor: starts the configured subset of `{global-manager,
//! local-manager, local-collector}` sharing the in-process RPC transport
//! (§4.6).

use std::sync::Arc;

use tokio::task::JoinSet;

use crate::config::TerracottaConfig;
use crate::error::Result;
use crate::hypervisor::{HypervisorCluster, HypervisorLocal};
use crate::rpc;
use crate::store::MetricStore;

use super::collector::{Collector, CollectorConfig};
use super::global_manager::{GlobalManager, GlobalManagerConfig};
use super::local_manager::{LocalManager, LocalManagerConfig};

/// Launches the agents named in `config.server`, wiring the Local
/// Manager(s) and Global Manager together over one RPC channel. Returns
/// when the first launched component exits, successfully or not.
pub async fn run<H>(config: TerracottaConfig, hypervisor: Arc<H>, store: MetricStore) -> Result<()>
where
    H: HypervisorLocal + HypervisorCluster + 'static,
{
    let (handle, rx) = rpc::channel(64);
    let mut tasks = JoinSet::new();

    if config.server.iter().any(|s| s == "global-manager") {
        let gm_config = GlobalManagerConfig {
            compute_hosts: config.compute_hosts.clone(),
            compute_user: config.compute_user.clone(),
            compute_password: config.compute_password.clone(),
            sleep_command: config.sleep_command.clone(),
            ether_wake_interface: config.ether_wake_interface.clone(),
            ether_wake_binary: "ether-wake".to_string(),
            block_migration: config.block_migration,
            vm_placement_config: format!("{}[{}]", config.algorithm_vm_placement_factory, config.algorithm_vm_placement_parameters),
            hypervisor_user: "nova".to_string(),
            instance_dir_prefix: "/var/lib/nova/instances".to_string(),
        };
        let hypervisor = hypervisor.clone();
        let store = store.clone();
        tasks.spawn(async move {
            let mut manager = GlobalManager::new(gm_config, hypervisor, store).await?;
            manager.run(rx).await
        });
    }

    if config.server.iter().any(|s| s == "local-manager") {
        let lm_config = LocalManagerConfig {
            local_data_directory: config.local_data_directory.clone(),
            local_manager_interval: tokio::time::Duration::from_secs(config.local_manager_interval),
            data_collector_interval_sec: config.data_collector_interval as f64,
            host_cpu_usable_by_vms: config.host_cpu_usable_by_vms,
            network_migration_bandwidth: config.network_migration_bandwidth,
            host_id: 0,
            underload_detection_config: format!(
                "{}[{}]",
                config.algorithm_underload_detection_factory, config.algorithm_underload_detection_parameters
            ),
            overload_detection_config: format!(
                "{}[{}]",
                config.algorithm_overload_detection_factory, config.algorithm_overload_detection_parameters
            ),
            vm_selection_config: format!("{}[{}]", config.algorithm_vm_selection_factory, config.algorithm_vm_selection_parameters),
        };
        let hypervisor = hypervisor.clone();
        let handle = handle.clone();
        tasks.spawn(async move {
            let mut manager = LocalManager::new(lm_config, hypervisor, handle).await?;
            manager.run().await
        });
    }

    if config.server.iter().any(|s| s == "local-collector") {
        let collector_config = CollectorConfig {
            local_data_directory: config.local_data_directory.clone(),
            data_collector_interval: tokio::time::Duration::from_secs(config.data_collector_interval),
            data_collector_data_length: config.data_collector_data_length,
            host_cpu_usable_by_vms: config.host_cpu_usable_by_vms,
            host_cpu_overload_threshold: config.host_cpu_overload_threshold,
        };
        let hypervisor = hypervisor.clone();
        let store = store.clone();
        tasks.spawn(async move {
            let mut collector = Collector::start(collector_config, hypervisor, store).await?;
            collector.run().await
        });
    }

    match tasks.join_next().await {
        Some(Ok(Ok(()))) => Ok(()),
        Some(Ok(Err(e))) => Err(e),
        Some(Err(join_error)) => Err(crate::error::TerracottaError::Process {
            command: "agent task".to_string(),
            reason: join_error.to_string(),
        }),
        None => Ok(()),
    }
}
