//! Abstractions over the virtualization control plane.
//!
//! The reference deployment talks to `libvirt` for per-host operations and
//! to a `nova`-style cluster API for placement-level operations. Neither is
//! part of this crate's scope (§6); instead the operations §6 names are
//! pinned to two small traits so the controller logic is testable against
//! in-memory fakes.

use async_trait::async_trait;

use crate::error::{HypervisorError, Result};

/// Snapshot of one domain's libvirt state, as returned by `lookupByID`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomainState {
    Running,
    Paused,
    ShutOff,
    Other,
}

/// Static characteristics reported by `getInfo()`/`getHostname()`.
#[derive(Debug, Clone)]
pub struct HostInfo {
    pub hostname: String,
    pub cores: u32,
    pub core_mhz: u32,
    pub ram_mb: u64,
}

/// CPU time counters from `domain.getCPUStats()`, in nanoseconds.
#[derive(Debug, Clone, Copy)]
pub struct CpuStats {
    pub cpu_time_ns: u64,
}

/// Per-host operations: domain enumeration, CPU stats, max memory —
/// everything a Collector or Local Manager needs from the hypervisor it is
/// co-located with.
#[async_trait]
pub trait HypervisorLocal: Send + Sync {
    async fn host_info(&self) -> Result<HostInfo>;

    /// `listDomainsID()` + `lookupByID(id).UUIDString()`/`.state()`, joined
    /// into `uuid -> state` for every currently-defined domain.
    async fn list_domains(&self) -> Result<Vec<(String, DomainState)>>;

    async fn cpu_stats(&self, vm_uuid: &str) -> Result<CpuStats>;

    /// `maxMemory()`, in KB as reported by libvirt.
    async fn max_memory_kb(&self, vm_uuid: &str) -> Result<u64>;
}

/// Cluster-level operations: used RAM, server listing, flavor lookup, and
/// the live-migration RPC itself.
#[async_trait]
pub trait HypervisorCluster: Send + Sync {
    /// `hosts.get(host)`'s used-RAM attribute, in MB.
    async fn host_used_ram_mb(&self, hostname: &str) -> Result<u64>;

    /// `servers.list()`: every known server's UUID, current host, and status.
    async fn list_servers(&self) -> Result<Vec<ServerInfo>>;

    /// `flavors.list()`'s RAM limit for the server's flavor, in MB.
    async fn server_flavor_ram_mb(&self, vm_uuid: &str) -> Result<u64>;

    /// `servers.live_migrate(uuid, host, block)`.
    async fn live_migrate(&self, vm_uuid: &str, destination_host: &str, block: bool) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct ServerInfo {
    pub uuid: String,
    pub host: String,
    pub status: String,
}

/// Placeholder hypervisor backend: every call fails with
/// [`HypervisorError::Connection`]. The real `libvirt`/`nova` client is an
/// external collaborator out of this crate's scope (§6); wiring one up
/// means implementing [`HypervisorLocal`]/[`HypervisorCluster`] against it.
/// Standing this in at startup means a misconfigured deployment fails fast
/// with a clear error rather than silently doing nothing, matching §7's
/// "cannot open hypervisor connection ... refuses to start".
pub struct NullHypervisor;

#[async_trait]
impl HypervisorLocal for NullHypervisor {
    async fn host_info(&self) -> Result<HostInfo> {
        Err(HypervisorError::Connection("no hypervisor backend configured".into()).into())
    }

    async fn list_domains(&self) -> Result<Vec<(String, DomainState)>> {
        Err(HypervisorError::Connection("no hypervisor backend configured".into()).into())
    }

    async fn cpu_stats(&self, _vm_uuid: &str) -> Result<CpuStats> {
        Err(HypervisorError::Connection("no hypervisor backend configured".into()).into())
    }

    async fn max_memory_kb(&self, _vm_uuid: &str) -> Result<u64> {
        Err(HypervisorError::Connection("no hypervisor backend configured".into()).into())
    }
}

#[async_trait]
impl HypervisorCluster for NullHypervisor {
    async fn host_used_ram_mb(&self, _hostname: &str) -> Result<u64> {
        Err(HypervisorError::Connection("no hypervisor backend configured".into()).into())
    }

    async fn list_servers(&self) -> Result<Vec<ServerInfo>> {
        Err(HypervisorError::Connection("no hypervisor backend configured".into()).into())
    }

    async fn server_flavor_ram_mb(&self, _vm_uuid: &str) -> Result<u64> {
        Err(HypervisorError::Connection("no hypervisor backend configured".into()).into())
    }

    async fn live_migrate(&self, _vm_uuid: &str, _destination_host: &str, _block: bool) -> Result<()> {
        Err(HypervisorError::Connection("no hypervisor backend configured".into()).into())
    }
}

/// In-memory fake satisfying both traits, for agent-level tests that need a
/// hypervisor without a real virtualization stack.
#[cfg(test)]
pub mod fake {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct FakeHypervisor {
        pub host: Mutex<Option<HostInfo>>,
        pub domains: Mutex<Vec<(String, DomainState)>>,
        pub cpu_stats: Mutex<HashMap<String, CpuStats>>,
        pub max_memory_kb: Mutex<HashMap<String, u64>>,
        pub used_ram_mb: Mutex<HashMap<String, u64>>,
        pub servers: Mutex<Vec<ServerInfo>>,
        pub flavor_ram_mb: Mutex<HashMap<String, u64>>,
        pub migrations: Mutex<Vec<(String, String)>>,
        pub fail_migrate: Mutex<bool>,
    }

    #[async_trait]
    impl HypervisorLocal for FakeHypervisor {
        async fn host_info(&self) -> Result<HostInfo> {
            self.host
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| HypervisorError::Connection("no host registered".into()).into())
        }

        async fn list_domains(&self) -> Result<Vec<(String, DomainState)>> {
            Ok(self.domains.lock().unwrap().clone())
        }

        async fn cpu_stats(&self, vm_uuid: &str) -> Result<CpuStats> {
            self.cpu_stats
                .lock()
                .unwrap()
                .get(vm_uuid)
                .copied()
                .ok_or_else(|| HypervisorError::Lookup(vm_uuid.to_string()).into())
        }

        async fn max_memory_kb(&self, vm_uuid: &str) -> Result<u64> {
            self.max_memory_kb
                .lock()
                .unwrap()
                .get(vm_uuid)
                .copied()
                .ok_or_else(|| HypervisorError::Lookup(vm_uuid.to_string()).into())
        }
    }

    #[async_trait]
    impl HypervisorCluster for FakeHypervisor {
        async fn host_used_ram_mb(&self, hostname: &str) -> Result<u64> {
            self.used_ram_mb
                .lock()
                .unwrap()
                .get(hostname)
                .copied()
                .ok_or_else(|| HypervisorError::Lookup(hostname.to_string()).into())
        }

        async fn list_servers(&self) -> Result<Vec<ServerInfo>> {
            Ok(self.servers.lock().unwrap().clone())
        }

        async fn server_flavor_ram_mb(&self, vm_uuid: &str) -> Result<u64> {
            self.flavor_ram_mb
                .lock()
                .unwrap()
                .get(vm_uuid)
                .copied()
                .ok_or_else(|| HypervisorError::Lookup(vm_uuid.to_string()).into())
        }

        async fn live_migrate(&self, vm_uuid: &str, destination_host: &str, _block: bool) -> Result<()> {
            if *self.fail_migrate.lock().unwrap() {
                return Err(HypervisorError::Connection("live migration refused".into()).into());
            }
            self.migrations.lock().unwrap().push((vm_uuid.to_string(), destination_host.to_string()));
            Ok(())
        }
    }

    #[tokio::test]
    async fn fake_migrate_records_the_attempt() {
        let fake = FakeHypervisor::default();
        fake.live_migrate("vm-1", "host-b", true).await.unwrap();
        assert_eq!(fake.migrations.lock().unwrap().as_slice(), &[("vm-1".to_string(), "host-b".to_string())]);
    }

    #[tokio::test]
    async fn fake_lookup_failure_is_per_entity() {
        let fake = FakeHypervisor::default();
        let err = fake.cpu_stats("missing").await.unwrap_err();
        assert!(matches!(err, crate::error::TerracottaError::Hypervisor(HypervisorError::Lookup(_))));
    }
}
