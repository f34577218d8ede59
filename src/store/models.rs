//! Data model shared between the metric store adapter and the agents.

use serde::{Deserialize, Serialize};

/// A registered hypervisor host. CPU MHz and RAM are fixed after first
/// registration unless explicitly updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Host {
    pub id: i64,
    pub hostname: String,
    pub cpu_mhz: u32,
    pub cpu_cores: u32,
    pub ram_mb: u64,
    pub mac_address: Option<String>,
}

/// A guest VM, identified by its 36-character UUID. VMs are discovered, not
/// declared: a new UUID auto-registers on first metric insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vm {
    pub id: i64,
    pub uuid: String,
}

/// One point of a CPU MHz time series, for either a host or a VM.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub entity_id: i64,
    pub timestamp_sec: i64,
    pub cpu_mhz: u32,
}

/// Power state of a host. Latest row wins; absent rows default to `Active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum HostState {
    Asleep = 0,
    Active = 1,
}

impl Default for HostState {
    fn default() -> Self {
        HostState::Active
    }
}

impl From<i16> for HostState {
    fn from(v: i16) -> Self {
        if v == 0 {
            HostState::Asleep
        } else {
            HostState::Active
        }
    }
}

/// Written only on overload edges (the transition from non-overloaded to
/// overloaded or vice versa), plus the first observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostOverloadEvent {
    pub host_id: i64,
    pub timestamp_sec: i64,
    pub overloaded: bool,
}

/// Written when a migration is confirmed completed (observed running on the
/// destination host).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VmMigrationEvent {
    pub vm_uuid: String,
    pub destination_host: String,
    pub timestamp_sec: i64,
}
