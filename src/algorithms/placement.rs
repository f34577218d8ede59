//! VM placement: Best-Fit-Decreasing bin packing.

use std::collections::HashMap;

use crate::config::{parse_config_value, parse_options};

/// Inputs to a placement run. Taken by value / cloned at the call site so
/// the function never mutates a caller's state (SPEC_FULL.md §11.1).
pub struct PlacementInputs {
    pub hosts_cpu_usage: HashMap<String, u32>,
    pub hosts_cpu_total: HashMap<String, u32>,
    pub hosts_ram_usage: HashMap<String, u64>,
    pub hosts_ram_total: HashMap<String, u64>,
    pub inactive_hosts_cpu: HashMap<String, u32>,
    pub inactive_hosts_ram: HashMap<String, u64>,
    pub vms_cpu: HashMap<String, Vec<u32>>,
    pub vms_ram: HashMap<String, u64>,
}

pub trait VmPlacementAlgorithm: Send {
    fn place(&self, inputs: &PlacementInputs) -> HashMap<String, String>;
}

pub fn placement_algorithm_resolver(config_str: &str) -> Box<dyn VmPlacementAlgorithm> {
    let (name, options) = parse_config_value(config_str);
    match name.as_str() {
        "bfd" => Box::new(BestFitDecreasing::from_str(options.as_deref().unwrap_or(""))),
        _ => panic!("can't resolve placement algorithm: {}", config_str),
    }
}

/// `{ h : floor(threshold * total[h] - usage[h]) }`. May be negative; BFD
/// treats a negative as "no room" implicitly because no VM demand is ever
/// negative.
pub fn get_available_resources(threshold: f64, usage: &HashMap<String, i64>, total: &HashMap<String, i64>) -> HashMap<String, i64> {
    total
        .iter()
        .map(|(host, total)| {
            let used = usage.get(host).copied().unwrap_or(0);
            let avail = (threshold * *total as f64 - used as f64).floor() as i64;
            (host.clone(), avail)
        })
        .collect()
}

pub struct BestFitDecreasing {
    pub cpu_threshold: f64,
    pub ram_threshold: f64,
    pub last_n_vm_cpu: usize,
}

impl BestFitDecreasing {
    pub fn new(cpu_threshold: f64, ram_threshold: f64, last_n_vm_cpu: usize) -> Self {
        Self {
            cpu_threshold,
            ram_threshold,
            last_n_vm_cpu,
        }
    }

    fn from_str(s: &str) -> Self {
        let options = parse_options(s);
        let cpu_threshold = options.get("cpu_threshold").map(|v| v.parse().unwrap()).unwrap_or(0.8);
        let ram_threshold = options.get("ram_threshold").map(|v| v.parse().unwrap()).unwrap_or(0.95);
        let last_n_vm_cpu = options.get("last_n_vm_cpu").map(|v| v.parse().unwrap()).unwrap_or(2);
        Self::new(cpu_threshold, ram_threshold, last_n_vm_cpu)
    }
}

/// A host's available resources while the greedy descent runs. Ordered
/// ascending by `(avail_cpu, avail_ram, hostname)` as the spec requires.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct HostSlot {
    avail_cpu: i64,
    avail_ram: i64,
    hostname: String,
}

fn u32_map_to_i64(m: &HashMap<String, u32>) -> HashMap<String, i64> {
    m.iter().map(|(k, v)| (k.clone(), *v as i64)).collect()
}

fn u64_map_to_i64(m: &HashMap<String, u64>) -> HashMap<String, i64> {
    m.iter().map(|(k, v)| (k.clone(), *v as i64)).collect()
}

impl VmPlacementAlgorithm for BestFitDecreasing {
    fn place(&self, inputs: &PlacementInputs) -> HashMap<String, String> {
        let avail_cpu = get_available_resources(
            self.cpu_threshold,
            &u32_map_to_i64(&inputs.hosts_cpu_usage),
            &u32_map_to_i64(&inputs.hosts_cpu_total),
        );
        let avail_ram = get_available_resources(
            self.ram_threshold,
            &u64_map_to_i64(&inputs.hosts_ram_usage),
            &u64_map_to_i64(&inputs.hosts_ram_total),
        );

        let mut active: Vec<HostSlot> = inputs
            .hosts_cpu_total
            .keys()
            .map(|h| HostSlot {
                avail_cpu: avail_cpu[h],
                avail_ram: avail_ram[h],
                hostname: h.clone(),
            })
            .collect();
        active.sort();

        let inactive_avail_cpu =
            get_available_resources(self.cpu_threshold, &HashMap::new(), &u32_map_to_i64(&inputs.inactive_hosts_cpu));
        let inactive_avail_ram =
            get_available_resources(self.ram_threshold, &HashMap::new(), &u64_map_to_i64(&inputs.inactive_hosts_ram));
        let mut inactive: Vec<HostSlot> = inputs
            .inactive_hosts_cpu
            .keys()
            .map(|h| HostSlot {
                avail_cpu: inactive_avail_cpu[h],
                avail_ram: inactive_avail_ram[h],
                hostname: h.clone(),
            })
            .collect();
        inactive.sort();

        // representative demand per VM; VMs with no CPU history are skipped
        let mut demands: Vec<(String, i64, u64)> = inputs
            .vms_cpu
            .iter()
            .filter(|(_, history)| !history.is_empty())
            .map(|(uuid, history)| {
                let start = history.len().saturating_sub(self.last_n_vm_cpu);
                let window = &history[start..];
                let mean = window.iter().map(|v| *v as i64).sum::<i64>() / window.len() as i64;
                let ram = inputs.vms_ram.get(uuid).copied().unwrap_or(0);
                (uuid.clone(), mean, ram)
            })
            .collect();
        // decreasing (cpu_demand, ram_demand, uuid)
        demands.sort_by(|a, b| b.1.cmp(&a.1).then(b.2.cmp(&a.2)).then(a.0.cmp(&b.0)));

        let mut result = HashMap::new();
        'vm: for (uuid, cpu_demand, ram_demand) in demands {
            loop {
                if let Some(pos) = active
                    .iter()
                    .position(|slot| slot.avail_cpu >= cpu_demand && slot.avail_ram >= ram_demand as i64)
                {
                    active[pos].avail_cpu -= cpu_demand;
                    active[pos].avail_ram -= ram_demand as i64;
                    result.insert(uuid.clone(), active[pos].hostname.clone());
                    active.sort();
                    continue 'vm;
                }
                if inactive.is_empty() {
                    return HashMap::new();
                }
                let promoted = inactive.remove(0);
                active.push(promoted);
                active.sort();
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs(
        hosts_cpu: &[(&str, u32)],
        hosts_ram: &[(&str, u64)],
        vms_cpu: &[(&str, Vec<u32>)],
        vms_ram: &[(&str, u64)],
    ) -> PlacementInputs {
        PlacementInputs {
            hosts_cpu_usage: HashMap::new(),
            hosts_cpu_total: hosts_cpu.iter().map(|(h, v)| (h.to_string(), *v)).collect(),
            hosts_ram_usage: HashMap::new(),
            hosts_ram_total: hosts_ram.iter().map(|(h, v)| (h.to_string(), *v)).collect(),
            inactive_hosts_cpu: HashMap::new(),
            inactive_hosts_ram: HashMap::new(),
            vms_cpu: vms_cpu.iter().map(|(v, h)| (v.to_string(), h.clone())).collect(),
            vms_ram: vms_ram.iter().map(|(v, r)| (v.to_string(), *r)).collect(),
        }
    }

    #[test]
    fn bfd_trivial_scenario() {
        let algo = BestFitDecreasing::new(1.0, 1.0, 1);
        let i = inputs(
            &[("h1", 1000), ("h2", 1000)],
            &[("h1", 2048), ("h2", 2048)],
            &[("v1", vec![600]), ("v2", vec![600]), ("v3", vec![600])],
            &[("v1", 1000), ("v2", 1000), ("v3", 1000)],
        );
        let plan = algo.place(&i);
        assert_eq!(plan.len(), 3);
        let mut per_host: HashMap<&str, i64> = HashMap::new();
        for (vm, host) in &plan {
            *per_host.entry(host.as_str()).or_insert(0) += 600;
            let _ = vm;
        }
        for total in per_host.values() {
            assert!(*total <= 1000);
        }
    }

    #[test]
    fn bfd_infeasible_scenario_returns_empty() {
        let algo = BestFitDecreasing::new(1.0, 1.0, 1);
        let i = inputs(
            &[("h1", 1000), ("h2", 1000)],
            &[("h1", 2048), ("h2", 2048)],
            &[("v1", vec![600]), ("v2", vec![600]), ("v3", vec![600])],
            &[("v1", 2000), ("v2", 2000), ("v3", 2000)],
        );
        assert!(algo.place(&i).is_empty());
    }

    #[test]
    fn vms_with_empty_cpu_history_are_skipped() {
        let algo = BestFitDecreasing::new(1.0, 1.0, 1);
        let mut i = inputs(
            &[("h1", 1000)],
            &[("h1", 2048)],
            &[("v1", vec![]), ("v2", vec![500])],
            &[("v1", 100), ("v2", 100)],
        );
        i.vms_cpu.insert("v1".to_string(), vec![]);
        let plan = algo.place(&i);
        assert!(!plan.contains_key("v1"));
        assert_eq!(plan.get("v2"), Some(&"h1".to_string()));
    }
}
