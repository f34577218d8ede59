//! End-to-end BFD scenarios (§8 scenarios 1-2), against the public
//! `VmPlacementAlgorithm` trait rather than its internal helpers.

use std::collections::HashMap;

use terracotta::algorithms::placement::{BestFitDecreasing, PlacementInputs, VmPlacementAlgorithm};

fn inputs(vms_ram: &[(&str, u64)]) -> PlacementInputs {
    PlacementInputs {
        hosts_cpu_usage: HashMap::new(),
        hosts_cpu_total: HashMap::from([("h1".to_string(), 1000), ("h2".to_string(), 1000)]),
        hosts_ram_usage: HashMap::new(),
        hosts_ram_total: HashMap::from([("h1".to_string(), 2048), ("h2".to_string(), 2048)]),
        inactive_hosts_cpu: HashMap::new(),
        inactive_hosts_ram: HashMap::new(),
        vms_cpu: HashMap::from([
            ("v1".to_string(), vec![600u32]),
            ("v2".to_string(), vec![600u32]),
            ("v3".to_string(), vec![600u32]),
        ]),
        vms_ram: vms_ram.iter().map(|(v, r)| (v.to_string(), *r)).collect(),
    }
}

#[test]
fn bfd_trivial_scenario_packs_every_vm_under_threshold() {
    let algo = BestFitDecreasing::new(1.0, 1.0, 1);
    let plan = algo.place(&inputs(&[("v1", 1000), ("v2", 1000), ("v3", 1000)]));

    assert_eq!(plan.len(), 3);
    let mut cpu_per_host: HashMap<&str, u32> = HashMap::new();
    let mut ram_per_host: HashMap<&str, u64> = HashMap::new();
    let vms_ram = HashMap::from([("v1", 1000u64), ("v2", 1000), ("v3", 1000)]);
    for (vm, host) in &plan {
        *cpu_per_host.entry(host.as_str()).or_insert(0) += 600;
        *ram_per_host.entry(host.as_str()).or_insert(0) += vms_ram[vm.as_str()];
    }
    for total in cpu_per_host.values() {
        assert!(*total <= 1000);
    }
    for total in ram_per_host.values() {
        assert!(*total <= 2048);
    }
}

#[test]
fn bfd_infeasible_scenario_returns_empty_mapping() {
    let algo = BestFitDecreasing::new(1.0, 1.0, 1);
    let plan = algo.place(&inputs(&[("v1", 2000), ("v2", 2000), ("v3", 2000)]));
    assert!(plan.is_empty());
}

#[test]
fn bfd_never_mutates_its_inputs() {
    let algo = BestFitDecreasing::new(1.0, 1.0, 1);
    let i = inputs(&[("v1", 1000), ("v2", 1000), ("v3", 1000)]);
    let snapshot_cpu = i.hosts_cpu_total.clone();
    let snapshot_ram = i.hosts_ram_total.clone();
    let _ = algo.place(&i);
    assert_eq!(i.hosts_cpu_total, snapshot_cpu);
    assert_eq!(i.hosts_ram_total, snapshot_ram);
}
