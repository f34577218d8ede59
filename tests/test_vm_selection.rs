//! VM-selection scenario (§8 scenario 5) and the resolver's dispatch contract.

use std::collections::HashMap;

use terracotta::algorithms::vm_selection::{vm_selector_resolver, MinimumMigrationTimeMaxCpu, VmSelector};

#[test]
fn minimum_migration_time_max_cpu_breaks_a_ram_tie_by_higher_mean_cpu() {
    let vms_ram = HashMap::from([
        ("a".to_string(), 1024u64),
        ("b".to_string(), 1024u64),
        ("c".to_string(), 2048u64),
    ]);
    let vms_cpu = HashMap::from([
        ("a".to_string(), vec![100u32, 200]),
        ("b".to_string(), vec![200u32, 300]),
        ("c".to_string(), vec![1000u32]),
    ]);
    let mut selector = MinimumMigrationTimeMaxCpu::new(2);
    assert_eq!(selector.select(&vms_cpu, &vms_ram), Some("b".to_string()));
}

#[test]
fn resolver_dispatches_every_registered_name() {
    let vms_cpu = HashMap::from([("a".to_string(), vec![100u32])]);
    let vms_ram = HashMap::from([("a".to_string(), 1024u64)]);

    for name in ["random", "minimum_utilization", "minimum_migration_time", "minimum_migration_time_max_cpu[last_n=2]"] {
        let mut selector: Box<dyn VmSelector> = vm_selector_resolver(name);
        assert_eq!(selector.select(&vms_cpu, &vms_ram), Some("a".to_string()));
    }
}
