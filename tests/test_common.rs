//! Property tests for the shared helpers (§8).

use std::collections::{HashMap, HashSet};

use terracotta::common::{calculate_migration_time, get_added_vms, get_removed_vms, vm_mhz_to_percentage};

#[test]
fn added_and_removed_vms_are_set_differences() {
    let old = vec!["a".to_string(), "b".to_string()];
    let new = vec!["b".to_string(), "c".to_string()];
    assert_eq!(get_added_vms(&old, &new), HashSet::from(["c".to_string()]));
    assert_eq!(get_removed_vms(&old, &new), HashSet::from(["a".to_string()]));
}

#[test]
fn added_and_removed_vms_for_disjoint_and_identical_sets() {
    let a = vec!["x".to_string()];
    let b = vec!["y".to_string()];
    assert_eq!(get_added_vms(&a, &b), HashSet::from(["y".to_string()]));
    assert_eq!(get_removed_vms(&a, &b), HashSet::from(["x".to_string()]));
    assert!(get_added_vms(&a, &a).is_empty());
    assert!(get_removed_vms(&a, &a).is_empty());
}

#[test]
fn migration_time_is_mean_ram_over_bandwidth() {
    let ram = HashMap::from([("a".to_string(), 1024u64), ("b".to_string(), 3072u64)]);
    for bandwidth in [1.0, 10.0, 100.0] {
        let expected = (1024.0 + 3072.0) / 2.0 / bandwidth;
        assert_eq!(calculate_migration_time(&ram, bandwidth), expected);
    }
}

#[test]
fn vm_mhz_to_percentage_output_length_and_range() {
    let vms = vec![vec![100u32, 200, 300], vec![50u32]];
    let host = vec![10u32, 20, 30];
    let out = vm_mhz_to_percentage(&vms, &host, 10_000);
    assert_eq!(out.len(), 3);
    for v in &out {
        assert!(*v >= 0.0 && *v <= 1.0);
    }
}

#[test]
fn vm_mhz_to_percentage_empty_input_is_empty_output() {
    assert!(vm_mhz_to_percentage(&[], &[], 1000).is_empty());
}
