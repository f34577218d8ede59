//! Small stateless helpers shared by the Collector and Local Manager.

use std::collections::{HashMap, HashSet};
use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time, seconds since the Unix epoch.
pub fn unix_timestamp_sec() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).expect("system clock before epoch").as_secs() as i64
}

/// `set(new) \ set(old)`.
pub fn get_added_vms(old: &[String], new: &[String]) -> HashSet<String> {
    let old: HashSet<&String> = old.iter().collect();
    new.iter().filter(|v| !old.contains(v)).cloned().collect()
}

/// `set(old) \ set(new)`.
pub fn get_removed_vms(old: &[String], new: &[String]) -> HashSet<String> {
    let new: HashSet<&String> = new.iter().collect();
    old.iter().filter(|v| !new.contains(v)).cloned().collect()
}

/// Mean VM RAM (MB) divided by the migration bandwidth (MB/s). Used to bind
/// `migration_time` for the algorithm factory contract.
pub fn calculate_migration_time(vms_ram: &HashMap<String, u64>, bandwidth_mb_per_sec: f64) -> f64 {
    if vms_ram.is_empty() {
        return 0.0;
    }
    let total: u64 = vms_ram.values().sum();
    (total as f64 / vms_ram.len() as f64) / bandwidth_mb_per_sec
}

/// Combines the per-VM MHz histories and the host's own (hypervisor
/// overhead) MHz history into a single utilization-fraction history.
///
/// Each VM history is left-padded with zeros to the longest history present,
/// the host history is truncated to that same length, the padded histories
/// are summed element-wise, and the result is divided by
/// `physical_cpu_mhz_total`. Output length equals the length of the longest
/// input and every value is in `[0, 1]` for well-formed inputs.
pub fn vm_mhz_to_percentage(vms_cpu_mhz: &[Vec<u32>], host_cpu_mhz: &[u32], physical_cpu_mhz_total: u64) -> Vec<f64> {
    let max_len = vms_cpu_mhz.iter().map(|h| h.len()).max().unwrap_or(0);
    if max_len == 0 {
        return Vec::new();
    }

    let mut sums = vec![0u64; max_len];
    for history in vms_cpu_mhz {
        let pad = max_len - history.len();
        for (i, mhz) in history.iter().enumerate() {
            sums[pad + i] += *mhz as u64;
        }
    }

    let host_start = host_cpu_mhz.len().saturating_sub(max_len);
    for (i, mhz) in host_cpu_mhz[host_start..].iter().enumerate() {
        sums[i] += *mhz as u64;
    }

    sums.into_iter()
        .map(|s| s as f64 / physical_cpu_mhz_total as f64)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn added_and_removed_vms() {
        let old = vec!["a".to_string(), "b".to_string()];
        let new = vec!["b".to_string(), "c".to_string()];
        assert_eq!(get_added_vms(&old, &new), HashSet::from(["c".to_string()]));
        assert_eq!(get_removed_vms(&old, &new), HashSet::from(["a".to_string()]));
    }

    #[test]
    fn migration_time_is_mean_ram_over_bandwidth() {
        let ram = HashMap::from([("a".to_string(), 1024u64), ("b".to_string(), 3072u64)]);
        assert_eq!(calculate_migration_time(&ram, 10.0), 204.8);
    }

    #[test]
    fn mhz_to_percentage_shape() {
        let vms = vec![vec![100u32, 200], vec![50]];
        let host = vec![10u32, 20];
        let out = vm_mhz_to_percentage(&vms, &host, 1000);
        assert_eq!(out.len(), 2);
        for v in &out {
            assert!(*v >= 0.0 && *v <= 1.0);
        }
        // tick 0: vm_a[0]=100 (padded from index0), vm_b padded-in at index1 only
        // pad: vm_a len2 pad0 -> [100,200]; vm_b len1 pad1 -> [0,50]
        // sums = [100, 250]; host truncated to len2 -> [10,20]; total=[110,270]
        assert_eq!(out[0], 110.0 / 1000.0);
        assert_eq!(out[1], 270.0 / 1000.0);
    }
}
