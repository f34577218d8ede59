//! VM selection heuristics: choose which guest(s) to evict from an
//! overloaded host.

use std::collections::HashMap;

use rand::seq::SliceRandom;

use crate::config::{parse_config_value, parse_options};

/// Picks one VM UUID to migrate away, given its CPU MHz history and RAM.
pub trait VmSelector: Send {
    fn select(&mut self, vms_cpu: &HashMap<String, Vec<u32>>, vms_ram: &HashMap<String, u64>) -> Option<String>;
}

pub fn vm_selector_resolver(config_str: &str) -> Box<dyn VmSelector> {
    let (name, options) = parse_config_value(config_str);
    match name.as_str() {
        "random" => Box::new(Random),
        "minimum_utilization" => Box::new(MinimumUtilization),
        "minimum_migration_time" => Box::new(MinimumMigrationTime),
        "minimum_migration_time_max_cpu" => Box::new(MinimumMigrationTimeMaxCpu::from_str(options.as_deref().unwrap_or(""))),
        _ => panic!("can't resolve VM selector: {}", config_str),
    }
}

pub struct Random;

impl VmSelector for Random {
    fn select(&mut self, vms_cpu: &HashMap<String, Vec<u32>>, _vms_ram: &HashMap<String, u64>) -> Option<String> {
        let uuids: Vec<&String> = vms_cpu.keys().collect();
        uuids.choose(&mut rand::thread_rng()).map(|s| (*s).clone())
    }
}

pub struct MinimumUtilization;

impl VmSelector for MinimumUtilization {
    fn select(&mut self, vms_cpu: &HashMap<String, Vec<u32>>, _vms_ram: &HashMap<String, u64>) -> Option<String> {
        vms_cpu
            .iter()
            .filter_map(|(uuid, history)| history.last().map(|mhz| (uuid, *mhz)))
            .min_by_key(|(_, mhz)| *mhz)
            .map(|(uuid, _)| uuid.clone())
    }
}

pub struct MinimumMigrationTime;

impl VmSelector for MinimumMigrationTime {
    fn select(&mut self, _vms_cpu: &HashMap<String, Vec<u32>>, vms_ram: &HashMap<String, u64>) -> Option<String> {
        vms_ram.iter().min_by_key(|(_, ram)| **ram).map(|(uuid, _)| uuid.clone())
    }
}

pub struct MinimumMigrationTimeMaxCpu {
    pub last_n: usize,
}

impl MinimumMigrationTimeMaxCpu {
    pub fn new(last_n: usize) -> Self {
        Self { last_n }
    }

    fn from_str(s: &str) -> Self {
        let options = parse_options(s);
        let last_n = options.get("last_n").expect("last_n option required").parse().unwrap();
        Self::new(last_n)
    }
}

impl VmSelector for MinimumMigrationTimeMaxCpu {
    fn select(&mut self, vms_cpu: &HashMap<String, Vec<u32>>, vms_ram: &HashMap<String, u64>) -> Option<String> {
        let min_ram = vms_ram.values().min().copied()?;
        let mut best: Option<(String, f64)> = None;
        // iteration order over a HashMap is arbitrary; the tie-break is
        // "first observed", so we walk a deterministic ordering of the
        // candidate set instead of relying on map iteration order.
        let mut candidates: Vec<&String> = vms_ram
            .iter()
            .filter(|(_, ram)| **ram == min_ram)
            .map(|(uuid, _)| uuid)
            .collect();
        candidates.sort();
        for uuid in candidates {
            let history = match vms_cpu.get(uuid) {
                Some(h) if !h.is_empty() => h,
                _ => continue,
            };
            let start = history.len().saturating_sub(self.last_n);
            let window = &history[start..];
            let mean = window.iter().map(|v| *v as f64).sum::<f64>() / window.len() as f64;
            match &best {
                Some((_, best_mean)) if mean > *best_mean => best = Some((uuid.clone(), mean)),
                None => best = Some((uuid.clone(), mean)),
                _ => {}
            }
        }
        best.map(|(uuid, _)| uuid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimum_migration_time_max_cpu_breaks_tie_by_higher_mean_cpu() {
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
    fn minimum_utilization_picks_lowest_latest_sample() {
        let vms_cpu = HashMap::from([("a".to_string(), vec![500u32]), ("b".to_string(), vec![100u32])]);
        let mut selector = MinimumUtilization;
        assert_eq!(selector.select(&vms_cpu, &HashMap::new()), Some("b".to_string()));
    }
}
