//! Overload detection algorithms.

pub mod loess;
pub mod mhod;
pub mod otf;
pub mod statistics;

use crate::config::parse_config_value;

/// Returns whether the host should be considered overloaded given its
/// utilization-fraction history (oldest first, newest last). Implementations
/// may carry their own state across calls (OTF's running counters, MHOD's
/// transition-window estimates) — the spec's opaque `state` dict is modeled
/// here as private fields on the concrete type, per SPEC_FULL.md §9.
pub trait OverloadDetector: Send {
    fn detect(&mut self, utilization: &[f64]) -> bool;
}

pub fn overload_detector_resolver(config_str: &str, time_step_seconds: f64, migration_time_seconds: f64) -> Box<dyn OverloadDetector> {
    let (name, options) = parse_config_value(config_str);
    let options = options.unwrap_or_default();
    match name.as_str() {
        "otf" => Box::new(otf::Otf::from_str(&options, migration_time_seconds)),
        "loess" => Box::new(loess::Loess::from_str(&options, migration_time_seconds, false)),
        "robust_loess" => Box::new(loess::Loess::from_str(&options, migration_time_seconds, true)),
        "mad_threshold" => Box::new(statistics::AdaptiveThreshold::from_str(&options, statistics::Spread::Mad)),
        "iqr_threshold" => Box::new(statistics::AdaptiveThreshold::from_str(&options, statistics::Spread::Iqr)),
        "mhod" => Box::new(mhod::Mhod::from_str(&options, time_step_seconds, migration_time_seconds)),
        _ => panic!("can't resolve overload detector: {}", config_str),
    }
}
