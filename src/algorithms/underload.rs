//! Underload detection algorithms.
//!
//! All three are pure functions of the utilization history; they carry no
//! state of their own, but still implement [`UnderloadDetector`] so the
//! Local Manager can hold them as `Box<dyn UnderloadDetector>` alongside the
//! (stateful) overload detectors.

use crate::config::{parse_config_value, parse_options};

/// Returns whether the host should be considered underloaded given its
/// utilization-fraction history (oldest first, newest last).
pub trait UnderloadDetector: Send {
    fn detect(&mut self, utilization: &[f64]) -> bool;
}

pub fn underload_detector_resolver(config_str: &str) -> Box<dyn UnderloadDetector> {
    let (name, options) = parse_config_value(config_str);
    match name.as_str() {
        "always_underloaded" => Box::new(AlwaysUnderloaded),
        "threshold" => Box::new(Threshold::from_str(options.as_deref().unwrap_or(""))),
        "last_n_average_threshold" => Box::new(LastNAverageThreshold::from_str(options.as_deref().unwrap_or(""))),
        _ => panic!("can't resolve underload detector: {}", config_str),
    }
}

pub struct AlwaysUnderloaded;

impl UnderloadDetector for AlwaysUnderloaded {
    fn detect(&mut self, _utilization: &[f64]) -> bool {
        true
    }
}

pub struct Threshold {
    pub threshold: f64,
}

impl Threshold {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    fn from_str(s: &str) -> Self {
        let options = parse_options(s);
        let threshold = options.get("threshold").expect("threshold option required").parse().unwrap();
        Self::new(threshold)
    }
}

impl UnderloadDetector for Threshold {
    fn detect(&mut self, utilization: &[f64]) -> bool {
        match utilization.last() {
            Some(last) => *last <= self.threshold,
            None => false,
        }
    }
}

pub struct LastNAverageThreshold {
    pub threshold: f64,
    pub n: usize,
}

impl LastNAverageThreshold {
    pub fn new(threshold: f64, n: usize) -> Self {
        Self { threshold, n }
    }

    fn from_str(s: &str) -> Self {
        let options = parse_options(s);
        let threshold = options.get("threshold").expect("threshold option required").parse().unwrap();
        let n = options.get("n").expect("n option required").parse().unwrap();
        Self::new(threshold, n)
    }
}

impl UnderloadDetector for LastNAverageThreshold {
    fn detect(&mut self, utilization: &[f64]) -> bool {
        if utilization.is_empty() {
            return false;
        }
        let start = utilization.len().saturating_sub(self.n);
        let window = &utilization[start..];
        let mean = window.iter().sum::<f64>() / window.len() as f64;
        mean <= self.threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_false_on_empty_history() {
        assert!(!Threshold::new(0.5).detect(&[]));
    }

    #[test]
    fn threshold_compares_last_sample() {
        let mut d = Threshold::new(0.5);
        assert!(d.detect(&[0.9, 0.4]));
        assert!(!d.detect(&[0.4, 0.9]));
    }

    #[test]
    fn last_n_average_threshold() {
        let mut d = LastNAverageThreshold::new(0.5, 2);
        assert!(d.detect(&[0.9, 0.1, 0.1]));
        assert!(!d.detect(&[0.1, 0.9, 0.9]));
    }

    #[test]
    fn always_underloaded_is_always_true() {
        assert!(AlwaysUnderloaded.detect(&[]));
    }
}
