//! OTF ("Overload Time Fraction") overload detector.

use crate::config::parse_options;

use super::OverloadDetector;

pub struct Otf {
    pub otf: f64,
    pub threshold: f64,
    pub limit: usize,
    pub migration_time: f64,
    overload: u64,
    total: u64,
}

impl Otf {
    pub fn new(otf: f64, threshold: f64, limit: usize, migration_time: f64) -> Self {
        Self {
            otf,
            threshold,
            limit,
            migration_time,
            overload: 0,
            total: 0,
        }
    }

    pub(super) fn from_str(s: &str, migration_time: f64) -> Self {
        let options = parse_options(s);
        let otf = options.get("otf").expect("otf option required").parse().unwrap();
        let threshold = options.get("threshold").expect("threshold option required").parse().unwrap();
        let limit = options.get("limit").expect("limit option required").parse().unwrap();
        Self::new(otf, threshold, limit, migration_time)
    }
}

impl OverloadDetector for Otf {
    fn detect(&mut self, utilization: &[f64]) -> bool {
        let last = match utilization.last() {
            Some(v) => *v,
            None => return false,
        };
        self.total += 1;
        if last >= self.threshold {
            self.overload += 1;
        }
        if last < self.threshold || utilization.len() < self.limit {
            return false;
        }
        (self.migration_time + self.overload as f64) / (self.migration_time + self.total as f64) >= self.otf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn otf_edge_scenario() {
        let mut otf = Otf::new(0.5, 0.7, 3, 0.0);
        let ticks = [0.6, 0.6, 0.8, 0.8];
        let mut history = Vec::new();
        let mut decisions = Vec::new();
        for u in ticks {
            history.push(u);
            decisions.push(otf.detect(&history));
        }
        assert_eq!(decisions, vec![false, false, false, true]);
    }
}
