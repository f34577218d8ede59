//! MAD and IQR adaptive-threshold overload detectors.

use crate::config::parse_options;

use super::OverloadDetector;

#[derive(Clone, Copy)]
pub enum Spread {
    Mad,
    Iqr,
}

pub struct AdaptiveThreshold {
    pub param: f64,
    pub limit: usize,
    pub spread: Spread,
}

impl AdaptiveThreshold {
    pub fn new(param: f64, limit: usize, spread: Spread) -> Self {
        Self { param, limit, spread }
    }

    pub(super) fn from_str(s: &str, spread: Spread) -> Self {
        let options = parse_options(s);
        let param = options.get("param").expect("param option required").parse().unwrap();
        let limit = options.get("limit").expect("limit option required").parse().unwrap();
        Self::new(param, limit, spread)
    }
}

impl OverloadDetector for AdaptiveThreshold {
    fn detect(&mut self, utilization: &[f64]) -> bool {
        if utilization.len() < self.limit {
            return false;
        }
        let spread = match self.spread {
            Spread::Mad => mad(utilization),
            Spread::Iqr => iqr(utilization),
        };
        let adaptive = 1.0 - self.param * spread;
        adaptive <= *utilization.last().unwrap()
    }
}

/// Median Absolute Deviation: `median(|x - median(x)| for x in data)`.
pub fn mad(data: &[f64]) -> f64 {
    let mut sorted = data.to_vec();
    let center = median(&mut sorted);
    let mut deviations: Vec<f64> = data.iter().map(|x| (x - center).abs()).collect();
    median(&mut deviations)
}

/// Interquartile range using the order-statistic indices
/// `round(0.25*(n+1))-1` and `round(0.75*(n+1))-1` on sorted data.
pub fn iqr(data: &[f64]) -> f64 {
    let mut sorted = data.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let n = (data.len() + 1) as f64;
    let q1 = (0.25 * n).round() as usize - 1;
    let q3 = (0.75 * n).round() as usize - 1;
    sorted[q3] - sorted[q1]
}

fn median(data: &mut [f64]) -> f64 {
    data.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let n = data.len();
    if n % 2 == 1 {
        data[n / 2]
    } else {
        (data[n / 2 - 1] + data[n / 2]) / 2.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mad_of_constant_series_is_zero() {
        assert_eq!(mad(&[0.5, 0.5, 0.5]), 0.0);
    }

    #[test]
    fn iqr_matches_order_statistics() {
        let data = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0];
        // n+1 = 9; q1 index = round(2.25)-1 = 1; q3 index = round(6.75)-1 = 6
        assert_eq!(iqr(&data), 7.0 - 2.0);
    }

    #[test]
    fn false_below_limit() {
        let mut d = AdaptiveThreshold::new(0.5, 5, Spread::Mad);
        assert!(!d.detect(&[0.5, 0.5]));
    }
}
