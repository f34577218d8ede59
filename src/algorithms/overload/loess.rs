//! Loess and robust-Loess trend-based overload detectors.
//!
//! The reference implementation fits its local regression with
//! `scipy.optimize.leastsq`; there is no equivalent numerical-optimization
//! crate in this stack, so the weighted least-squares line `y = a + b*x` is
//! solved directly from the normal equations, which is exact for this
//! (linear, two-parameter) model and avoids pulling in an optimizer crate
//! for what is otherwise closed-form.

use crate::config::parse_options;

use super::OverloadDetector;

pub struct Loess {
    pub threshold: f64,
    pub param: f64,
    pub length: usize,
    pub migration_time_normalized: f64,
    pub robust: bool,
}

impl Loess {
    pub fn new(threshold: f64, param: f64, length: usize, migration_time_normalized: f64, robust: bool) -> Self {
        Self {
            threshold,
            param,
            length,
            migration_time_normalized,
            robust,
        }
    }

    pub(super) fn from_str(s: &str, migration_time_seconds: f64, robust: bool) -> Self {
        let options = parse_options(s);
        let threshold = options.get("threshold").expect("threshold option required").parse().unwrap();
        let param = options.get("param").expect("param option required").parse().unwrap();
        let length = options.get("length").expect("length option required").parse().unwrap();
        let time_step: f64 = options.get("time_step").map(|v| v.parse().unwrap()).unwrap_or(1.0);
        Self::new(threshold, param, length, migration_time_seconds / time_step, robust)
    }
}

impl OverloadDetector for Loess {
    fn detect(&mut self, utilization: &[f64]) -> bool {
        if utilization.len() < self.length {
            return false;
        }
        let window = &utilization[utilization.len() - self.length..];
        let (a, b) = if self.robust {
            robust_parameter_estimates(window)
        } else {
            parameter_estimates(window)
        };
        let prediction = a + b * (self.length as f64 + self.migration_time_normalized);
        self.param * prediction >= self.threshold
    }
}

/// `y = a + b*x` fit over `x = 1..=n`, weighted by [`tricube_weights`].
fn parameter_estimates(data: &[f64]) -> (f64, f64) {
    let n = data.len();
    let x: Vec<f64> = (1..=n).map(|v| v as f64).collect();
    let weights = tricube_weights(n);
    weighted_linear_fit(&x, data, &weights)
}

/// Re-weights the tricube fit's residuals with [`tricube_bisquare_weights`]
/// and refits, matching the source's two-pass robust estimator.
fn robust_parameter_estimates(data: &[f64]) -> (f64, f64) {
    let n = data.len();
    let x: Vec<f64> = (1..=n).map(|v| v as f64).collect();
    let weights = tricube_weights(n);
    let (a, b) = weighted_linear_fit(&x, data, &weights);
    let residuals: Vec<f64> = x.iter().zip(data.iter()).map(|(xi, yi)| yi - (a + b * xi)).collect();
    let weights2 = tricube_bisquare_weights(&residuals);
    weighted_linear_fit(&x, data, &weights2)
}

fn weighted_linear_fit(x: &[f64], y: &[f64], weights: &[f64]) -> (f64, f64) {
    let sw: f64 = weights.iter().sum();
    let swx: f64 = weights.iter().zip(x).map(|(w, xi)| w * xi).sum();
    let swy: f64 = weights.iter().zip(y).map(|(w, yi)| w * yi).sum();
    let swxx: f64 = weights.iter().zip(x).map(|(w, xi)| w * xi * xi).sum();
    let swxy: f64 = weights
        .iter()
        .zip(x.iter().zip(y))
        .map(|(w, (xi, yi))| w * xi * yi)
        .sum();
    let det = sw * swxx - swx * swx;
    let a = (swy * swxx - swx * swxy) / det;
    let b = (sw * swxy - swx * swy) / det;
    (a, b)
}

fn tricube_weights(n: usize) -> Vec<f64> {
    let spread = (n - 1) as f64;
    let mut weights = Vec::new();
    for i in 2..n {
        let w = (1.0 - ((spread - i as f64) / spread).powi(3)).powi(3);
        weights.push(w);
    }
    let mut result = vec![weights[0], weights[0]];
    result.extend(weights);
    result
}

fn tricube_bisquare_weights(data: &[f64]) -> Vec<f64> {
    let n = data.len();
    let mut abs_data: Vec<f64> = data.iter().map(|v| v.abs()).collect();
    let s6 = 6.0 * median(&mut abs_data);
    let weights = tricube_weights(n);
    let mut weights2 = Vec::new();
    for i in 2..n {
        weights2.push(weights[i] * (1.0 - (data[i] / s6).powi(2)).powi(2));
    }
    let mut result = vec![weights2[0], weights2[0]];
    result.extend(weights2);
    result
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
    fn false_when_history_shorter_than_length() {
        let mut d = Loess::new(0.8, 1.0, 5, 0.0, false);
        assert!(!d.detect(&[0.5, 0.5]));
    }

    #[test]
    fn rising_trend_triggers_overload() {
        let mut d = Loess::new(0.8, 1.2, 5, 1.0, false);
        let history = [0.5, 0.6, 0.7, 0.8, 0.9];
        assert!(d.detect(&history));
    }

    #[test]
    fn robust_variant_runs_without_panicking() {
        let mut d = Loess::new(0.8, 1.0, 5, 1.0, true);
        let history = [0.5, 0.5, 0.9, 0.5, 0.5];
        let _ = d.detect(&history);
    }
}
