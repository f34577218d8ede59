//! Markov Host Overload Detection (MHOD).

mod bruteforce;
mod l_2_states;
pub mod multisize_estimation;

use serde::Deserialize;

use super::OverloadDetector;

#[derive(Debug, Deserialize)]
struct MhodParams {
    state_config: Vec<f64>,
    otf: f64,
    #[allow(dead_code)]
    history_size: usize,
    window_sizes: Vec<usize>,
    bruteforce_step: f64,
    learning_steps: usize,
}

pub struct Mhod {
    state_config: Vec<f64>,
    otf: f64,
    window_sizes: Vec<usize>,
    bruteforce_step: f64,
    learning_steps: usize,
    time_step_seconds: f64,
    migration_time_seconds: f64,
    time_in_states: u64,
    time_in_state_n: u64,
    /// Retained only for the "MHOD state replay" testable property: running
    /// MHOD twice from fresh state on the same utilization must yield
    /// identical `p` and `selected_windows`.
    pub last_p: Option<Vec<Vec<f64>>>,
    pub last_selected_windows: Option<Vec<Vec<usize>>>,
}

impl Mhod {
    pub fn new(
        state_config: Vec<f64>,
        otf: f64,
        window_sizes: Vec<usize>,
        bruteforce_step: f64,
        learning_steps: usize,
        time_step_seconds: f64,
        migration_time_seconds: f64,
    ) -> Self {
        Self {
            state_config,
            otf,
            window_sizes,
            bruteforce_step,
            learning_steps,
            time_step_seconds,
            migration_time_seconds,
            time_in_states: 0,
            time_in_state_n: 0,
            last_p: None,
            last_selected_windows: None,
        }
    }

    pub(super) fn from_str(options_json: &str, time_step_seconds: f64, migration_time_seconds: f64) -> Self {
        let params: MhodParams = serde_json::from_str(options_json).expect("invalid MHOD parameters JSON");
        Self::new(
            params.state_config,
            params.otf,
            params.window_sizes,
            params.bruteforce_step,
            params.learning_steps,
            time_step_seconds,
            migration_time_seconds,
        )
    }
}

/// Classifies a utilization value into the half-open interval
/// `[t_{s-1}, t_s)` it falls in, with `t_{-1} = -inf` and `t_N = +inf`
/// (SPEC_FULL.md §11.2 — the intended semantics, not the reference's
/// off-by-one).
pub fn utilization_to_state(state_config: &[f64], utilization: f64) -> usize {
    let mut prev = f64::NEG_INFINITY;
    for (state, threshold) in state_config.iter().enumerate() {
        if utilization >= prev && utilization < *threshold {
            return state;
        }
        prev = *threshold;
    }
    state_config.len()
}

fn utilization_to_states(state_config: &[f64], utilization: &[f64]) -> Vec<usize> {
    utilization.iter().map(|u| utilization_to_state(state_config, *u)).collect()
}

impl OverloadDetector for Mhod {
    fn detect(&mut self, utilization: &[f64]) -> bool {
        if utilization.is_empty() {
            return false;
        }
        let number_of_states = self.state_config.len() + 1;
        let max_window = *self.window_sizes.iter().max().expect("window_sizes must be non-empty");

        let mut request_windows = multisize_estimation::init_request_windows(number_of_states, max_window);
        let mut estimate_windows = multisize_estimation::init_deque_structure(&self.window_sizes, number_of_states);
        let mut variances = multisize_estimation::init_variances(&self.window_sizes, number_of_states);
        let mut acceptable_variances = multisize_estimation::init_variances(&self.window_sizes, number_of_states);

        let mut previous_state = 0usize;
        for current_state in utilization_to_states(&self.state_config, utilization) {
            multisize_estimation::update_request_windows(&mut request_windows, max_window, previous_state, current_state);
            multisize_estimation::update_estimate_windows(&mut estimate_windows, &request_windows, &self.window_sizes, previous_state);
            multisize_estimation::update_variances(&mut variances, &estimate_windows, &self.window_sizes, previous_state);
            multisize_estimation::update_acceptable_variances(&mut acceptable_variances, &estimate_windows, &self.window_sizes, previous_state);
            previous_state = current_state;
        }

        let selected_windows = multisize_estimation::select_window(&variances, &acceptable_variances, &self.window_sizes);
        let p = multisize_estimation::select_best_estimates(&estimate_windows, &selected_windows, &self.window_sizes);

        let current_state = utilization_to_state(&self.state_config, *utilization.last().unwrap());
        self.last_p = Some(p.clone());
        self.last_selected_windows = Some(selected_windows);

        let state_n = self.state_config.len();
        self.time_in_states += 1;
        if current_state == state_n {
            self.time_in_state_n += 1;
        }

        if utilization.len() >= self.learning_steps && current_state == state_n && p[state_n][state_n] > 0.0 {
            let state_vector: Vec<f64> = (0..number_of_states).map(|s| if s == current_state { 1.0 } else { 0.0 }).collect();
            let migration_time_steps = self.migration_time_seconds / self.time_step_seconds;
            let policy = bruteforce::optimize(
                self.bruteforce_step,
                1.0,
                self.otf,
                migration_time_steps,
                &state_vector,
                &p,
                self.time_in_states,
                self.time_in_state_n,
            );
            return policy.is_empty();
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utilization_to_state_half_open_intervals() {
        let state_config = [0.4, 0.8];
        let inputs = [0.0, 0.4, 0.7, 0.8, 1.0];
        let states: Vec<usize> = inputs.iter().map(|u| utilization_to_state(&state_config, *u)).collect();
        assert_eq!(states, vec![0, 1, 1, 2, 2]);
    }

    #[test]
    fn state_replay_is_deterministic() {
        let utilization = [0.1, 0.2, 0.9, 0.9, 0.95, 0.2, 0.1];
        let mut a = Mhod::new(vec![0.8], 0.1, vec![2, 3], 0.5, 10, 300.0, 0.0);
        let mut b = Mhod::new(vec![0.8], 0.1, vec![2, 3], 0.5, 10, 300.0, 0.0);
        a.detect(&utilization);
        b.detect(&utilization);
        assert_eq!(a.last_p, b.last_p);
        assert_eq!(a.last_selected_windows, b.last_selected_windows);
    }
}
