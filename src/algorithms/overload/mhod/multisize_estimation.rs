//! Multi-size sliding-window transition-probability estimation for MHOD.
//!
//! Mirrors the reference's per-`(from_state, to_state)` nested structures
//! (`request_windows`, `estimate_windows`, `variances`,
//! `acceptable_variances`) one-for-one, replacing Python's `dict`-of-`dict`
//! nesting with fixed `Vec<Vec<_>>` indexed by state and `window_sizes`'
//! position.

use std::collections::VecDeque;

/// Per from-state FIFO of observed next states, capped at `max(window_sizes)`.
pub type RequestWindows = Vec<VecDeque<usize>>;

/// `[from][to][window_size_index]` → sliding window of probability estimates.
pub type EstimateWindows = Vec<Vec<Vec<VecDeque<f64>>>>;

/// `[from][to][window_size_index]` → value (variance, or acceptable variance).
pub type VarianceTable = Vec<Vec<Vec<f64>>>;

pub fn mean(data: &[usize], window_size: usize) -> f64 {
    data.iter().sum::<usize>() as f64 / window_size as f64
}

pub fn variance(data: &[f64], window_size: usize) -> f64 {
    let m = data.iter().sum::<f64>() / window_size as f64;
    data.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (window_size as f64 - 1.0)
}

pub fn acceptable_variance(probability: f64, window_size: usize) -> f64 {
    probability * (1.0 - probability) / window_size as f64
}

pub fn estimate_probability(data: &[usize], window_size: usize, state: usize) -> f64 {
    data.iter().filter(|s| **s == state).count() as f64 / window_size as f64
}

pub fn update_request_windows(windows: &mut RequestWindows, max_window_size: usize, previous_state: usize, current_state: usize) {
    let window = &mut windows[previous_state];
    if window.len() == max_window_size {
        window.pop_front();
    }
    window.push_back(current_state);
}

pub fn update_estimate_windows(
    estimate_windows: &mut EstimateWindows,
    request_windows: &RequestWindows,
    window_sizes: &[usize],
    previous_state: usize,
) {
    let request_window = &request_windows[previous_state];
    let contiguous: Vec<usize> = request_window.iter().copied().collect();
    for (state, per_window) in estimate_windows[previous_state].iter_mut().enumerate() {
        for (idx, window_size) in window_sizes.iter().enumerate() {
            let slice_from = contiguous.len().saturating_sub(*window_size);
            let probability = estimate_probability(&contiguous[slice_from..], *window_size, state);
            let deque = &mut per_window[idx];
            if deque.len() == *window_size {
                deque.pop_front();
            }
            deque.push_back(probability);
        }
    }
}

pub fn update_variances(
    variances: &mut VarianceTable,
    estimate_windows: &EstimateWindows,
    window_sizes: &[usize],
    previous_state: usize,
) {
    let number_of_states = variances[previous_state].len();
    for state in 0..number_of_states {
        for (idx, window_size) in window_sizes.iter().enumerate() {
            let estimates = &estimate_windows[previous_state][state][idx];
            variances[previous_state][state][idx] = if estimates.len() < *window_size {
                1.0
            } else {
                let data: Vec<f64> = estimates.iter().copied().collect();
                variance(&data, *window_size)
            };
        }
    }
}

pub fn update_acceptable_variances(
    acceptable_variances: &mut VarianceTable,
    estimate_windows: &EstimateWindows,
    window_sizes: &[usize],
    previous_state: usize,
) {
    let number_of_states = acceptable_variances[previous_state].len();
    for state in 0..number_of_states {
        for (idx, window_size) in window_sizes.iter().enumerate() {
            let estimates = &estimate_windows[previous_state][state][idx];
            if let Some(last) = estimates.back() {
                acceptable_variances[previous_state][state][idx] = acceptable_variance(*last, *window_size);
            }
        }
    }
}

/// For each `(i, j)`, selects the largest window size whose empirical
/// variance does not exceed its acceptable variance.
pub fn select_window(variances: &VarianceTable, acceptable_variances: &VarianceTable, window_sizes: &[usize]) -> Vec<Vec<usize>> {
    let n = variances.len();
    let mut selected = vec![vec![0usize; n]; n];
    for i in 0..n {
        for j in 0..n {
            let mut selected_size = window_sizes[0];
            for (idx, window_size) in window_sizes.iter().enumerate() {
                if variances[i][j][idx] > acceptable_variances[i][j][idx] {
                    break;
                }
                selected_size = *window_size;
            }
            selected[i][j] = selected_size;
        }
    }
    selected
}

pub fn select_best_estimates(estimate_windows: &EstimateWindows, selected_windows: &[Vec<usize>], window_sizes: &[usize]) -> Vec<Vec<f64>> {
    let n = estimate_windows.len();
    let mut result = vec![vec![0.0f64; n]; n];
    for i in 0..n {
        for j in 0..n {
            let selected_size = selected_windows[i][j];
            let idx = window_sizes.iter().position(|w| *w == selected_size).unwrap();
            result[i][j] = estimate_windows[i][j][idx].back().copied().unwrap_or(0.0);
        }
    }
    result
}

pub fn init_request_windows(number_of_states: usize, max_window_size: usize) -> RequestWindows {
    (0..number_of_states).map(|_| VecDeque::with_capacity(max_window_size)).collect()
}

pub fn init_variances(window_sizes: &[usize], number_of_states: usize) -> VarianceTable {
    vec![vec![vec![1.0; window_sizes.len()]; number_of_states]; number_of_states]
}

pub fn init_deque_structure(window_sizes: &[usize], number_of_states: usize) -> EstimateWindows {
    (0..number_of_states)
        .map(|_| {
            (0..number_of_states)
                .map(|_| window_sizes.iter().map(|w| VecDeque::with_capacity(*w)).collect())
                .collect()
        })
        .collect()
}
