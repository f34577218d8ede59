//! Exhaustive grid-search NLP solver for the 2-state MHOD policy.

use super::l_2_states::LS;

type LFn = fn(&[f64], &[Vec<f64>], &[f64]) -> f64;

fn frange(start: f64, limit: f64, step: f64) -> impl Iterator<Item = f64> {
    let steps = ((limit - start) / step).ceil().max(0.0) as usize;
    (0..steps).map(move |i| start + step * i as f64)
}

fn objective(ls: &[LFn], state_vector: &[f64], p: &[Vec<f64>], m: &[f64]) -> f64 {
    ls.iter().map(|l| l(state_vector, p, m)).sum()
}

fn constraint_satisfied(
    ls: &[LFn],
    otf: f64,
    migration_time: f64,
    state_vector: &[f64],
    p: &[Vec<f64>],
    m: &[f64],
    time_in_states: u64,
    time_in_state_n: u64,
) -> bool {
    let last = ls.last().unwrap();
    let numerator = migration_time + time_in_state_n as f64 + last(state_vector, p, m);
    let denominator = migration_time + time_in_states as f64 + objective(ls, state_vector, p, m);
    if denominator == 0.0 {
        return false;
    }
    numerator / denominator <= otf
}

/// Grid search over `[0, limit]^2` for the policy `(m0, m1)` maximizing the
/// sum of L-functions subject to the OTF constraint. Returns an empty
/// solution when no feasible point beats the initial best of 0.
#[allow(clippy::too_many_arguments)]
pub fn solve2(
    step: f64,
    limit: f64,
    otf: f64,
    migration_time: f64,
    state_vector: &[f64],
    p: &[Vec<f64>],
    time_in_states: u64,
    time_in_state_n: u64,
) -> Vec<f64> {
    let mut best = 0.0;
    let mut solution = Vec::new();
    for x in frange(0.0, limit, step) {
        for y in frange(0.0, limit, step) {
            let m = [x, y];
            let res = objective(&LS, state_vector, p, &m);
            if res > best && constraint_satisfied(&LS, otf, migration_time, state_vector, p, &m, time_in_states, time_in_state_n) {
                best = res;
                solution = vec![x, y];
            }
        }
    }
    solution
}

/// `optimize` in the reference source is a thin wrapper composing the
/// objective and the constraint before handing them to the grid search;
/// here that composition is inlined into [`solve2`] directly.
#[allow(clippy::too_many_arguments)]
pub fn optimize(
    step: f64,
    limit: f64,
    otf: f64,
    migration_time: f64,
    state_vector: &[f64],
    p: &[Vec<f64>],
    time_in_states: u64,
    time_in_state_n: u64,
) -> Vec<f64> {
    solve2(step, limit, otf, migration_time, state_vector, p, time_in_states, time_in_state_n)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returns_empty_when_no_point_beats_initial_best() {
        let p = vec![vec![0.0, 0.0], vec![0.0, 0.0]];
        let state_vector = [0.0, 1.0];
        let solution = optimize(0.5, 1.0, 0.1, 0.0, &state_vector, &p, 10, 5);
        assert!(solution.is_empty());
    }
}
