//! The two L-functions used by the bruteforce optimizer for a 2-state MHOD
//! policy. The reference project treats this module as a pluggable,
//! externally-supplied objective (its own source tree ships no public
//! implementation); the spec scopes it as opaque beyond the signature
//! `(state_vector, p, m) -> f64`.
//!
//! The pair below is the closed-form expected sojourn time of a Markov
//! chain in state `i`, capped at `m[i]` self-transitions and weighted by
//! whether the chain currently occupies state `i`
//! (`sum_{k=0}^{m_i} p[i][i]^k`), which is the standard L-function shape the
//! bruteforce objective/constraint pair in `bruteforce.rs` expects.

/// `L_0`: expected sojourn-time contribution of state 0.
pub fn l0(state_vector: &[f64], p: &[Vec<f64>], m: &[f64]) -> f64 {
    l(state_vector, p, m, 0)
}

/// `L_1` (= `L_N` for the 2-state configuration): expected sojourn-time
/// contribution of the overload state.
pub fn l1(state_vector: &[f64], p: &[Vec<f64>], m: &[f64]) -> f64 {
    l(state_vector, p, m, 1)
}

fn l(state_vector: &[f64], p: &[Vec<f64>], m: &[f64], i: usize) -> f64 {
    let pii = p[i][i].min(0.999_999);
    let steps = m[i].max(0.0);
    state_vector[i] * (1.0 - pii.powf(steps + 1.0)) / (1.0 - pii)
}

/// The L-function set for the 2-state configuration, in state order.
pub const LS: [fn(&[f64], &[Vec<f64>], &[f64]) -> f64; 2] = [l0, l1];
