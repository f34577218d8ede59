//! End-to-end overload-detector scenarios (§8 scenarios 3-4) plus the
//! resolver's string-dispatch contract (§10.3).

use terracotta::algorithms::overload::mhod::{utilization_to_state, Mhod};
use terracotta::algorithms::overload::otf::Otf;
use terracotta::algorithms::overload::{overload_detector_resolver, OverloadDetector};

#[test]
fn otf_edge_scenario_fires_on_the_fourth_tick() {
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

#[test]
fn utilization_to_state_worked_example() {
    let state_config = [0.4, 0.8];
    let inputs = [0.0, 0.4, 0.7, 0.8, 1.0];
    let states: Vec<usize> = inputs.iter().map(|u| utilization_to_state(&state_config, *u)).collect();
    assert_eq!(states, vec![0, 1, 1, 2, 2]);
}

#[test]
fn mhod_replaying_the_same_history_twice_is_deterministic() {
    let utilization = [0.2, 0.3, 0.85, 0.9, 0.92, 0.3];
    let mut a = Mhod::new(vec![0.8], 0.1, vec![2, 3, 4], 0.5, 10, 300.0, 0.0);
    let mut b = Mhod::new(vec![0.8], 0.1, vec![2, 3, 4], 0.5, 10, 300.0, 0.0);
    a.detect(&utilization);
    b.detect(&utilization);
    assert_eq!(a.last_p, b.last_p);
    assert_eq!(a.last_selected_windows, b.last_selected_windows);
}

#[test]
fn resolver_dispatches_every_registered_name() {
    let names = ["otf[otf=0.5,threshold=0.7,limit=3]", "loess[threshold=0.7,param=0.5,length=10]", "mad_threshold[param=2.5,limit=10]", "iqr_threshold[param=1.5,limit=10]"];
    for name in names {
        let mut detector: Box<dyn OverloadDetector> = overload_detector_resolver(name, 300.0, 0.0);
        assert!(!detector.detect(&[]));
    }
}
