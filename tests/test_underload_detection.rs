//! Underload detector scenarios and the resolver's string-dispatch contract.

use terracotta::algorithms::underload::{underload_detector_resolver, LastNAverageThreshold, Threshold, UnderloadDetector};

#[test]
fn threshold_is_false_on_an_empty_history() {
    let mut d = Threshold::new(0.5);
    assert!(!d.detect(&[]));
}

#[test]
fn threshold_compares_only_the_latest_sample() {
    let mut d = Threshold::new(0.5);
    assert!(d.detect(&[0.9, 0.4]));
    assert!(!d.detect(&[0.4, 0.9]));
}

#[test]
fn last_n_average_threshold_windows_the_tail() {
    let mut d = LastNAverageThreshold::new(0.5, 2);
    assert!(d.detect(&[0.9, 0.1, 0.1]));
    assert!(!d.detect(&[0.1, 0.9, 0.9]));
}

#[test]
fn resolver_dispatches_every_registered_name() {
    let mut always: Box<dyn UnderloadDetector> = underload_detector_resolver("always_underloaded");
    assert!(always.detect(&[0.9]));

    let mut threshold: Box<dyn UnderloadDetector> = underload_detector_resolver("threshold[threshold=0.3]");
    assert!(!threshold.detect(&[0.9]));

    let mut last_n: Box<dyn UnderloadDetector> = underload_detector_resolver("last_n_average_threshold[threshold=0.5,n=2]");
    assert!(last_n.detect(&[0.1, 0.1]));
}
