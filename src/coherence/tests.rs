use super::*;

fn detector() -> CoherenceDetector {
    CoherenceDetector::from_config(&RuleConfig::default_config())
}

fn address(spatial: &str, domain_alignment: &str) -> Address {
    Address::new(spatial, domain_alignment, "20240101120000Z")
}

fn gates(names: &[&str]) -> Vec<String> {
    names.iter().map(|g| g.to_string()).collect()
}

const PRIMES: [u64; 5] = [2, 3, 5, 7, 11];

#[test]
fn test_node_in_credentials_is_coherent() {
    let outcome = detector().check_credential_address(&PRIMES, &address("FIELD/node-1/011", ""));
    assert!(outcome.is_coherent());
}

#[test]
fn test_node_outside_credentials_is_critical_drift() {
    let outcome = detector().check_credential_address(&PRIMES, &address("FIELD/node-1/4", ""));
    assert_eq!(outcome.classification(), CoherenceState::CriticalDrift);
    assert!(outcome.has_drift_point(DriftPoint::PrimeSpatialMisalignment));
    assert_eq!(
        outcome.drift().map(|d| d.code),
        Some(CoherenceCode::CredentialAddressIncoherence)
    );
}

#[test]
fn test_empty_spatial_or_node_is_not_checked() {
    let d = detector();
    assert!(d.check_credential_address(&PRIMES, &address("", "")).is_coherent());
    assert!(d
        .check_credential_address(&PRIMES, &address("FIELD/node-1/", ""))
        .is_coherent());
}

#[test]
fn test_non_numeric_node_is_system_error() {
    let outcome =
        detector().check_credential_address(&PRIMES, &address("FIELD/node-1/abc", ""));
    assert_eq!(outcome.classification(), CoherenceState::CriticalDrift);
    assert!(outcome.has_drift_point(DriftPoint::SystemError));
    assert_eq!(
        outcome.drift().map(|d| d.code),
        Some(CoherenceCode::CoherenceCheckError)
    );
}

#[test]
fn test_gate_temporal_follows_cycle() {
    let d = detector();
    assert!(d.check_gate_temporal("🜂", &[]).is_coherent());
    assert!(d.check_gate_temporal("🜂", &gates(&["🜂", "🜄", "🜃", "🜁"])).is_coherent());

    let outcome = d.check_gate_temporal("🜃", &gates(&["🜂"]));
    assert_eq!(outcome.classification(), CoherenceState::PartialDrift);
    assert!(outcome.has_drift_point(DriftPoint::GateTemporalMisalignment));
}

#[test]
fn test_last_gate_as_proposal_is_partial_drift() {
    // Re-proposing the last accepted gate never matches its own successor.
    let active = gates(&["🜂", "🜄", "🜃"]);
    let outcome = detector().check_gate_temporal("🜃", &active);
    assert_eq!(outcome.classification(), CoherenceState::PartialDrift);
}

#[test]
fn test_gate_temporal_with_unknown_history_is_system_error() {
    let outcome = detector().check_gate_temporal("🜂", &gates(&["?"]));
    assert!(outcome.has_drift_point(DriftPoint::SystemError));
}

#[test]
fn test_address_gate_uses_domain_map() {
    let d = detector();
    assert!(d
        .check_address_gate(&address("", "OBI-WAN/core"), "🜂", "BERJAK")
        .is_coherent());

    let wrong_target = d.check_address_gate(&address("", "OBI-WAN/core"), "🜂", "INFINITY");
    assert_eq!(wrong_target.classification(), CoherenceState::CriticalDrift);
    assert!(wrong_target.has_drift_point(DriftPoint::SpatialGateMisalignment));

    let unrouted_gate = d.check_address_gate(&address("", "OBI-WAN/core"), "🜁", "BERJAK");
    assert!(!unrouted_gate.is_coherent());
}

#[test]
fn test_check_full_returns_first_failure() {
    let d = detector();
    let bad_node = address("FIELD/node-1/004", "BERJAK/core");
    let active = gates(&["🜂"]);
    let input = CoherenceInput {
        credential_sequence: &PRIMES,
        address: &bad_node,
        active_gates: &active,
    };

    // Every relation is broken; only the first is reported.
    let outcome = d.check_full(input, "🜁", "OBI-WAN");
    let drift = outcome.drift().expect("drift expected");
    assert_eq!(
        drift.drift_points,
        BTreeSet::from([DriftPoint::PrimeSpatialMisalignment])
    );

    let good_node = address("FIELD/node-1/011", "BERJAK/core");
    let input = CoherenceInput {
        address: &good_node,
        ..input
    };
    let outcome = d.check_full(input, "🜁", "OBI-WAN");
    assert!(outcome.has_drift_point(DriftPoint::GateTemporalMisalignment));

    let outcome = d.check_full(input, "🜄", "OBI-WAN");
    assert!(outcome.has_drift_point(DriftPoint::SpatialGateMisalignment));

    assert!(d.check_full(input, "🜄", "INFINITY").is_coherent());
}

#[test]
fn test_record_is_last_write_wins() {
    let mut d = detector();
    assert_eq!(d.coherence_state(), CoherenceState::Coherent);

    let drift = d.check_gate_temporal("🜃", &[]);
    assert_eq!(d.record(&drift), CoherenceState::PartialDrift);
    assert_eq!(d.record(&CoherenceOutcome::coherent()), CoherenceState::Coherent);

    let history = d.drift_history();
    assert_eq!(history.len(), 2);
    assert!(history[0]
        .drift_points
        .contains(&DriftPoint::GateTemporalMisalignment));
    assert!(history[1].drift_points.is_empty());
    assert_eq!(d.coherence_state(), CoherenceState::Coherent);
}

#[test]
fn test_checks_do_not_record() {
    let d = detector();
    let _ = d.check_gate_temporal("🜃", &[]);
    assert!(d.drift_history().is_empty());
}
