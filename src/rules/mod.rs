//! Field-level rule validation.
//!
//! Stateless checks of a single aspect of a flow against the loaded rule
//! configuration. These functions never log and never mutate anything; the
//! state machine decides what a failure means for the flow.

use crate::config::RuleConfig;
use crate::domain::{ErrorCode, GateCycle, ValidationOutcome};
use anyhow::Result;
use regex::Regex;

/// Per-field validation consumed by the flow state machine.
pub trait FieldRules: Send + Sync {
    /// Strictly increasing primes. Monotonicity is checked before primality.
    fn validate_credential_sequence(&self, sequence: &[u64]) -> ValidationOutcome;

    /// Spatial, domain-alignment and temporal components, in that order.
    fn validate_address(
        &self,
        spatial: &str,
        domain_alignment: &str,
        temporal: &str,
    ) -> ValidationOutcome;

    /// Gate membership, domain pair compatibility, then cycle order relative
    /// to the gates already accepted.
    fn validate_gate_transition(
        &self,
        gate: &str,
        from_domain: &str,
        to_domain: &str,
        active_gates: &[String],
    ) -> ValidationOutcome;
}

/// [`FieldRules`] backed by a [`RuleConfig`].
#[derive(Debug, Clone)]
pub struct RuleValidator {
    spatial: Regex,
    domain_alignment: Regex,
    temporal: Regex,
    gate_cycle: GateCycle,
    domains: Vec<String>,
}

impl RuleValidator {
    /// Compiles the configured patterns once.
    pub fn new(config: &RuleConfig) -> Result<Self> {
        let rules = &config.address_rules;
        Ok(Self {
            spatial: rules.spatial.compile("spatial")?,
            domain_alignment: rules.domain_alignment.compile("domain_alignment")?,
            temporal: rules.temporal.compile("temporal")?,
            gate_cycle: config.gate_cycle.clone(),
            domains: config.domains.clone(),
        })
    }

    pub fn gate_cycle(&self) -> &GateCycle {
        &self.gate_cycle
    }

    fn domains_compatible(&self, from: &str, to: &str) -> bool {
        let known = |name: &str| self.domains.iter().any(|d| d == name);
        known(from) && known(to)
    }
}

/// Trial-division primality test.
pub fn is_prime(n: u64) -> bool {
    if n < 2 {
        return false;
    }
    let mut i = 2u64;
    while i <= n / i {
        if n % i == 0 {
            return false;
        }
        i += 1;
    }
    true
}

/// Pattern must match at the start of the value.
fn matches_from_start(pattern: &Regex, value: &str) -> bool {
    pattern.find(value).is_some_and(|m| m.start() == 0)
}

impl FieldRules for RuleValidator {
    fn validate_credential_sequence(&self, sequence: &[u64]) -> ValidationOutcome {
        if sequence.windows(2).any(|pair| pair[0] >= pair[1]) {
            return ValidationOutcome::failed(
                ErrorCode::NonIncreasingSequence,
                "Credential sequence is not strictly increasing",
            );
        }

        if let Some(&value) = sequence.iter().find(|&&n| !is_prime(n)) {
            return ValidationOutcome::failed(
                ErrorCode::NonPrimeCredential,
                format!("Non-prime number {} detected in credential sequence", value),
            )
            .with_detail("value", value);
        }

        ValidationOutcome::passed()
    }

    fn validate_address(
        &self,
        spatial: &str,
        domain_alignment: &str,
        temporal: &str,
    ) -> ValidationOutcome {
        let checks = [
            (&self.spatial, spatial, ErrorCode::InvalidSpatialComponent, "spatial component"),
            (
                &self.domain_alignment,
                domain_alignment,
                ErrorCode::InvalidDomainAlignment,
                "domain alignment",
            ),
            (&self.temporal, temporal, ErrorCode::InvalidTemporalMarker, "temporal marker"),
        ];

        for (pattern, value, code, label) in checks {
            if !matches_from_start(pattern, value) {
                return ValidationOutcome::failed(code, format!("Invalid {}: {}", label, value))
                    .with_detail("value", value);
            }
        }

        ValidationOutcome::passed()
    }

    fn validate_gate_transition(
        &self,
        gate: &str,
        from_domain: &str,
        to_domain: &str,
        active_gates: &[String],
    ) -> ValidationOutcome {
        if !self.gate_cycle.contains(gate) {
            return ValidationOutcome::failed(
                ErrorCode::InvalidGate,
                format!("Invalid gate symbol: {}", gate),
            );
        }

        if !self.domains_compatible(from_domain, to_domain) {
            return ValidationOutcome::failed(
                ErrorCode::IncompatibleDomains,
                format!(
                    "Incompatible domain transition: {} -> {}",
                    from_domain, to_domain
                ),
            );
        }

        match self.gate_cycle.expected_next(active_gates) {
            Ok(expected) if expected == gate => ValidationOutcome::passed(),
            Ok(expected) => ValidationOutcome::failed(
                ErrorCode::GateSequenceViolation,
                format!("Gate sequence violation: expected {}, got {}", expected, gate),
            )
            .with_detail("expected", expected),
            Err(e) => ValidationOutcome::internal(e),
        }
    }
}
