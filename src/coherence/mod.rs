//! Cross-field coherence checks.
//!
//! Each aspect of a flow can be individually valid while still disagreeing
//! with the others. The detector checks three relations over a read-only
//! snapshot:
//!
//! 1. credential sequence vs. the address's node identifier
//! 2. proposed gate vs. the gates already accepted
//! 3. address domain + proposed gate vs. the target domain
//!
//! The checks are pure. Recording a result into the drift history is a
//! separate, explicit step.

use crate::config::{GateDomainMap, RuleConfig};
use crate::domain::{
    Address, CoherenceCode, CoherenceOutcome, CoherenceState, DriftPoint, FlowError, GateCycle,
    TimestampUtc,
};
use serde::Serialize;
use std::collections::BTreeSet;

/// Read-only view of the flow fields the detector cross-checks.
#[derive(Debug, Clone, Copy)]
pub struct CoherenceInput<'a> {
    pub credential_sequence: &'a [u64],
    pub address: &'a Address,
    pub active_gates: &'a [String],
}

/// One entry of the drift audit trail.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DriftRecord {
    pub timestamp: TimestampUtc,
    pub state: CoherenceState,
    pub drift_points: BTreeSet<DriftPoint>,
}

#[derive(Debug, Clone)]
pub struct CoherenceDetector {
    gate_cycle: GateCycle,
    gate_domain_map: GateDomainMap,
    coherence_state: CoherenceState,
    drift_history: Vec<DriftRecord>,
}

impl CoherenceDetector {
    pub fn new(gate_cycle: GateCycle, gate_domain_map: GateDomainMap) -> Self {
        Self {
            gate_cycle,
            gate_domain_map,
            coherence_state: CoherenceState::Coherent,
            drift_history: Vec::new(),
        }
    }

    pub fn from_config(config: &RuleConfig) -> Self {
        Self::new(config.gate_cycle.clone(), config.gate_domain_map.clone())
    }

    /// The node identifier at the end of the spatial component must be one
    /// of the credentials. An empty spatial component is not checked.
    pub fn check_credential_address(
        &self,
        credential_sequence: &[u64],
        address: &Address,
    ) -> CoherenceOutcome {
        match node_id(address) {
            Ok(Some(node)) if !credential_sequence.contains(&node) => CoherenceOutcome::drifted(
                CoherenceState::CriticalDrift,
                DriftPoint::PrimeSpatialMisalignment,
                CoherenceCode::CredentialAddressIncoherence,
                format!(
                    "Node {} does not align with credential sequence {:?}",
                    node, credential_sequence
                ),
            ),
            Ok(_) => CoherenceOutcome::coherent(),
            Err(e) => CoherenceOutcome::system_error(e),
        }
    }

    /// The proposed gate must be the successor of the last accepted gate.
    /// This is the only relation whose failure is recoverable.
    pub fn check_gate_temporal(&self, gate: &str, active_gates: &[String]) -> CoherenceOutcome {
        match self.gate_cycle.expected_next(active_gates) {
            Ok(expected) if expected == gate => CoherenceOutcome::coherent(),
            Ok(_) => CoherenceOutcome::drifted(
                CoherenceState::PartialDrift,
                DriftPoint::GateTemporalMisalignment,
                CoherenceCode::GateTemporalIncoherence,
                format!("Gate {} violates temporal sequence", gate),
            ),
            Err(e) => CoherenceOutcome::system_error(e),
        }
    }

    /// The domain named by the address must be a source the gate can route
    /// to `target_domain`.
    pub fn check_address_gate(
        &self,
        address: &Address,
        gate: &str,
        target_domain: &str,
    ) -> CoherenceOutcome {
        let source = address.aligned_domain();
        let allowed = self
            .gate_domain_map
            .get(gate)
            .and_then(|routes| routes.get(source))
            .is_some_and(|targets| targets.iter().any(|t| t == target_domain));

        if allowed {
            CoherenceOutcome::coherent()
        } else {
            CoherenceOutcome::drifted(
                CoherenceState::CriticalDrift,
                DriftPoint::SpatialGateMisalignment,
                CoherenceCode::AddressGateIncoherence,
                format!(
                    "Gate {} incompatible with domain transition {} -> {}",
                    gate, source, target_domain
                ),
            )
        }
    }

    /// Runs the three relations in fixed order and returns the first drift.
    pub fn check_full(
        &self,
        input: CoherenceInput<'_>,
        gate: &str,
        target_domain: &str,
    ) -> CoherenceOutcome {
        let credential_address =
            self.check_credential_address(input.credential_sequence, input.address);
        if !credential_address.is_coherent() {
            return credential_address;
        }

        let gate_temporal = self.check_gate_temporal(gate, input.active_gates);
        if !gate_temporal.is_coherent() {
            return gate_temporal;
        }

        let address_gate = self.check_address_gate(input.address, gate, target_domain);
        if !address_gate.is_coherent() {
            return address_gate;
        }

        CoherenceOutcome::coherent()
    }

    /// Appends `outcome` to the drift history; its classification becomes
    /// the current state, whatever came before.
    pub fn record(&mut self, outcome: &CoherenceOutcome) -> CoherenceState {
        let drift_points = outcome
            .drift()
            .map(|d| d.drift_points.clone())
            .unwrap_or_default();
        self.drift_history.push(DriftRecord {
            timestamp: outcome.timestamp(),
            state: outcome.classification(),
            drift_points,
        });
        self.coherence_state = outcome.classification();
        self.coherence_state
    }

    pub fn coherence_state(&self) -> CoherenceState {
        self.coherence_state
    }

    pub fn drift_history(&self) -> &[DriftRecord] {
        &self.drift_history
    }

    pub fn gate_cycle(&self) -> &GateCycle {
        &self.gate_cycle
    }
}

/// Numeric node identifier from the spatial component, `None` when the
/// component is empty.
fn node_id(address: &Address) -> Result<Option<u64>, FlowError> {
    if address.spatial.is_empty() {
        return Ok(None);
    }
    let segment = address.node_segment();
    if segment.is_empty() {
        return Ok(None);
    }
    segment
        .parse::<u64>()
        .map(Some)
        .map_err(|_| FlowError::InvalidNodeId {
            segment: segment.to_string(),
        })
}

#[cfg(test)]
mod tests;
