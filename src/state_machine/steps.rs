//! Validation steps a flow can be asked to process.
//!
//! Steps arrive either typed ([`Step`]) or as a step-type name plus a
//! free-form parameter map, as the observer's ADVANCE command sends them.

use crate::domain::{Address, FlowError};
use serde_json::{Map, Value};

/// Free-form step parameters.
pub type StepParams = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepKind {
    CredentialSequence,
    Address,
    GateTransition,
}

impl StepKind {
    /// `None` for any name outside the known step types.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "credential_sequence" => Some(StepKind::CredentialSequence),
            "address" => Some(StepKind::Address),
            "gate_transition" => Some(StepKind::GateTransition),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::CredentialSequence => "credential_sequence",
            StepKind::Address => "address",
            StepKind::GateTransition => "gate_transition",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Validate `sequence`, or the flow's own credentials when `None`.
    CredentialSequence { sequence: Option<Vec<u64>> },
    /// Validate `address`, or the flow's own address when `None`.
    Address { address: Option<Address> },
    /// Move through `gate` into `to_domain`. `from_domain` defaults to the
    /// flow's current domain.
    GateTransition {
        gate: String,
        from_domain: Option<String>,
        to_domain: String,
    },
}

impl Step {
    pub fn kind(&self) -> StepKind {
        match self {
            Step::CredentialSequence { .. } => StepKind::CredentialSequence,
            Step::Address { .. } => StepKind::Address,
            Step::GateTransition { .. } => StepKind::GateTransition,
        }
    }

    pub fn gate_transition(gate: &str, to_domain: &str) -> Self {
        Step::GateTransition {
            gate: gate.to_string(),
            from_domain: None,
            to_domain: to_domain.to_string(),
        }
    }

    /// Builds a typed step from its parameter map.
    pub fn from_params(kind: StepKind, params: &StepParams) -> Result<Self, FlowError> {
        match kind {
            StepKind::CredentialSequence => {
                let sequence = match params.get("sequence") {
                    None | Some(Value::Null) => None,
                    Some(value) => Some(
                        serde_json::from_value::<Vec<u64>>(value.clone()).map_err(|e| {
                            FlowError::malformed(format!("sequence: {}", e))
                        })?,
                    ),
                };
                Ok(Step::CredentialSequence { sequence })
            }
            StepKind::Address => {
                let address = if params.is_empty() {
                    None
                } else {
                    Some(address_from_params(params)?)
                };
                Ok(Step::Address { address })
            }
            StepKind::GateTransition => Ok(Step::GateTransition {
                gate: required_str(params, "gate")?,
                from_domain: optional_str(params, "from_domain")?,
                to_domain: required_str(params, "to_domain")?,
            }),
        }
    }
}

/// Address from `spatial`, `domain_alignment` and an optional `temporal`
/// (defaults to the current moment).
pub fn address_from_params(params: &StepParams) -> Result<Address, FlowError> {
    let temporal = optional_str(params, "temporal")?.unwrap_or_else(Address::temporal_marker_now);
    Ok(Address::new(
        required_str(params, "spatial")?,
        required_str(params, "domain_alignment")?,
        temporal,
    ))
}

fn required_str(params: &StepParams, key: &str) -> Result<String, FlowError> {
    optional_str(params, key)?
        .ok_or_else(|| FlowError::malformed(format!("missing parameter '{}'", key)))
}

fn optional_str(params: &StepParams, key: &str) -> Result<Option<String>, FlowError> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(FlowError::malformed(format!(
            "parameter '{}' must be a string, got {}",
            key, other
        ))),
    }
}
