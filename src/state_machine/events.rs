//! Events emitted by the state machine after it has applied an operation.
//!
//! These are for logging and audit only. Readers get state through
//! [`super::FlowStatus`] snapshots.

use crate::domain::{Address, CoherenceState, FlowState, ValidationOutcome};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum FlowEvent {
    /// Initial context set and validated
    Initialized { domain: String, passed: bool },
    /// Lifecycle state changed
    StateChanged { from: FlowState, to: FlowState },
    /// A step or coordinate update finished validating
    StepCompleted {
        step_type: String,
        outcome: ValidationOutcome,
    },
    /// A step was refused because of the flow's state
    StepRejected { step_type: String, state: FlowState },
    /// A gate was appended and the flow moved domain
    GateAccepted { gate: String, domain: String },
    /// The flow's address was replaced
    AddressReplaced { address: Address },
    /// A coherence classification was recorded
    CoherenceRecorded { state: CoherenceState },
}
