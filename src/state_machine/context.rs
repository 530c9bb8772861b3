//! The flow context: the single mutable aggregate owned by the state machine.

use crate::domain::{
    Address, CoherenceOutcome, CoherenceState, FlowError, FlowState, TimestampUtc,
    ValidationOutcome,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Starting values handed to [`super::FlowMachine::initialize`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct InitialContext {
    pub domain: String,
    #[serde(default)]
    pub credential_sequence: Vec<u64>,
    #[serde(default)]
    pub address: Option<Address>,
}

/// What produced a history entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HistoryEvent {
    Initialize,
    Validation { step_type: String },
    CoordinateUpdate,
    CoherenceCheck,
    /// Coherence result supplied from outside the detector.
    CoherenceUpdate,
}

impl HistoryEvent {
    pub fn label(&self) -> &str {
        match self {
            HistoryEvent::Initialize => "initialize",
            HistoryEvent::Validation { step_type } => step_type,
            HistoryEvent::CoordinateUpdate => "coordinate_update",
            HistoryEvent::CoherenceCheck => "coherence_check",
            HistoryEvent::CoherenceUpdate => "coherence_update",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "outcome", rename_all = "snake_case")]
pub enum HistoryResult {
    Validation(ValidationOutcome),
    Coherence(CoherenceOutcome),
}

/// One immutable entry of the flow history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp: TimestampUtc,
    pub event_type: HistoryEvent,
    pub result: HistoryResult,
    /// Flow state after the event was applied.
    pub state_at_time: FlowState,
}

/// Mutable state of one flow.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowContext {
    pub flow_id: Uuid,
    pub state: FlowState,
    pub current_domain: String,
    /// Accepted gates, append-only.
    pub active_gates: Vec<String>,
    pub credential_sequence: Vec<u64>,
    pub address: Address,
    /// Append-only event log.
    pub history: Vec<HistoryEntry>,
    /// Written only by coherence checks and coherence updates.
    pub coherence_state: CoherenceState,
    pub started_at: TimestampUtc,
}

impl FlowContext {
    pub fn new() -> Self {
        Self {
            flow_id: Uuid::new_v4(),
            state: FlowState::Initializing,
            current_domain: String::new(),
            active_gates: Vec::new(),
            credential_sequence: Vec::new(),
            address: Address::default(),
            history: Vec::new(),
            coherence_state: CoherenceState::Coherent,
            started_at: TimestampUtc::now(),
        }
    }

    /// Moves to `to` if the lifecycle allows it.
    ///
    /// QUARANTINED, ERROR and INITIALIZING (re-initialization) can be entered
    /// from anywhere; everything else follows the step path or the
    /// observer's pause/resume pair.
    pub fn transition(&mut self, to: FlowState) -> Result<(), FlowError> {
        use FlowState::*;

        let valid = matches!(
            (self.state, to),
            (_, Quarantined)
                | (_, Error)
                | (_, Initializing)
                | (Initializing, Active)
                | (Active | Paused | Quarantined, Validating)
                | (Validating, Active | Paused)
                | (Active, Paused)
                | (Paused, Active)
        );

        if valid {
            self.state = to;
            Ok(())
        } else {
            Err(FlowError::InvalidTransition {
                from: self.state,
                to,
            })
        }
    }

    pub fn last_entry(&self) -> Option<&HistoryEntry> {
        self.history.last()
    }

    /// The most recent `limit` history entries, oldest first.
    pub fn history_tail(&self, limit: usize) -> &[HistoryEntry] {
        let start = self.history.len().saturating_sub(limit);
        &self.history[start..]
    }
}

impl Default for FlowContext {
    fn default() -> Self {
        Self::new()
    }
}
