//! Read-only status snapshot of a flow.
//!
//! Observers never mutate this; they receive a fresh copy after every change.

use super::context::{FlowContext, HistoryEntry};
use crate::domain::{Address, CoherenceState, FlowState, TimestampUtc};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowStatus {
    pub flow_id: Uuid,
    pub state: FlowState,
    pub coherence_state: CoherenceState,
    pub current_domain: String,
    pub active_gates: Vec<String>,
    pub address: Address,
    /// Most recent history entry, if any.
    pub last_validation: Option<HistoryEntry>,
    /// When the snapshot was taken.
    pub timestamp: TimestampUtc,
}

impl From<&FlowContext> for FlowStatus {
    fn from(context: &FlowContext) -> Self {
        Self {
            flow_id: context.flow_id,
            state: context.state,
            coherence_state: context.coherence_state,
            current_domain: context.current_domain.clone(),
            active_gates: context.active_gates.clone(),
            address: context.address.clone(),
            last_validation: context.last_entry().cloned(),
            timestamp: TimestampUtc::now(),
        }
    }
}
