//! Internal error types for the flow domain.
//!
//! None of these cross a public operation boundary: the state machine, the
//! coherence detector and the observer convert them into outcomes.

use crate::domain::types::FlowState;
use std::fmt::{Display, Formatter};

/// Errors raised while processing a flow operation.
#[derive(Debug, Clone, PartialEq)]
pub enum FlowError {
    /// Lifecycle transition not permitted from the current state.
    InvalidTransition { from: FlowState, to: FlowState },
    /// Step or command parameters missing or of the wrong shape.
    MalformedParams { message: String },
    /// Gate token that is not part of the canonical cycle.
    UnknownGate { gate: String },
    /// Spatial node segment that is not an integer.
    InvalidNodeId { segment: String },
    /// The flow actor stopped or dropped its reply channel.
    ActorUnavailable { message: String },
}

impl FlowError {
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedParams {
            message: message.into(),
        }
    }
}

impl Display for FlowError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidTransition { from, to } => {
                write!(f, "invalid transition: {} -> {}", from, to)
            }
            Self::MalformedParams { message } => write!(f, "malformed parameters: {}", message),
            Self::UnknownGate { gate } => write!(f, "gate {} is not in the canonical cycle", gate),
            Self::InvalidNodeId { segment } => {
                write!(f, "node identifier '{}' is not an integer", segment)
            }
            Self::ActorUnavailable { message } => write!(f, "flow actor unavailable: {}", message),
        }
    }
}

impl std::error::Error for FlowError {}
