//! Domain model shared by every flow component.
//!
//! - **Types** (`types.rs`): lifecycle and coherence enums, addresses, the gate cycle
//! - **Outcomes** (`outcome.rs`): tagged validation and coherence results
//! - **Errors** (`errors.rs`): internal errors, converted to outcomes at boundaries

pub mod errors;
pub mod outcome;
pub mod types;

pub use errors::FlowError;
pub use outcome::{
    CoherenceCode, CoherenceDrift, CoherenceOutcome, Details, DriftPoint, ErrorCode,
    ValidationFailure, ValidationOutcome,
};
pub use types::{
    Address, CoherenceState, FlowState, GateCycle, Severity, TimestampUtc, GATE_CYCLE_LEN,
};
