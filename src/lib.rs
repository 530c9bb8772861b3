//! Flow validation and coherence engine.
//!
//! A flow carries a credential sequence, a spatiotemporal address and the
//! gates it has passed through. [`state_machine::FlowMachine`] validates every
//! step against [`rules`], cross-checks the result with [`coherence`], and
//! [`observer`] lets an operator pause, advance, quarantine and inspect it.

pub mod coherence;
pub mod config;
pub mod domain;
pub mod observer;
pub mod rules;
pub mod state_machine;
pub mod structured_logger;
