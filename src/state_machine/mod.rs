//! Centralized state machine for a single flow.
//!
//! This module is the ONLY place flow state transitions happen. The machine
//! owns the [`FlowContext`], sequences calls to the field rules and the
//! coherence detector, maps validation severity to lifecycle states, appends
//! history, and broadcasts a [`FlowStatus`] snapshot after every change.

mod context;
mod events;
mod snapshot;
mod steps;

pub use context::{FlowContext, HistoryEntry, HistoryEvent, HistoryResult, InitialContext};
pub use events::FlowEvent;
pub use snapshot::FlowStatus;
pub use steps::{address_from_params, Step, StepKind, StepParams};

use crate::coherence::{CoherenceDetector, CoherenceInput};
use crate::config::RuleConfig;
use crate::domain::{
    Address, CoherenceOutcome, CoherenceState, ErrorCode, FlowError, FlowState, Severity,
    TimestampUtc, ValidationOutcome,
};
use crate::rules::{FieldRules, RuleValidator};
use crate::structured_logger::StructuredLogger;
use std::sync::Arc;
use tokio::sync::watch;

/// State the flow settles in once a step has produced `outcome`.
///
/// Critical failures stop the flow, high failures quarantine it, passes make
/// it active. A normal-severity failure leaves the flow where it was.
pub fn state_after(outcome: &ValidationOutcome, prior: FlowState) -> FlowState {
    match outcome.failure() {
        None => FlowState::Active,
        Some(failure) => match failure.severity {
            Severity::Critical => FlowState::Error,
            Severity::High => FlowState::Quarantined,
            Severity::Normal => prior,
        },
    }
}

/// Owns one flow's context. All mutation goes through `&mut self`.
pub struct FlowMachine {
    context: FlowContext,
    rules: Box<dyn FieldRules>,
    detector: CoherenceDetector,
    snapshot_tx: watch::Sender<FlowStatus>,
    logger: Option<Arc<StructuredLogger>>,
    seq: u64,
}

impl FlowMachine {
    /// Creates a machine in INITIALIZING.
    ///
    /// Returns the machine and a watch receiver for status snapshots.
    pub fn new(
        rules: Box<dyn FieldRules>,
        detector: CoherenceDetector,
    ) -> (Self, watch::Receiver<FlowStatus>) {
        let context = FlowContext::new();
        let (snapshot_tx, snapshot_rx) = watch::channel(FlowStatus::from(&context));

        let machine = Self {
            context,
            rules,
            detector,
            snapshot_tx,
            logger: None,
            seq: 0,
        };

        (machine, snapshot_rx)
    }

    /// Builds the rule validator and detector from one configuration.
    pub fn from_config(
        config: &RuleConfig,
    ) -> anyhow::Result<(Self, watch::Receiver<FlowStatus>)> {
        let rules = RuleValidator::new(config)?;
        Ok(Self::new(
            Box::new(rules),
            CoherenceDetector::from_config(config),
        ))
    }

    /// Mirrors every flow event into a JSONL audit log.
    pub fn with_logger(mut self, logger: Arc<StructuredLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn subscribe(&self) -> watch::Receiver<FlowStatus> {
        self.snapshot_tx.subscribe()
    }

    /// Sets the initial domain, credentials and address and validates them.
    ///
    /// Credentials are checked when non-empty, then the address when present.
    /// The flow ends ACTIVE on success and ERROR on any failure. Calling this
    /// again re-initializes the flow; gates and history are kept.
    pub fn initialize(&mut self, initial: InitialContext) -> ValidationOutcome {
        self.move_or_fail(FlowState::Initializing);
        self.context.current_domain = initial.domain;
        self.context.credential_sequence = initial.credential_sequence;
        self.context.address = initial.address.unwrap_or_default();

        let outcome = self.validate_initial_state();
        let next = if outcome.is_ok() {
            FlowState::Active
        } else {
            FlowState::Error
        };
        self.move_or_fail(next);

        self.append_history(
            HistoryEvent::Initialize,
            HistoryResult::Validation(outcome.clone()),
        );
        self.emit(FlowEvent::Initialized {
            domain: self.context.current_domain.clone(),
            passed: outcome.is_ok(),
        });
        self.report("initialize", &outcome);
        self.broadcast();
        outcome
    }

    /// Processes a step given by name and parameter map.
    ///
    /// Unknown step types fail closed; malformed parameters are treated as
    /// an internal error.
    pub fn process_step(&mut self, step_type: &str, params: &StepParams) -> ValidationOutcome {
        let event = HistoryEvent::Validation {
            step_type: step_type.to_string(),
        };
        self.guarded(event, |machine| {
            let Some(kind) = StepKind::parse(step_type) else {
                return Ok(ValidationOutcome::failed(
                    ErrorCode::UnknownStepType,
                    format!("Unknown validation step type: {}", step_type),
                ));
            };
            let step = Step::from_params(kind, params)?;
            machine.execute_step(step)
        })
    }

    /// Processes a typed step.
    pub fn apply_step(&mut self, step: Step) -> ValidationOutcome {
        let event = HistoryEvent::Validation {
            step_type: step.kind().as_str().to_string(),
        };
        self.guarded(event, move |machine| machine.execute_step(step))
    }

    /// Validates and, on success, replaces the flow's address.
    pub fn update_coordinates(&mut self, address: Address) -> ValidationOutcome {
        self.guarded(HistoryEvent::CoordinateUpdate, move |machine| {
            let outcome = machine.rules.validate_address(
                &address.spatial,
                &address.domain_alignment,
                &address.temporal,
            );
            if outcome.is_ok() {
                machine.context.address = address.clone();
                machine.emit(FlowEvent::AddressReplaced { address });
            }
            Ok(outcome)
        })
    }

    /// Cross-checks the current context, using the last accepted gate (empty
    /// when none) and the current domain as the transition to verify.
    ///
    /// Records the classification; never changes the lifecycle state.
    pub fn check_coherence(&mut self) -> CoherenceOutcome {
        let gate = self.context.active_gates.last().cloned().unwrap_or_default();
        let target = self.context.current_domain.clone();
        self.run_coherence(&gate, &target)
    }

    /// Full coherence pass over a proposed transition that has not been
    /// applied yet.
    pub fn check_transition_coherence(&mut self, gate: &str, target_domain: &str) -> CoherenceOutcome {
        self.run_coherence(gate, target_domain)
    }

    /// Records a coherence result produced outside the detector. This is the
    /// only path by which `quarantined` reaches the coherence state.
    pub fn record_coherence(&mut self, outcome: CoherenceOutcome) -> CoherenceState {
        self.store_coherence(HistoryEvent::CoherenceUpdate, outcome)
    }

    /// ACTIVE -> PAUSED.
    pub fn pause(&mut self) -> Result<(), FlowError> {
        self.require_state(FlowState::Active, FlowState::Paused)?;
        self.move_to(FlowState::Paused)?;
        self.broadcast();
        Ok(())
    }

    /// PAUSED -> ACTIVE.
    pub fn resume(&mut self) -> Result<(), FlowError> {
        self.require_state(FlowState::Paused, FlowState::Active)?;
        self.move_to(FlowState::Active)?;
        self.broadcast();
        Ok(())
    }

    /// Forces QUARANTINED from any state. Returns the state it replaced.
    pub fn force_quarantine(&mut self) -> FlowState {
        let prior = self.context.state;
        self.move_or_fail(FlowState::Quarantined);
        self.broadcast();
        prior
    }

    pub fn status(&self) -> FlowStatus {
        FlowStatus::from(&self.context)
    }

    pub fn state(&self) -> FlowState {
        self.context.state
    }

    pub fn context(&self) -> &FlowContext {
        &self.context
    }

    pub fn detector(&self) -> &CoherenceDetector {
        &self.detector
    }

    fn require_state(&self, required: FlowState, to: FlowState) -> Result<(), FlowError> {
        if self.context.state == required {
            Ok(())
        } else {
            Err(FlowError::InvalidTransition {
                from: self.context.state,
                to,
            })
        }
    }

    fn validate_initial_state(&self) -> ValidationOutcome {
        let context = &self.context;
        if !context.credential_sequence.is_empty() {
            let outcome = self
                .rules
                .validate_credential_sequence(&context.credential_sequence);
            if !outcome.is_ok() {
                return outcome;
            }
        }

        if !context.address.is_empty() {
            let address = &context.address;
            let outcome = self.rules.validate_address(
                &address.spatial,
                &address.domain_alignment,
                &address.temporal,
            );
            if !outcome.is_ok() {
                return outcome;
            }
        }

        ValidationOutcome::passed()
    }

    /// Runs `run` between a transient VALIDATING state and the severity
    /// mapping, after checking the flow accepts steps at all.
    fn guarded<F>(&mut self, event: HistoryEvent, run: F) -> ValidationOutcome
    where
        F: FnOnce(&mut Self) -> Result<ValidationOutcome, FlowError>,
    {
        let prior = self.context.state;
        let step_type = event.label().to_string();

        if !prior.accepts_steps() {
            let outcome = ValidationOutcome::failed(
                ErrorCode::InvalidFlowState,
                format!("Cannot process {} while flow is {}", step_type, prior),
            )
            .with_detail("state", prior.as_str());
            self.emit(FlowEvent::StepRejected {
                step_type,
                state: prior,
            });
            self.report("step_rejected", &outcome);
            return outcome;
        }

        let outcome = self
            .move_to(FlowState::Validating)
            .and_then(|()| run(self))
            .unwrap_or_else(|e| {
                tracing::error!(flow_id = %self.context.flow_id, error = %e, "step failed internally");
                ValidationOutcome::internal(e)
            });

        self.move_or_fail(state_after(&outcome, prior));
        self.append_history(event, HistoryResult::Validation(outcome.clone()));
        self.emit(FlowEvent::StepCompleted {
            step_type: step_type.clone(),
            outcome: outcome.clone(),
        });
        self.report(&step_type, &outcome);
        self.broadcast();
        outcome
    }

    fn execute_step(&mut self, step: Step) -> Result<ValidationOutcome, FlowError> {
        let context = &self.context;
        match step {
            Step::CredentialSequence { sequence } => {
                let sequence = sequence.unwrap_or_else(|| context.credential_sequence.clone());
                Ok(self.rules.validate_credential_sequence(&sequence))
            }
            Step::Address { address } => {
                let address = address.unwrap_or_else(|| context.address.clone());
                Ok(self.rules.validate_address(
                    &address.spatial,
                    &address.domain_alignment,
                    &address.temporal,
                ))
            }
            Step::GateTransition {
                gate,
                from_domain,
                to_domain,
            } => {
                let from_domain = from_domain.unwrap_or_else(|| context.current_domain.clone());
                let outcome = self.rules.validate_gate_transition(
                    &gate,
                    &from_domain,
                    &to_domain,
                    &context.active_gates,
                );
                if outcome.is_ok() {
                    self.context.active_gates.push(gate.clone());
                    self.context.current_domain = to_domain.clone();
                    self.emit(FlowEvent::GateAccepted {
                        gate,
                        domain: to_domain,
                    });
                }
                Ok(outcome)
            }
        }
    }

    fn run_coherence(&mut self, gate: &str, target_domain: &str) -> CoherenceOutcome {
        let input = CoherenceInput {
            credential_sequence: &self.context.credential_sequence,
            address: &self.context.address,
            active_gates: &self.context.active_gates,
        };
        let outcome = self.detector.check_full(input, gate, target_domain);
        self.store_coherence(HistoryEvent::CoherenceCheck, outcome.clone());
        outcome
    }

    fn store_coherence(&mut self, event: HistoryEvent, outcome: CoherenceOutcome) -> CoherenceState {
        let state = self.detector.record(&outcome);
        self.context.coherence_state = state;

        match outcome.drift() {
            None => tracing::info!(flow_id = %self.context.flow_id, "flow coherent"),
            Some(drift) => tracing::warn!(
                flow_id = %self.context.flow_id,
                coherence = %drift.classification,
                code = ?drift.code,
                "{}",
                drift.message
            ),
        }

        self.append_history(event, HistoryResult::Coherence(outcome));
        self.emit(FlowEvent::CoherenceRecorded { state });
        self.broadcast();
        state
    }

    fn move_to(&mut self, to: FlowState) -> Result<(), FlowError> {
        let from = self.context.state;
        self.context.transition(to)?;
        if from != to {
            self.emit(FlowEvent::StateChanged { from, to });
        }
        Ok(())
    }

    /// Like [`Self::move_to`], but an illegal transition parks the flow in ERROR.
    fn move_or_fail(&mut self, to: FlowState) {
        if let Err(e) = self.move_to(to) {
            tracing::error!(flow_id = %self.context.flow_id, error = %e, "illegal transition");
            let from = self.context.state;
            self.context.state = FlowState::Error;
            self.emit(FlowEvent::StateChanged {
                from,
                to: FlowState::Error,
            });
        }
    }

    fn append_history(&mut self, event_type: HistoryEvent, result: HistoryResult) {
        self.context.history.push(HistoryEntry {
            timestamp: TimestampUtc::now(),
            event_type,
            result,
            state_at_time: self.context.state,
        });
    }

    fn emit(&mut self, event: FlowEvent) {
        self.seq += 1;
        tracing::debug!(flow_id = %self.context.flow_id, seq = self.seq, ?event, "flow event");
        if let Some(logger) = &self.logger {
            logger.log_flow_event(self.seq, &event);
        }
    }

    /// Logs a returned outcome; alerts go out at warn level.
    fn report(&self, operation: &str, outcome: &ValidationOutcome) {
        let flow_id = &self.context.flow_id;
        let state = self.context.state;
        match outcome.failure() {
            None => tracing::info!(%flow_id, operation, %state, "validation passed"),
            Some(failure) if failure.severity.is_alert() => tracing::warn!(
                %flow_id,
                operation,
                %state,
                code = %failure.code,
                severity = %failure.severity,
                "{}",
                failure.message
            ),
            Some(failure) => tracing::info!(
                %flow_id,
                operation,
                %state,
                code = %failure.code,
                "{}",
                failure.message
            ),
        }
    }

    fn broadcast(&self) {
        self.snapshot_tx.send_replace(FlowStatus::from(&self.context));
    }
}
