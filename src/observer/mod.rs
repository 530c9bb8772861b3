//! Operator control surface over a single flow.
//!
//! The [`ObserverInterface`] owns the [`FlowMachine`] and turns observer
//! commands into machine calls. Every command, refused or not, lands in the
//! command history and the audit log.

mod actor;
mod command;

pub use actor::{FlowActor, FlowHandle, FlowMessage};
pub use command::{
    CommandRecord, ObserverAction, ObserverCommand, ObserverPayload, ObserverResponse,
    OverrideRecord,
};

use crate::domain::{FlowError, FlowState, TimestampUtc};
use crate::state_machine::{FlowMachine, StepParams};
use crate::structured_logger::StructuredLogger;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

/// History entries returned by TRACE when no limit is given.
pub const DEFAULT_TRACE_LIMIT: usize = 10;

/// Result of one handler before it is stamped into a response.
struct Handled {
    success: bool,
    message: String,
    payload: Option<ObserverPayload>,
}

impl Handled {
    fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            payload: None,
        }
    }

    fn refused(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            payload: None,
        }
    }
}

pub struct ObserverInterface {
    machine: FlowMachine,
    command_history: Vec<CommandRecord>,
    active_overrides: BTreeMap<String, OverrideRecord>,
    logger: Option<Arc<StructuredLogger>>,
}

impl ObserverInterface {
    pub fn new(machine: FlowMachine) -> Self {
        Self {
            machine,
            command_history: Vec::new(),
            active_overrides: BTreeMap::new(),
            logger: None,
        }
    }

    pub fn with_logger(mut self, logger: Arc<StructuredLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Executes one command and returns its response.
    ///
    /// Handler errors become a failed response carrying the current status;
    /// they never propagate.
    pub fn execute(&mut self, command: ObserverCommand) -> ObserverResponse {
        let result = match &command.action {
            ObserverAction::Pause => self.handle_pause(),
            ObserverAction::Resume => self.handle_resume(),
            ObserverAction::Advance => self.handle_advance(&command.parameters),
            ObserverAction::Quarantine => Ok(self.handle_quarantine()),
            ObserverAction::Override => Ok(self.handle_override(&command)),
            ObserverAction::Inspect => Ok(Handled::ok("Flow status retrieved")),
            ObserverAction::Trace => Ok(self.handle_trace(&command.parameters)),
            ObserverAction::Unknown(name) => Ok(Handled::refused(format!(
                "Unknown observer action: {}",
                name
            ))),
        };

        let handled = result.unwrap_or_else(|e| {
            tracing::error!(action = command.action.as_str(), error = %e, "observer command failed");
            Handled::refused(format!("Command execution error: {}", e))
        });

        let response = ObserverResponse {
            success: handled.success,
            message: handled.message,
            state: handled
                .payload
                .unwrap_or_else(|| ObserverPayload::Status(Box::new(self.machine.status()))),
            timestamp: TimestampUtc::now(),
            trace_id: command.trace_id.clone(),
        };

        self.record(command, &response);
        response
    }

    fn handle_pause(&mut self) -> Result<Handled, FlowError> {
        match self.machine.pause() {
            Ok(()) => Ok(Handled::ok("Flow paused")),
            Err(FlowError::InvalidTransition { from, .. }) => Ok(Handled::refused(format!(
                "Cannot pause flow while it is {}",
                from
            ))),
            Err(e) => Err(e),
        }
    }

    fn handle_resume(&mut self) -> Result<Handled, FlowError> {
        match self.machine.resume() {
            Ok(()) => Ok(Handled::ok("Flow resumed")),
            Err(FlowError::InvalidTransition { from, .. }) => Ok(Handled::refused(format!(
                "Cannot resume flow while it is {}",
                from
            ))),
            Err(e) => Err(e),
        }
    }

    /// Runs `parameters.step_type` with `parameters.params` through the
    /// machine.
    fn handle_advance(&mut self, parameters: &Map<String, Value>) -> Result<Handled, FlowError> {
        let step_type = parameters
            .get("step_type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let params: StepParams = match parameters.get("params") {
            None | Some(Value::Null) => StepParams::new(),
            Some(Value::Object(map)) => map.clone(),
            Some(_) => return Err(FlowError::malformed("'params' must be an object")),
        };

        let outcome = self.machine.process_step(&step_type, &params);
        Ok(match outcome.failure() {
            None => Handled::ok("Flow step processed successfully"),
            Some(failure) => Handled::refused(format!(
                "Flow step failed: {}: {}",
                failure.code, failure.message
            )),
        })
    }

    fn handle_quarantine(&mut self) -> Handled {
        let prior = self.machine.force_quarantine();
        if prior == FlowState::Quarantined {
            Handled::ok("Flow already quarantined")
        } else {
            Handled::ok("Flow quarantined by observer")
        }
    }

    /// Records an override keyed by `parameters.type`. The table is kept for
    /// operators and the audit log; validation does not consult it.
    fn handle_override(&mut self, command: &ObserverCommand) -> Handled {
        let key = match command.parameters.get("type") {
            Some(Value::String(name)) => name.clone(),
            Some(other) => other.to_string(),
            None => String::new(),
        };
        let value = command
            .parameters
            .get("value")
            .cloned()
            .unwrap_or(Value::Null);

        let message = format!("Override applied for {}", key);
        self.active_overrides.insert(
            key,
            OverrideRecord {
                value,
                comment: command.comment.clone(),
                timestamp: TimestampUtc::now(),
            },
        );
        Handled::ok(message)
    }

    fn handle_trace(&self, parameters: &Map<String, Value>) -> Handled {
        let limit = parameters
            .get("limit")
            .and_then(Value::as_u64)
            .and_then(|n| usize::try_from(n).ok())
            .unwrap_or(DEFAULT_TRACE_LIMIT);
        let history = self.machine.context().history_tail(limit).to_vec();

        Handled {
            success: true,
            message: format!("Retrieved {} history entries", history.len()),
            payload: Some(ObserverPayload::Trace { history }),
        }
    }

    fn record(&mut self, command: ObserverCommand, response: &ObserverResponse) {
        if response.success {
            tracing::info!(
                action = command.action.as_str(),
                trace_id = %command.trace_id,
                "{}",
                response.message
            );
        } else {
            tracing::warn!(
                action = command.action.as_str(),
                trace_id = %command.trace_id,
                "{}",
                response.message
            );
        }

        if let Some(logger) = &self.logger {
            logger.log_observer_command(&command, response);
        }

        self.command_history.push(CommandRecord {
            command,
            success: response.success,
            message: response.message.clone(),
            executed_at: response.timestamp,
        });
    }

    pub fn machine(&self) -> &FlowMachine {
        &self.machine
    }

    pub fn machine_mut(&mut self) -> &mut FlowMachine {
        &mut self.machine
    }

    pub fn command_history(&self) -> &[CommandRecord] {
        &self.command_history
    }

    pub fn active_overrides(&self) -> &BTreeMap<String, OverrideRecord> {
        &self.active_overrides
    }
}

#[cfg(test)]
#[path = "tests/observer_tests.rs"]
mod tests;
