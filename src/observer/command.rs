//! Commands an observer can issue and the responses it gets back.

use crate::domain::TimestampUtc;
use crate::state_machine::{FlowStatus, HistoryEntry};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Action requested by an observer. Unrecognized names are kept so the
/// command can be refused by name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ObserverAction {
    Pause,
    Resume,
    Advance,
    Quarantine,
    Override,
    Inspect,
    Trace,
    Unknown(String),
}

impl ObserverAction {
    pub fn as_str(&self) -> &str {
        match self {
            ObserverAction::Pause => "pause",
            ObserverAction::Resume => "resume",
            ObserverAction::Advance => "advance",
            ObserverAction::Quarantine => "quarantine",
            ObserverAction::Override => "override",
            ObserverAction::Inspect => "inspect",
            ObserverAction::Trace => "trace",
            ObserverAction::Unknown(name) => name,
        }
    }
}

impl From<String> for ObserverAction {
    fn from(name: String) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "pause" => ObserverAction::Pause,
            "resume" => ObserverAction::Resume,
            "advance" => ObserverAction::Advance,
            "quarantine" => ObserverAction::Quarantine,
            "override" => ObserverAction::Override,
            "inspect" => ObserverAction::Inspect,
            "trace" => ObserverAction::Trace,
            _ => ObserverAction::Unknown(name),
        }
    }
}

impl From<&str> for ObserverAction {
    fn from(name: &str) -> Self {
        Self::from(name.to_string())
    }
}

impl From<ObserverAction> for String {
    fn from(action: ObserverAction) -> Self {
        action.as_str().to_string()
    }
}

fn new_trace_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObserverCommand {
    pub action: ObserverAction,
    #[serde(default)]
    pub parameters: Map<String, Value>,
    #[serde(default)]
    pub timestamp: TimestampUtc,
    /// Operator comment, recorded with overrides.
    #[serde(default)]
    pub comment: String,
    /// Correlates the command with its response. Generated when absent.
    #[serde(default = "new_trace_id")]
    pub trace_id: String,
}

impl ObserverCommand {
    pub fn new(action: impl Into<ObserverAction>) -> Self {
        Self {
            action: action.into(),
            parameters: Map::new(),
            timestamp: TimestampUtc::now(),
            comment: String::new(),
            trace_id: new_trace_id(),
        }
    }

    pub fn with_param(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.to_string(), value.into());
        self
    }

    pub fn with_comment(mut self, comment: &str) -> Self {
        self.comment = comment.to_string();
        self
    }

    pub fn with_trace_id(mut self, trace_id: &str) -> Self {
        self.trace_id = trace_id.to_string();
        self
    }
}

/// What a response carries besides its status line.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ObserverPayload {
    Status(Box<FlowStatus>),
    Trace { history: Vec<HistoryEntry> },
}

impl ObserverPayload {
    pub fn status(&self) -> Option<&FlowStatus> {
        match self {
            ObserverPayload::Status(status) => Some(status.as_ref()),
            ObserverPayload::Trace { .. } => None,
        }
    }

    pub fn history(&self) -> Option<&[HistoryEntry]> {
        match self {
            ObserverPayload::Status(_) => None,
            ObserverPayload::Trace { history } => Some(history),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObserverResponse {
    pub success: bool,
    pub message: String,
    pub state: ObserverPayload,
    pub timestamp: TimestampUtc,
    pub trace_id: String,
}

/// Value recorded by an OVERRIDE command.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverrideRecord {
    pub value: Value,
    pub comment: String,
    pub timestamp: TimestampUtc,
}

/// One executed command, kept in the observer's command history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandRecord {
    pub command: ObserverCommand,
    pub success: bool,
    pub message: String,
    pub executed_at: TimestampUtc,
}
