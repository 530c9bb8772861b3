use super::*;
use crate::config::RuleConfig;
use crate::domain::{Address, CoherenceState, ErrorCode};
use crate::state_machine::{HistoryResult, InitialContext};
use serde_json::json;
use tempfile::TempDir;

fn create_test_observer() -> ObserverInterface {
    let (mut machine, _rx) =
        FlowMachine::from_config(&RuleConfig::default_config()).expect("default rules compile");
    let outcome = machine.initialize(InitialContext {
        domain: "OBI-WAN".to_string(),
        credential_sequence: vec![2, 3, 5, 7, 11],
        address: Some(Address::new(
            "FIELD/node-1/011",
            "OBI-WAN/core",
            "20240101120000Z",
        )),
    });
    assert!(outcome.is_ok());
    ObserverInterface::new(machine)
}

fn advance(step_type: &str, params: Value) -> ObserverCommand {
    ObserverCommand::new(ObserverAction::Advance)
        .with_param("step_type", step_type)
        .with_param("params", params)
}

fn state_of(response: &ObserverResponse) -> FlowState {
    response
        .state
        .status()
        .map(|status| status.state)
        .expect("status payload")
}

#[test]
fn test_pause_and_resume() {
    let mut observer = create_test_observer();

    let response = observer.execute(ObserverCommand::new(ObserverAction::Pause));
    assert!(response.success);
    assert_eq!(state_of(&response), FlowState::Paused);

    let response = observer.execute(ObserverCommand::new(ObserverAction::Resume));
    assert!(response.success);
    assert_eq!(state_of(&response), FlowState::Active);
}

#[test]
fn test_pause_refused_outside_active() {
    let mut observer = create_test_observer();
    observer.execute(ObserverCommand::new(ObserverAction::Quarantine));

    let response = observer.execute(ObserverCommand::new(ObserverAction::Pause));
    assert!(!response.success);
    assert!(response.message.contains("quarantined"));
    assert_eq!(state_of(&response), FlowState::Quarantined);

    let response = observer.execute(ObserverCommand::new(ObserverAction::Resume));
    assert!(!response.success);
    assert_eq!(observer.machine().state(), FlowState::Quarantined);
}

#[test]
fn test_quarantine_from_any_state() {
    let mut observer = create_test_observer();
    observer.execute(ObserverCommand::new(ObserverAction::Pause));

    let response = observer.execute(ObserverCommand::new(ObserverAction::Quarantine));
    assert!(response.success);
    assert_eq!(state_of(&response), FlowState::Quarantined);

    let response = observer.execute(ObserverCommand::new(ObserverAction::Quarantine));
    assert!(response.success);
    assert_eq!(response.message, "Flow already quarantined");
}

#[test]
fn test_advance_processes_step() {
    let mut observer = create_test_observer();
    let response = observer.execute(advance(
        "gate_transition",
        json!({"gate": "🜂", "to_domain": "BERJAK"}),
    ));

    assert!(response.success);
    let status = response.state.status().expect("status payload");
    assert_eq!(status.active_gates, vec!["🜂"]);
    assert_eq!(status.current_domain, "BERJAK");
}

#[test]
fn test_advance_reports_step_failure() {
    let mut observer = create_test_observer();
    let response = observer.execute(advance(
        "gate_transition",
        json!({"gate": "🜃", "to_domain": "BERJAK"}),
    ));

    assert!(!response.success);
    assert!(response.message.contains("GATE_SEQUENCE_VIOLATION"));
    assert_eq!(state_of(&response), FlowState::Error);
}

#[test]
fn test_advance_while_paused_runs_step() {
    let mut observer = create_test_observer();
    observer.execute(ObserverCommand::new(ObserverAction::Pause));

    let response = observer.execute(advance("credential_sequence", json!({})));
    assert!(response.success);
    assert_eq!(state_of(&response), FlowState::Active);
}

#[test]
fn test_advance_without_step_type_fails_closed() {
    let mut observer = create_test_observer();
    let response = observer.execute(ObserverCommand::new(ObserverAction::Advance));

    assert!(!response.success);
    assert!(response.message.contains("UNKNOWN_STEP_TYPE"));
    assert_eq!(observer.machine().state(), FlowState::Error);
}

#[test]
fn test_advance_with_non_object_params_is_refused() {
    let mut observer = create_test_observer();
    let history_len = observer.machine().context().history.len();

    let response = observer.execute(advance("credential_sequence", json!([2, 3])));

    assert!(!response.success);
    assert!(response.message.starts_with("Command execution error"));
    assert_eq!(observer.machine().state(), FlowState::Active);
    assert_eq!(observer.machine().context().history.len(), history_len);
}

#[test]
fn test_override_is_recorded() {
    let mut observer = create_test_observer();
    let response = observer.execute(
        ObserverCommand::new(ObserverAction::Override)
            .with_param("type", "gate_sequence")
            .with_param("value", json!({"allow": "🜃"}))
            .with_comment("field team sign-off"),
    );

    assert!(response.success);
    let record = &observer.active_overrides()["gate_sequence"];
    assert_eq!(record.value, json!({"allow": "🜃"}));
    assert_eq!(record.comment, "field team sign-off");
    assert_eq!(observer.machine().state(), FlowState::Active);
}

#[test]
fn test_override_without_type_uses_empty_key() {
    let mut observer = create_test_observer();
    observer.execute(ObserverCommand::new(ObserverAction::Override));

    let record = &observer.active_overrides()[""];
    assert_eq!(record.value, Value::Null);
}

#[test]
fn test_inspect_returns_status() {
    let mut observer = create_test_observer();
    let response = observer.execute(ObserverCommand::new(ObserverAction::Inspect));

    assert!(response.success);
    let status = response.state.status().expect("status payload");
    assert_eq!(status.state, FlowState::Active);
    assert_eq!(status.coherence_state, CoherenceState::Coherent);
    assert_eq!(status.flow_id, observer.machine().context().flow_id);
}

#[test]
fn test_trace_defaults_to_last_ten_entries() {
    let mut observer = create_test_observer();
    for _ in 0..12 {
        observer.execute(advance("credential_sequence", json!({})));
    }

    let response = observer.execute(ObserverCommand::new(ObserverAction::Trace));
    let history = response.state.history().expect("trace payload");
    assert_eq!(history.len(), DEFAULT_TRACE_LIMIT);
    assert_eq!(
        history.last(),
        observer.machine().context().history.last()
    );
}

#[test]
fn test_trace_honours_limit() {
    let mut observer = create_test_observer();
    observer.execute(advance("address", json!({})));

    let response = observer.execute(ObserverCommand::new(ObserverAction::Trace).with_param("limit", 1));
    let history = response.state.history().expect("trace payload");
    assert_eq!(history.len(), 1);
    assert!(matches!(history[0].result, HistoryResult::Validation(_)));

    let response = observer.execute(ObserverCommand::new(ObserverAction::Trace).with_param("limit", 0));
    assert!(response.state.history().expect("trace payload").is_empty());

    let response =
        observer.execute(ObserverCommand::new(ObserverAction::Trace).with_param("limit", 50));
    assert_eq!(response.state.history().expect("trace payload").len(), 2);
}

#[test]
fn test_unknown_action_is_refused_without_change() {
    let mut observer = create_test_observer();
    let command: ObserverCommand =
        serde_json::from_value(json!({"action": "teleport"})).expect("command parses");

    let response = observer.execute(command);

    assert!(!response.success);
    assert_eq!(response.message, "Unknown observer action: teleport");
    assert_eq!(state_of(&response), FlowState::Active);
}

#[test]
fn test_every_command_is_recorded() {
    let mut observer = create_test_observer();
    observer.execute(ObserverCommand::new(ObserverAction::Pause));
    observer.execute(ObserverCommand::new(ObserverAction::Pause));
    observer.execute(ObserverCommand::new("bogus"));

    let history = observer.command_history();
    assert_eq!(history.len(), 3);
    assert!(history[0].success);
    assert!(!history[1].success);
    assert_eq!(history[2].command.action, ObserverAction::Unknown("bogus".into()));
}

#[test]
fn test_response_echoes_trace_id() {
    let mut observer = create_test_observer();
    let response =
        observer.execute(ObserverCommand::new(ObserverAction::Inspect).with_trace_id("abc-123"));
    assert_eq!(response.trace_id, "abc-123");
}

#[test]
fn test_command_deserializes_with_defaults() {
    let command: ObserverCommand =
        serde_json::from_value(json!({"action": "PAUSE"})).expect("command parses");
    assert_eq!(command.action, ObserverAction::Pause);
    assert!(command.parameters.is_empty());
    assert!(command.comment.is_empty());
    assert!(!command.trace_id.is_empty());
}

#[test]
fn test_commands_are_audited() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let logger = Arc::new(StructuredLogger::new("observer-test", temp_dir.path()).expect("logger"));
    let mut observer = create_test_observer().with_logger(logger);

    observer.execute(ObserverCommand::new(ObserverAction::Pause).with_trace_id("t-1"));

    let content = std::fs::read_to_string(temp_dir.path().join("events.jsonl"))
        .expect("Failed to read log file");
    let entry: serde_json::Value =
        serde_json::from_str(content.lines().last().expect("one line")).expect("valid json");
    assert_eq!(entry["component"], "Observer");
    assert_eq!(entry["event"]["action"], "pause");
    assert_eq!(entry["event"]["trace_id"], "t-1");
}

#[test]
fn test_trace_payload_serializes_history() {
    let mut observer = create_test_observer();
    let response = observer.execute(ObserverCommand::new(ObserverAction::Trace));
    let json = serde_json::to_value(&response).expect("serializes");

    let entries = json["state"]["history"].as_array().expect("history array");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["event_type"]["type"], "initialize");
    assert_eq!(entries[0]["result"]["outcome"]["status"], "passed");
}

#[test]
fn test_failed_step_code_reaches_history() {
    let mut observer = create_test_observer();
    observer.execute(advance("teleport", json!({})));

    let last = observer.machine().context().last_entry().expect("history");
    match &last.result {
        HistoryResult::Validation(outcome) => {
            assert_eq!(outcome.code(), Some(ErrorCode::UnknownStepType))
        }
        other => panic!("expected validation result, got {:?}", other),
    }
}
