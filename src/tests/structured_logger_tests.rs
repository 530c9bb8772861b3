use super::*;
use crate::domain::{CoherenceState, FlowState};
use crate::observer::{ObserverAction, ObserverPayload};
use crate::state_machine::{FlowContext, FlowStatus};
use tempfile::TempDir;

fn create_test_logger() -> (StructuredLogger, TempDir) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let logger =
        StructuredLogger::new("test-flow", temp_dir.path()).expect("Failed to create logger");
    (logger, temp_dir)
}

fn read_entries(temp_dir: &TempDir) -> Vec<LogEntry> {
    let content = std::fs::read_to_string(temp_dir.path().join("events.jsonl"))
        .expect("Failed to read log file");
    content
        .lines()
        .map(|line| serde_json::from_str(line).expect("Failed to parse log entry"))
        .collect()
}

#[test]
fn test_log_entries_are_valid_json() {
    let (logger, temp_dir) = create_test_logger();

    logger.log("TestComponent", serde_json::json!({"key": "value1"}));
    logger.log("TestComponent", serde_json::json!({"key": "value2"}));

    let entries = read_entries(&temp_dir);
    assert_eq!(entries.len(), 2);
    for entry in &entries {
        assert_eq!(entry.session_id, "test-flow");
        assert_eq!(entry.component, "TestComponent");
    }
    assert_eq!(entries[1].event["key"], "value2");
}

#[test]
fn test_sequence_numbers_monotonic() {
    let (logger, temp_dir) = create_test_logger();

    for i in 0..10 {
        logger.log("Test", serde_json::json!({"iteration": i}));
    }

    let mut prev_seq = 0u64;
    for entry in read_entries(&temp_dir) {
        assert!(
            entry.seq > prev_seq,
            "Sequence numbers should be monotonically increasing"
        );
        prev_seq = entry.seq;
    }
    assert_eq!(prev_seq, 10);
}

#[test]
fn test_concurrent_logging() {
    use std::sync::Arc;
    use std::thread;

    let (logger, temp_dir) = create_test_logger();
    let logger = Arc::new(logger);

    let handles: Vec<_> = (0..5)
        .map(|t| {
            let logger = Arc::clone(&logger);
            thread::spawn(move || {
                for i in 0..20 {
                    logger.log("Thread", serde_json::json!({"thread": t, "iteration": i}));
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Thread panicked");
    }

    assert_eq!(read_entries(&temp_dir).len(), 100);
}

#[test]
fn test_timestamp_format() {
    let (logger, temp_dir) = create_test_logger();

    logger.log("Test", serde_json::json!({"msg": "test"}));

    let entries = read_entries(&temp_dir);
    let ts = &entries[0].ts;

    // YYYY-MM-DDTHH:MM:SS.ffffffZ
    assert!(ts.contains('T'));
    assert!(ts.ends_with('Z'));
    let micros_part = ts.split('.').nth(1).expect("fractional seconds");
    assert_eq!(micros_part.len(), 7);
}

#[test]
fn test_appends_to_existing_log() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    {
        let logger = StructuredLogger::new("first", temp_dir.path()).expect("logger");
        logger.log("Test", serde_json::json!({"n": 1}));
    }
    let logger = StructuredLogger::new("second", temp_dir.path()).expect("logger");
    logger.log("Test", serde_json::json!({"n": 2}));

    let entries = read_entries(&temp_dir);
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].session_id, "first");
    assert_eq!(entries[1].session_id, "second");
    assert_eq!(logger.path(), &temp_dir.path().join("events.jsonl"));
}

#[test]
fn test_flow_event_logging() {
    let (logger, temp_dir) = create_test_logger();

    logger.log_flow_event(
        7,
        &FlowEvent::StateChanged {
            from: FlowState::Active,
            to: FlowState::Quarantined,
        },
    );
    logger.log_flow_event(
        8,
        &FlowEvent::CoherenceRecorded {
            state: CoherenceState::PartialDrift,
        },
    );

    let entries = read_entries(&temp_dir);
    assert_eq!(entries.len(), 2);

    assert_eq!(entries[0].component, "Flow");
    assert_eq!(entries[0].event["type"], "FlowEvent");
    assert_eq!(entries[0].event["machine_seq"], 7);
    assert_eq!(entries[0].event["event"]["type"], "StateChanged");
    assert_eq!(entries[0].event["event"]["to"], "quarantined");

    assert_eq!(entries[1].event["event"]["state"], "partial_drift");
}

#[test]
fn test_observer_command_logging() {
    let (logger, temp_dir) = create_test_logger();

    let command = ObserverCommand::new(ObserverAction::Override)
        .with_comment("manual clearance")
        .with_trace_id("trace-1");
    let response = ObserverResponse {
        success: true,
        message: "Override applied for gate".to_string(),
        state: ObserverPayload::Status(Box::new(FlowStatus::from(&FlowContext::new()))),
        timestamp: crate::domain::TimestampUtc::now(),
        trace_id: command.trace_id.clone(),
    };
    logger.log_observer_command(&command, &response);

    let entries = read_entries(&temp_dir);
    assert_eq!(entries.len(), 1);
    let event = &entries[0].event;
    assert_eq!(entries[0].component, "Observer");
    assert_eq!(event["action"], "override");
    assert_eq!(event["trace_id"], "trace-1");
    assert_eq!(event["comment"], "manual clearance");
    assert_eq!(event["success"], true);
}
