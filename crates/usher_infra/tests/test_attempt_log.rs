//! Attempt log semantics: first-writer-wins creation, conditional
//! updates, and crash/restart replay.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use usher_core::idempotency::ExecutionKey;
use usher_core::reservation::{
    AttemptRecord, AttemptState, CreateOutcome, LedgerStore, StoreError, UpdateOutcome,
};
use usher_infra::store::AttemptLog;

fn attempt(requester_id: &str, resource_id: &str) -> AttemptRecord {
    AttemptRecord {
        key: ExecutionKey::derive(requester_id, resource_id),
        requester_id: requester_id.to_string(),
        resource_id: resource_id.to_string(),
        state: AttemptState::InProgress,
        created_ms: 1_000,
    }
}

fn temp_log_path(tag: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock before unix epoch")
        .as_nanos();
    std::env::temp_dir().join(format!(
        "usher_attempts_{tag}_{}_{}.jsonl",
        std::process::id(),
        nanos
    ))
}

fn remove_if_exists(path: &Path) {
    let _ = std::fs::remove_file(path);
}

#[test]
fn test_create_if_absent_first_writer_wins() {
    let log = AttemptLog::new(10);

    let first = log.create_if_absent(attempt("userA", "show-1")).expect("create");
    assert_eq!(first, CreateOutcome::Created);

    let second = log.create_if_absent(attempt("userA", "show-1")).expect("create");
    match second {
        CreateOutcome::AlreadyExists(existing) => {
            assert_eq!(existing.state, AttemptState::InProgress);
            assert_eq!(existing.requester_id, "userA");
        }
        CreateOutcome::Created => panic!("second create must observe the existing record"),
    }

    assert_eq!(log.len(), 1);
    assert_eq!(log.metrics().opens_total(), 1);
    assert_eq!(log.metrics().duplicates_total(), 1);
}

#[test]
fn test_capacity_full_fails_closed() {
    let log = AttemptLog::new(0);

    let result = log.create_if_absent(attempt("userA", "show-1"));
    assert_eq!(result, Err(StoreError::CapacityFull));
    assert!(log.is_empty(), "no record on refused create");
    assert_eq!(log.metrics().write_errors_total(), 1);
}

#[test]
fn test_conditional_update_classifies_misses() {
    let log = AttemptLog::new(10);
    let key = ExecutionKey::derive("userA", "show-1");
    log.create_if_absent(attempt("userA", "show-1")).expect("create");

    let missing = log
        .conditional_update(
            &ExecutionKey::derive("ghost", "show-1"),
            AttemptState::InProgress,
            AttemptState::Failed,
        )
        .expect("update");
    assert_eq!(missing, UpdateOutcome::NotFound);

    let stale = log
        .conditional_update(&key, AttemptState::Completed, AttemptState::Failed)
        .expect("update");
    assert_eq!(
        stale,
        UpdateOutcome::PreconditionFailed {
            actual: AttemptState::InProgress
        }
    );

    let applied = log
        .conditional_update(&key, AttemptState::InProgress, AttemptState::Completed)
        .expect("update");
    assert_eq!(applied, UpdateOutcome::Applied);

    let record = log.get(&key).expect("get").expect("record");
    assert_eq!(record.state, AttemptState::Completed);
    assert_eq!(log.metrics().transitions_total(), 1);
    assert_eq!(log.metrics().precondition_failures_total(), 2);
}

#[test]
fn test_replay_reconstructs_state_across_restart() {
    let path = temp_log_path("replay");

    {
        let log = AttemptLog::with_storage_path(10, &path).expect("create log");
        log.create_if_absent(attempt("userA", "show-1")).expect("create");
        log.create_if_absent(attempt("userB", "show-1")).expect("create");
        log.conditional_update(
            &ExecutionKey::derive("userB", "show-1"),
            AttemptState::InProgress,
            AttemptState::Completed,
        )
        .expect("update");
    }

    // "Restart": reload from the event file.
    let log = AttemptLog::with_storage_path(10, &path).expect("reload log");
    let replay = log.replay();
    assert_eq!(replay.records_replayed, 2);
    assert_eq!(replay.in_flight_count, 1);
    assert_eq!(replay.in_flight_keys, vec!["userA:show-1".to_string()]);

    let completed = log
        .get(&ExecutionKey::derive("userB", "show-1"))
        .expect("get")
        .expect("record");
    assert_eq!(completed.state, AttemptState::Completed);

    remove_if_exists(&path);
}

#[test]
fn test_malformed_event_file_fails_closed() {
    let path = temp_log_path("malformed");
    std::fs::write(&path, "{ not json\n").expect("write junk");

    let err = AttemptLog::with_storage_path(10, &path).expect_err("junk must be rejected");
    assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);

    remove_if_exists(&path);
}

#[test]
fn test_transition_for_unknown_key_fails_closed() {
    let path = temp_log_path("unknown_key");
    std::fs::write(
        &path,
        "{\"kind\":\"state_changed\",\"key\":\"ghost:show-1\",\
         \"from\":\"in_progress\",\"to\":\"failed\"}\n",
    )
    .expect("write event");

    let err = AttemptLog::with_storage_path(10, &path).expect_err("unknown key must be rejected");
    assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);

    remove_if_exists(&path);
}

#[test]
fn test_reload_exceeding_capacity_rejected() {
    let path = temp_log_path("overflow");

    {
        let log = AttemptLog::with_storage_path(10, &path).expect("create log");
        log.create_if_absent(attempt("userA", "show-1")).expect("create");
        log.create_if_absent(attempt("userB", "show-1")).expect("create");
    }

    let err = AttemptLog::with_storage_path(1, &path).expect_err("overflow must be rejected");
    assert_eq!(err.kind(), std::io::ErrorKind::InvalidInput);

    remove_if_exists(&path);
}
