//! Observability tests for the run lifecycle.
//!
//! These verify that structured tracing events are emitted for the key
//! lifecycle points: run start, directory and file completion, env export,
//! resolution failure and run finish.

use testmin_core::obs::{
    emit_dir_finished, emit_dir_started, emit_env_exported, emit_file_finished,
    emit_resolution_failed, emit_run_finished, emit_run_planned, emit_run_started, RunSpan,
};
use testmin_core::UnitState;
use tracing_test::traced_test;

#[traced_test]
#[test]
fn test_emit_run_started_logs_root() {
    emit_run_started("run-123", "/srv/tests");
    assert!(logs_contain("run.started"));
    assert!(logs_contain("/srv/tests"));
}

#[traced_test]
#[test]
fn test_emit_run_planned_logs_directory_count() {
    emit_run_planned(4);
    assert!(logs_contain("run.planned"));
    assert!(logs_contain("directories=4"));
}

#[traced_test]
#[test]
fn test_emit_dir_started_logs_running() {
    emit_dir_started("api", 2);
    assert!(logs_contain("dir.started"));
    assert!(logs_contain("Running"));
}

#[traced_test]
#[test]
fn test_emit_dir_finished_logs_state() {
    emit_dir_finished("api", UnitState::Skipped, 0, 0.0);
    assert!(logs_contain("dir.finished"));
    assert!(logs_contain("Skipped"));
}

#[traced_test]
#[test]
fn test_emit_file_finished_logs_timeout() {
    emit_file_finished("api", "01-login", UnitState::Failed, true, 1.5);
    assert!(logs_contain("file.finished"));
    assert!(logs_contain("timed_out=true"));
}

#[traced_test]
#[test]
fn test_emit_env_exported_logs_keys_only() {
    emit_env_exported("01-login", &["TOKEN"]);
    assert!(logs_contain("env.exported"));
    assert!(logs_contain("TOKEN"));
}

#[traced_test]
#[test]
fn test_emit_resolution_failed_logs_error() {
    emit_resolution_failed(&"src redirect cycle detected at ./a");
    assert!(logs_contain("run.resolution_failed"));
    assert!(logs_contain("ERROR"));
}

#[traced_test]
#[test]
fn test_emit_run_finished_logs_outcome() {
    emit_run_finished("run-456", 5000, 12, false);
    assert!(logs_contain("run.finished"));
    assert!(logs_contain("success=false"));
}

#[traced_test]
#[test]
fn test_run_span_tags_events() {
    let span = RunSpan::enter("span-run-id");
    emit_run_planned(1);
    drop(span);
    assert!(logs_contain("span-run-id"));
}

#[cfg(unix)]
#[traced_test]
#[tokio::test]
async fn test_engine_run_emits_lifecycle_events() {
    use std::os::unix::fs::PermissionsExt;
    use testmin_core::{Engine, EngineOptions};

    let root = tempfile::TempDir::new().unwrap();
    let script = root.path().join("t");
    std::fs::write(
        &script,
        "#!/bin/sh\necho '{\"testmin-success\": true, \"env\": {\"OBS_KEY\": \"v\"}}'\n",
    )
    .unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

    let log = Engine::new(root.path(), EngineOptions::default()).run().await;

    assert!(log.success);
    assert!(logs_contain("run.started"));
    assert!(logs_contain("file.finished"));
    assert!(logs_contain("OBS_KEY"));
    assert!(logs_contain("run.finished"));
}
