//! End-to-end runs over real directory trees of shell scripts.

#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::time::Duration;

use tempfile::TempDir;
use testmin_core::{Engine, EngineOptions, ProcessRunner};

const PASS: &str = r#"echo '{"testmin-success": true}'"#;
const FAIL: &str = r#"echo '{"testmin-success": false}'"#;

fn script(dir: &Path, name: &str, body: &str) {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
}

fn subdir(root: &Path, name: &str) -> std::path::PathBuf {
    let dir = root.join(name);
    fs::create_dir_all(&dir).unwrap();
    dir
}

fn settings(dir: &Path, body: &str) {
    fs::write(dir.join("testmin.dir.json"), body).unwrap();
}

fn engine(root: &Path) -> Engine {
    Engine::new(
        root,
        EngineOptions {
            default_timeout: 30,
            project: None,
        },
    )
}

#[tokio::test]
async fn test_exported_env_reaches_later_tests() {
    let root = TempDir::new().unwrap();
    let dir = subdir(root.path(), "auth");
    script(
        &dir,
        "01-login",
        r#"echo '{"testmin-success": true, "env": {"TESTMIN_IT_TOKEN": "abc"}}'"#,
    );
    script(
        &dir,
        "02-use",
        &format!("[ \"$TESTMIN_IT_TOKEN\" = abc ] || {{ {FAIL}; exit 0; }}\n{PASS}"),
    );

    let log = engine(root.path()).run().await;

    assert!(log.success, "{log:#?}");
    let files: Vec<_> = log.dirs["auth"].files.keys().cloned().collect();
    assert_eq!(files, vec!["01-login", "02-use"]);
    // Exports stay inside the run.
    assert!(std::env::var("TESTMIN_IT_TOKEN").is_err());
}

#[tokio::test]
async fn test_export_is_not_visible_to_earlier_tests() {
    let root = TempDir::new().unwrap();
    let dir = subdir(root.path(), "d");
    script(
        &dir,
        "01-check",
        &format!("[ -z \"$TESTMIN_IT_LATE\" ] || {{ {FAIL}; exit 0; }}\n{PASS}"),
    );
    script(
        &dir,
        "02-export",
        r#"echo '{"testmin-success": true, "env": {"TESTMIN_IT_LATE": "1"}}'"#,
    );

    let log = engine(root.path()).run().await;
    assert!(log.success, "{log:#?}");
}

#[tokio::test]
async fn test_unexportable_env_fails_the_exporting_test() {
    let root = TempDir::new().unwrap();
    let dir = subdir(root.path(), "d");
    script(
        &dir,
        "01-export",
        r#"printf '%s\n' '{"testmin-success": true, "env": {"BAD\u0000KEY": "x"}}'"#,
    );
    script(&dir, "02-innocent", &format!("touch ran\n{PASS}"));

    let log = engine(root.path()).run().await;

    assert!(!log.success);
    let files = &log.dirs["d"].files;
    let exporter = &files["01-export"];
    assert!(!exporter.success);
    assert!(exporter.details.as_ref().unwrap().contains_key("invalid-env"));
    assert!(!files.contains_key("02-innocent"));
    assert!(!dir.join("ran").exists());
}

#[tokio::test]
async fn test_excluded_file_never_runs() {
    let root = TempDir::new().unwrap();
    let dir = subdir(root.path(), "d");
    settings(&dir, r#"{"files": {"skip-me": false}}"#);
    script(&dir, "skip-me", &format!("touch ran\n{FAIL}"));
    script(&dir, "ok", PASS);

    let log = engine(root.path()).run().await;

    assert!(log.success, "{log:#?}");
    let files = &log.dirs["d"].files;
    assert!(!files.contains_key("skip-me"));
    assert_eq!(files["ok"].file_order, 2);
    assert!(!dir.join("ran").exists());
}

#[tokio::test]
async fn test_invalid_settings_run_nothing() {
    let root = TempDir::new().unwrap();
    let dir = subdir(root.path(), "broken");
    settings(&dir, "{ this is not json");
    script(root.path(), "root-test", "touch ran\necho '{\"testmin-success\": true}'");

    let log = engine(root.path()).run().await;

    assert!(!log.success);
    assert!(log.dirs.is_empty());
    assert_eq!(log.errors[0].id, "testmin.dir.json-parse-error");
    assert!(!root.path().join("ran").exists());
}

#[tokio::test]
async fn test_first_failure_ends_the_run() {
    let root = TempDir::new().unwrap();
    let first = subdir(root.path(), "a");
    let second = subdir(root.path(), "b");
    script(&first, "1-pass", PASS);
    script(&first, "2-fail", &format!("echo 'diagnostic' >&2\n{FAIL}"));
    script(&first, "3-after", &format!("touch ran\n{PASS}"));
    script(&second, "x", &format!("touch ran\n{PASS}"));

    let log = engine(root.path()).run().await;

    assert!(!log.success);
    let dirs: Vec<_> = log.dirs.keys().cloned().collect();
    assert_eq!(dirs, vec!["./", "a"]);
    let files: Vec<_> = log.dirs["a"].files.keys().cloned().collect();
    assert_eq!(files, vec!["1-pass", "2-fail"]);

    let failed = &log.dirs["a"].files["2-fail"];
    assert_eq!(failed.stderr.as_deref(), Some("diagnostic"));
    assert!(failed.stdout.is_some());
    assert!(log.dirs["a"].files["1-pass"].stdout.is_none());

    assert!(!first.join("ran").exists());
    assert!(!second.join("ran").exists());
}

#[tokio::test]
async fn test_missing_result_line_is_failure() {
    let root = TempDir::new().unwrap();
    script(root.path(), "quiet", "echo 'no verdict here'");

    let log = engine(root.path()).run().await;

    assert!(!log.success);
    let outcome = &log.dirs["./"].files["quiet"];
    assert!(!outcome.success);
    assert_eq!(outcome.stdout.as_deref(), Some("no verdict here"));
}

#[tokio::test]
async fn test_timeout_kills_slow_test() {
    let root = TempDir::new().unwrap();
    let dir = subdir(root.path(), "slow");
    settings(&dir, r#"{"files": {"sleeper": {"timeout": 1}}}"#);
    script(&dir, "sleeper", &format!("sleep 30\n{PASS}"));

    let engine = Engine::with_runner(
        root.path(),
        EngineOptions::default(),
        ProcessRunner::new().with_capture_grace(Duration::from_secs(1)),
    );
    let log = engine.run().await;

    assert!(!log.success);
    let outcome = &log.dirs["slow"].files["sleeper"];
    assert!(outcome.timed_out);
    assert!(!outcome.success);
    assert!(outcome.run_time < 10.0, "took {}", outcome.run_time);
}

#[tokio::test]
async fn test_run_id_is_exported() {
    let root = TempDir::new().unwrap();
    script(
        root.path(),
        "whoami",
        concat!(
            r#"printf '{"testmin-success": true, "run": "%s", "version": "%s"}\n' "#,
            r#""$testmin_test_id" "$TESTMIN""#,
        ),
    );

    let log = engine(root.path()).run().await;

    assert!(log.success, "{log:#?}");
    let details = log.dirs["./"].files["whoami"].details.as_ref().unwrap();
    assert_eq!(details["run"], log.id.as_str());
    assert_eq!(details["version"], testmin_core::VERSION);
}

#[tokio::test]
async fn test_directories_run_by_order_then_name() {
    let root = TempDir::new().unwrap();
    for name in ["b", "a", "c", "z"] {
        let dir = subdir(root.path(), name);
        script(&dir, "t", PASS);
    }
    settings(&root.path().join("a"), r#"{"dir-order": 5}"#);
    settings(&root.path().join("b"), r#"{"dir-order": 5}"#);
    settings(&root.path().join("c"), r#"{"dir-order": 1}"#);

    let log = engine(root.path()).run().await;

    assert!(log.success, "{log:#?}");
    let dirs: Vec<_> = log.dirs.keys().cloned().collect();
    assert_eq!(dirs, vec!["./", "c", "a", "b", "z"]);
    let positions: Vec<_> = log.dirs.values().map(|dir| dir.dir_order).collect();
    assert_eq!(positions, vec![1, 2, 3, 4, 5]);
}

#[tokio::test]
async fn test_skipped_directory_is_logged_but_not_run() {
    let root = TempDir::new().unwrap();
    let dir = subdir(root.path(), "later");
    settings(&dir, r#"{"skip": true}"#);
    script(&dir, "t", &format!("touch ran\n{FAIL}"));

    let log = engine(root.path()).run().await;

    assert!(log.success);
    assert!(log.dirs["later"].skipped);
    assert!(log.dirs["later"].files.is_empty());
    assert!(!dir.join("ran").exists());
}

#[tokio::test]
async fn test_src_redirect_runs_target_in_callers_slot() {
    let root = TempDir::new().unwrap();
    let late = subdir(root.path(), "late");
    script(&late, "t", PASS);

    let alias = subdir(root.path(), "alias");
    settings(&alias, r#"{"src": ".shared", "dir-order": 2}"#);
    script(&alias, "t", &format!("touch ran\n{FAIL}"));

    // Hidden, so only reachable through the redirect.
    let shared = subdir(root.path(), ".shared");
    script(&shared, "t", r#"printf '{"testmin-success": true, "cwd": "%s"}\n' "$(pwd -P)""#);

    let log = engine(root.path()).run().await;

    assert!(log.success, "{log:#?}");
    let dirs: Vec<_> = log.dirs.keys().cloned().collect();
    assert_eq!(dirs, vec!["./", ".shared", "late"]);
    let details = log.dirs[".shared"].files["t"].details.as_ref().unwrap();
    let expected = shared.canonicalize().unwrap().display().to_string();
    assert_eq!(details["cwd"], expected.as_str());
    assert!(!alias.join("ran").exists());
}
