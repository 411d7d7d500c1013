//! Structured observability hooks for the run lifecycle.
//!
//! This module provides:
//! - Run-scoped tracing spans via the `RunSpan` RAII guard
//! - Emission functions for lifecycle events: run start, directory and file
//!   start and completion, env export, resolution failure, run finish
//!
//! Events are emitted at `info!` level (filter with `RUST_LOG`).
//! For JSON output, pass `--log-json` to the binary.

use tracing::{debug, info};

use crate::engine::UnitState;

/// RAII guard that enters a run-scoped tracing span for the duration of a run.
///
/// # Example
///
/// ```ignore
/// let _span = RunSpan::enter("5f0c...");
/// // All tracing calls are now associated with run_id = "5f0c..."
/// ```
pub struct RunSpan {
    _span: tracing::span::EnteredSpan,
}

impl RunSpan {
    /// Create and enter a span tagged with the run_id.
    pub fn enter(run_id: &str) -> Self {
        let span = tracing::info_span!("testmin.run", run_id = %run_id);
        Self {
            _span: span.entered(),
        }
    }
}

/// Emit event: run started for a test root.
pub fn emit_run_started(run_id: &str, root: &str) {
    info!(event = "run.started", run_id = %run_id, root = %root);
}

/// Emit event: directories resolved, all pending.
pub fn emit_run_planned(directories: usize) {
    info!(
        event = "run.planned",
        directories = directories,
        state = ?UnitState::Pending,
    );
}

/// Emit event: a directory started running.
pub fn emit_dir_started(dir: &str, position: usize) {
    info!(event = "dir.started", dir = %dir, position = position, state = ?UnitState::Running);
}

/// Emit event: a file started running.
pub fn emit_file_started(dir: &str, file: &str) {
    debug!(event = "file.started", dir = %dir, file = %file, state = ?UnitState::Running);
}

/// Emit event: a directory reached a final state.
pub fn emit_dir_finished(dir: &str, state: UnitState, files_run: usize, run_time: f64) {
    info!(
        event = "dir.finished",
        dir = %dir,
        state = ?state,
        files_run = files_run,
        run_time = run_time,
    );
}

/// Emit event: a file reached a final state.
pub fn emit_file_finished(dir: &str, file: &str, state: UnitState, timed_out: bool, run_time: f64) {
    info!(
        event = "file.finished",
        dir = %dir,
        file = %file,
        state = ?state,
        timed_out = timed_out,
        run_time = run_time,
    );
}

/// Emit event: a file exported variables for later tests.
pub fn emit_env_exported(file: &str, keys: &[&str]) {
    info!(event = "env.exported", file = %file, keys = ?keys);
}

/// Emit event: settings resolution failed and nothing ran (error level).
pub fn emit_resolution_failed(error: &dyn std::fmt::Display) {
    tracing::error!(event = "run.resolution_failed", error = %error);
}

/// Emit event: run finished with duration, files run, and success status.
pub fn emit_run_finished(run_id: &str, duration_ms: u64, files_run: usize, success: bool) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        duration_ms = duration_ms,
        files_run = files_run,
        success = success,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_span_create() {
        let _span = RunSpan::enter("test-run-id");
    }
}
